//! Fuzz target for the connection manager state machine
//!
//! Drives a `SimWorld` (real manager against the simulated gateway) with
//! arbitrary operation sequences on every transport flavor.
//!
//! # Invariants
//!
//! - Every harness invariant holds after every operation
//! - Queue is empty whenever the manager is connected
//! - At most one live subscription per topic

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use linkwave_core::{ManagerConfig, ReconnectPolicy, StompConfig, TransportConfig};
use linkwave_harness::{Operation, SimGateway, SimWorld};

#[derive(Debug, Arbitrary)]
enum Flavor {
    Json,
    Stomp,
    SockJs,
}

#[derive(Debug, Arbitrary)]
struct Scenario {
    flavor: Flavor,
    seed: u64,
    max_attempts: u8,
    server_heartbeat: bool,
    operations: Vec<Operation>,
}

fuzz_target!(|scenario: Scenario| {
    let reconnect = ReconnectPolicy {
        base_delay: Duration::from_millis(250),
        max_attempts: u32::from(scenario.max_attempts % 8),
        max_delay: Some(Duration::from_secs(8)),
    };
    let config = match scenario.flavor {
        Flavor::Json => ManagerConfig { reconnect, ..ManagerConfig::json("ws://gw/ws") },
        Flavor::Stomp | Flavor::SockJs => ManagerConfig {
            reconnect,
            transport: TransportConfig::Stomp(StompConfig {
                sockjs: matches!(scenario.flavor, Flavor::SockJs),
                ..StompConfig::default()
            }),
            ..ManagerConfig::stomp("http://gw/ws/chat")
        },
    };

    let mut gateway = SimGateway::for_config(&config);
    if scenario.server_heartbeat {
        gateway = gateway.with_server_heartbeat((4000, 4000));
    }
    let Ok(mut world) = SimWorld::with_gateway(config, gateway, scenario.seed) else {
        return;
    };

    for (step, op) in scenario.operations.iter().take(256).enumerate() {
        // Rejections (topics on JSON) are part of the contract, not failures.
        let _ = world.apply(op);
        if let Err(violations) = world.check() {
            panic!("step {step} ({op:?}) violated: {violations:?}");
        }
    }
});
