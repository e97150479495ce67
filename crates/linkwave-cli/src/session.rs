//! Interactive session: turns input lines into client actions.
//!
//! Plain text goes to the current target (a user set with `/to` or a room
//! set with `/room`). Lines starting with `/` are commands.

/// Where plain text is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Direct messages to a user.
    User(String),
    /// Messages to a room.
    Room(String),
}

/// Work for the main loop to carry out against the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Connect,
    Disconnect,
    Chat { to: String, body: String },
    RoomChat { room_id: String, body: String },
    TypingStart { to: String },
    TypingStop { to: String },
    MarkRead { room_id: String, message_id: String },
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Status,
    Quit,
    /// Feedback for the user (usage, errors, target changes).
    Notice(String),
}

const HELP: &str = "Commands: /connect /disconnect /to <user> /room <id> /msg <user> <text> \
                    /typing [on|off] /read <message_id> /sub <topic> /unsub <topic> \
                    /status /quit";

/// Per-terminal state of the line client.
#[derive(Debug, Default)]
pub struct Session {
    target: Option<Target>,
}

impl Session {
    /// Handle one line of input.
    pub fn handle_line(&mut self, line: &str) -> Vec<Action> {
        let line = line.trim();
        if line.is_empty() {
            return vec![];
        }

        if let Some(cmd) = line.strip_prefix('/') {
            return self.handle_command(cmd);
        }

        match &self.target {
            Some(Target::User(to)) => vec![Action::Chat { to: to.clone(), body: line.into() }],
            Some(Target::Room(room_id)) => {
                vec![Action::RoomChat { room_id: room_id.clone(), body: line.into() }]
            },
            None => vec![Action::Notice("No target. Use /to <user> or /room <id>".into())],
        }
    }

    /// Handle slash commands.
    fn handle_command(&mut self, cmd: &str) -> Vec<Action> {
        let (command, rest) = split_word(cmd);

        match command {
            "connect" => vec![Action::Connect],
            "disconnect" => vec![Action::Disconnect],
            "to" => {
                let (user, _) = split_word(rest);
                if user.is_empty() {
                    return usage("/to <user>");
                }
                self.target = Some(Target::User(user.into()));
                vec![Action::Notice(format!("Talking to {user}"))]
            },
            "room" => {
                let (room_id, _) = split_word(rest);
                if room_id.is_empty() {
                    return usage("/room <id>");
                }
                self.target = Some(Target::Room(room_id.into()));
                vec![Action::Notice(format!("Talking in room {room_id}"))]
            },
            "msg" => {
                let (to, body) = split_word(rest);
                if to.is_empty() || body.is_empty() {
                    return usage("/msg <user> <text>");
                }
                vec![Action::Chat { to: to.into(), body: body.into() }]
            },
            "typing" => {
                let Some(Target::User(to)) = &self.target else {
                    return vec![Action::Notice("Error: /typing needs a user target".into())];
                };
                let to = to.clone();
                match split_word(rest).0 {
                    "" | "on" => vec![Action::TypingStart { to }],
                    "off" => vec![Action::TypingStop { to }],
                    _ => usage("/typing [on|off]"),
                }
            },
            "read" => {
                let Some(Target::Room(room_id)) = &self.target else {
                    return vec![Action::Notice("Error: /read needs a room target".into())];
                };
                let (message_id, _) = split_word(rest);
                if message_id.is_empty() {
                    return usage("/read <message_id>");
                }
                vec![Action::MarkRead { room_id: room_id.clone(), message_id: message_id.into() }]
            },
            "sub" | "unsub" => {
                let (topic, _) = split_word(rest);
                if topic.is_empty() {
                    return usage(&format!("/{command} <topic>"));
                }
                let topic = topic.to_string();
                if command == "sub" {
                    vec![Action::Subscribe { topic }]
                } else {
                    vec![Action::Unsubscribe { topic }]
                }
            },
            "status" => vec![Action::Status],
            "help" | "h" => vec![Action::Notice(HELP.into())],
            "quit" | "q" => vec![Action::Quit],
            other => vec![Action::Notice(format!("Unknown command /{other}. Try /help"))],
        }
    }
}

fn usage(form: &str) -> Vec<Action> {
    vec![Action::Notice(format!("Usage: {form}"))]
}

/// First whitespace-separated word and the trimmed remainder.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    s.split_once(char::is_whitespace).map_or((s, ""), |(word, rest)| (word, rest.trim_start()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_without_target_is_refused() {
        let mut session = Session::default();
        let actions = session.handle_line("hello");
        assert!(matches!(actions.as_slice(), [Action::Notice(_)]));
    }

    #[test]
    fn to_sets_direct_target() {
        let mut session = Session::default();
        session.handle_line("/to alice");
        assert_eq!(session.target.as_ref(), Some(&Target::User("alice".into())));

        let actions = session.handle_line("  hi there  ");
        assert_eq!(actions, vec![Action::Chat { to: "alice".into(), body: "hi there".into() }]);
    }

    #[test]
    fn room_target_sends_room_chat() {
        let mut session = Session::default();
        session.handle_line("/room r1");

        let actions = session.handle_line("hello room");
        assert_eq!(actions, vec![Action::RoomChat {
            room_id: "r1".into(),
            body: "hello room".into()
        }]);
    }

    #[test]
    fn msg_keeps_body_spacing() {
        let mut session = Session::default();
        let actions = session.handle_line("/msg bob  see   you");
        assert_eq!(actions, vec![Action::Chat { to: "bob".into(), body: "see   you".into() }]);
        assert_eq!(session.target.as_ref(), None);
    }

    #[test]
    fn missing_arguments_print_usage() {
        let mut session = Session::default();
        for line in ["/to", "/room", "/msg bob", "/sub", "/unsub "] {
            let actions = session.handle_line(line);
            let [Action::Notice(text)] = actions.as_slice() else {
                panic!("expected usage for {line:?}, got {actions:?}");
            };
            assert!(text.starts_with("Usage:"), "{text}");
        }
    }

    #[test]
    fn typing_needs_user_target() {
        let mut session = Session::default();
        assert!(matches!(session.handle_line("/typing").as_slice(), [Action::Notice(_)]));

        session.handle_line("/to alice");
        let alice = || "alice".to_string();
        assert_eq!(session.handle_line("/typing"), vec![Action::TypingStart { to: alice() }]);
        assert_eq!(session.handle_line("/typing off"), vec![Action::TypingStop { to: alice() }]);
    }

    #[test]
    fn read_needs_room_target() {
        let mut session = Session::default();
        session.handle_line("/to alice");
        assert!(matches!(session.handle_line("/read m1").as_slice(), [Action::Notice(_)]));

        session.handle_line("/room r7");
        assert_eq!(session.handle_line("/read m1"), vec![Action::MarkRead {
            room_id: "r7".into(),
            message_id: "m1".into()
        }]);
    }

    #[test]
    fn connection_commands() {
        let mut session = Session::default();
        assert_eq!(session.handle_line("/connect"), vec![Action::Connect]);
        assert_eq!(session.handle_line("/disconnect"), vec![Action::Disconnect]);
        assert_eq!(session.handle_line("/sub 42"), vec![Action::Subscribe { topic: "42".into() }]);
        assert_eq!(session.handle_line("/unsub 42"), vec![Action::Unsubscribe {
            topic: "42".into()
        }]);
        assert_eq!(session.handle_line("/status"), vec![Action::Status]);
        assert_eq!(session.handle_line("/q"), vec![Action::Quit]);
    }

    #[test]
    fn blank_and_unknown_lines() {
        let mut session = Session::default();
        assert!(session.handle_line("   ").is_empty());
        assert!(matches!(session.handle_line("/frobnicate").as_slice(), [Action::Notice(_)]));
    }
}
