//! The host's control thread: console commands in, notifications out.

use voxlane_core::Notification;

/// A line typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Interrupt,
    Say(String),
    Commit,
    Quit,
    Help,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        let command = match head {
            "/interrupt" | "/i" => Self::Interrupt,
            "/commit" | "/c" => Self::Commit,
            "/quit" | "/q" | "/exit" => Self::Quit,
            "/help" | "/h" => Self::Help,
            "/say" if !rest.is_empty() => Self::Say(rest.to_string()),
            // Bare text is a prompt.
            _ if !head.starts_with('/') => Self::Say(line.to_string()),
            _ => Self::Unknown(line.to_string()),
        };
        Some(command)
    }
}

pub const HELP: &str = "\
/say <text>   ask the assistant to respond to <text> (bare text works too)
/commit       send the buffered microphone audio as a turn
/interrupt    stop the assistant mid-response
/quit         disconnect and exit";

/// What the control loop should do after seeing a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    None,
    Print(String),
    /// The user started talking over the assistant.
    Interrupt,
    Exit(String),
}

pub fn react(notification: &Notification) -> Reaction {
    match notification {
        Notification::Connected => Reaction::Print("connected".to_string()),
        Notification::ConnectFailed { message } => Reaction::Exit(message.clone()),
        Notification::SessionReady => Reaction::Print("session ready".to_string()),
        Notification::AssistantTextDone { text } if !text.is_empty() => {
            Reaction::Print(format!("assistant: {}", text))
        }
        Notification::UserTranscriptDone { text } if !text.is_empty() => {
            Reaction::Print(format!("you: {}", text))
        }
        Notification::SpeechStarted => Reaction::Interrupt,
        Notification::Error { code, message } => match code {
            Some(code) => Reaction::Print(format!("error ({}): {}", code, message)),
            None => Reaction::Print(format!("error: {}", message)),
        },
        Notification::Disconnected { reason } => Reaction::Exit(reason.clone()),
        _ => Reaction::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  "), None);
        assert_eq!(Command::parse("/interrupt"), Some(Command::Interrupt));
        assert_eq!(Command::parse("/q"), Some(Command::Quit));
        assert_eq!(Command::parse("/commit\n"), Some(Command::Commit));
        assert_eq!(
            Command::parse("/say  tell me a joke "),
            Some(Command::Say("tell me a joke".into()))
        );
        assert_eq!(
            Command::parse("what time is it?"),
            Some(Command::Say("what time is it?".into()))
        );
        assert_eq!(
            Command::parse("/say"),
            Some(Command::Unknown("/say".into()))
        );
        assert_eq!(
            Command::parse("/dance"),
            Some(Command::Unknown("/dance".into()))
        );
    }

    #[test]
    fn test_reactions() {
        assert_eq!(react(&Notification::SpeechStarted), Reaction::Interrupt);
        assert_eq!(
            react(&Notification::AssistantTextDone {
                text: "Hi!".into()
            }),
            Reaction::Print("assistant: Hi!".into())
        );
        assert_eq!(
            react(&Notification::AssistantTextDone {
                text: String::new()
            }),
            Reaction::None
        );
        assert_eq!(
            react(&Notification::AudioDelta {
                samples: vec![0.0; 4]
            }),
            Reaction::None
        );
        assert_eq!(
            react(&Notification::Disconnected {
                reason: "stream ended".into()
            }),
            Reaction::Exit("stream ended".into())
        );
    }
}
