/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    RetryPermission,
    DismissError,
    /// Pretend the current clip finished.
    ClipEnded,
    Status,
    Help,
    Quit,
    /// Typed fallback, bypassing the speech engine.
    Type(String),
    /// Anything else is heard as speech.
    Say(String),
    Unknown(String),
}

pub const HELP: &str = "\
/start            begin a conversation
/stop             say goodbye and return to idle
/retry            retry after a microphone denial
/dismiss          clear the current error
/ended            act as if the current clip finished
/type <text>      submit text without the microphone
/status           print the session snapshot
/quit             exit
anything else     is heard as speech while the mic is open";

impl Command {
    /// Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Command::Say(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let command = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "retry" => Command::RetryPermission,
            "dismiss" => Command::DismissError,
            "ended" | "end" => Command::ClipEnded,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "type" if !arg.is_empty() => Command::Type(arg.to_string()),
            _ => Command::Unknown(line.to_string()),
        };
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slash_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("  /STOP "), Some(Command::Stop));
        assert_eq!(Command::parse("/retry"), Some(Command::RetryPermission));
        assert_eq!(Command::parse("/dismiss"), Some(Command::DismissError));
        assert_eq!(Command::parse("/ended"), Some(Command::ClipEnded));
        assert_eq!(Command::parse("/status"), Some(Command::Status));
        assert_eq!(Command::parse("/exit"), Some(Command::Quit));
    }

    #[test]
    fn type_takes_the_rest_of_the_line() {
        assert_eq!(
            Command::parse("/type   what's the weather "),
            Some(Command::Type("what's the weather".to_string()))
        );
        assert_eq!(
            Command::parse("/type"),
            Some(Command::Unknown("/type".to_string()))
        );
    }

    #[test]
    fn plain_lines_are_speech() {
        assert_eq!(
            Command::parse(" hello there "),
            Some(Command::Say("hello there".to_string()))
        );
        assert_eq!(Command::parse("   "), None);
        assert_eq!(
            Command::parse("/dance"),
            Some(Command::Unknown("/dance".to_string()))
        );
    }
}
