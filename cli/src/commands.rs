//! Slash command parsing for the chat REPL

use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    Help,
    Reset,
    Audio(PathBuf),
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, String> {
        let Some(rest) = input.strip_prefix('/') else {
            return Err("Not a command".to_string());
        };

        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        match name {
            "quit" | "exit" => Ok(Command::Quit),
            "help" => Ok(Command::Help),
            "reset" | "clear" => Ok(Command::Reset),
            "audio" => arg
                .map(|path| Command::Audio(PathBuf::from(path)))
                .ok_or_else(|| "Usage: /audio <file>".to_string()),
            "" => Err("Empty command".to_string()),
            other => Err(format!(
                "Unknown command: /{}. Type /help for available commands.",
                other
            )),
        }
    }
}

pub fn print_help() {
    println!("Available commands:");
    println!("  /quit, /exit           - Exit the chat");
    println!("  /reset                 - Clear the conversation and reload the vault");
    println!("  /audio <file>          - Send a recorded voice instruction");
    println!("  /help                  - Show this help message");
    println!("  Ctrl+D                 - Exit the chat");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/quit"), Ok(Command::Quit));
        assert_eq!(Command::parse("/clear"), Ok(Command::Reset));
        assert_eq!(
            Command::parse("/audio  memo 1.wav "),
            Ok(Command::Audio(PathBuf::from("memo 1.wav")))
        );
        assert!(Command::parse("/audio").is_err());
        assert!(Command::parse("/nope").unwrap_err().contains("/nope"));
        assert!(Command::parse("hello").is_err());
    }
}
