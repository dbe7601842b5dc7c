//! Commands typed by the student.

use std::str::FromStr;

use thiserror::Error;

pub const HELP: &str = "\
Commands:
  /msg <id> <text>  send a direct message to a checked-in student
  /who              list checked-in students
  /exit             leave the session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentCommand {
    Message { to: String, text: String },
    Who,
    Exit,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Usage: /msg <id> <text>")]
    MessageUsage,

    #[error("Unknown command: {0} (type /help)")]
    Unknown(String),
}

impl FromStr for StudentCommand {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (head, rest) = s.split_once(char::is_whitespace).unwrap_or((s, ""));
        match head {
            "/msg" => {
                let (to, text) = rest
                    .trim()
                    .split_once(char::is_whitespace)
                    .ok_or(InputError::MessageUsage)?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(InputError::MessageUsage);
                }
                Ok(Self::Message {
                    to: to.to_string(),
                    text: text.to_string(),
                })
            }
            "/who" => Ok(Self::Who),
            "/exit" | "/quit" => Ok(Self::Exit),
            "/help" => Ok(Self::Help),
            other => Err(InputError::Unknown(other.to_string())),
        }
    }
}
