//! Line parsing for protocol frames.
//!
//! Tolerant reader: unknown fields are ignored, anything that does not match a
//! known frame shape is reported as [`Error::MalformedFrame`].

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::ClientFrame;
use crate::error::{Error, Result};

/// Parse one line into any frame type.
pub fn parse_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::MalformedFrame("empty frame".into()));
    }
    serde_json::from_str(line).map_err(|e| Error::MalformedFrame(e.to_string()))
}

/// Parse a frame sent by a student, rejecting blank identifiers.
pub fn parse_client_frame(line: &str) -> Result<ClientFrame> {
    match parse_line::<ClientFrame>(line)? {
        ClientFrame::CheckIn { id, name, port } => {
            let id = require_field("id", &id)?;
            let name = require_field("name", &name)?;
            Ok(ClientFrame::CheckIn { id, name, port })
        }
        ClientFrame::Exit { id } => Ok(ClientFrame::Exit {
            id: require_field("id", &id)?,
        }),
    }
}

/// Serialize a frame as a single newline-terminated line.
pub fn encode_line<T: Serialize>(frame: &T) -> Result<String> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}

fn require_field(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::MalformedFrame(format!("'{field}' must not be blank")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::{RejectReason, ServerFrame};

    #[test]
    fn parse_check_in() {
        let json = r#"{"type":"check_in","id":"12345","name":"Ada Lovelace","port":6045}"#;
        let frame = parse_client_frame(json).unwrap();
        assert_eq!(
            frame,
            ClientFrame::CheckIn {
                id: "12345".into(),
                name: "Ada Lovelace".into(),
                port: 6045,
            }
        );
    }

    #[test]
    fn identifiers_are_trimmed() {
        let json = r#"{"type":"exit","id":"  12345 "}"#;
        let frame = parse_client_frame(json).unwrap();
        assert_eq!(frame, ClientFrame::Exit { id: "12345".into() });
    }

    #[test]
    fn tolerant_reader_ignores_unknown_fields() {
        let json = r#"{"type":"exit","id":"1","client":"gui"}"#;
        assert!(parse_client_frame(json).is_ok());
    }

    #[test]
    fn unknown_type_is_malformed() {
        let err = parse_client_frame(r#"{"type":"dance"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn missing_field_is_malformed() {
        let err = parse_client_frame(r#"{"type":"check_in","id":"1"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn blank_id_is_malformed() {
        let err =
            parse_client_frame(r#"{"type":"check_in","id":" ","name":"x","port":1}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn legacy_text_is_malformed() {
        let err = parse_client_frame("ID: 1; Name: Ada; Port: 6001").unwrap_err();
        assert!(err.is_frame_local());
    }

    #[test]
    fn encoded_reject_uses_snake_case_reason() {
        let line = encode_line(&ServerFrame::CheckInReject {
            reason: RejectReason::CapacityExceeded,
        })
        .unwrap();
        assert_eq!(
            line,
            "{\"type\":\"check_in_reject\",\"reason\":\"capacity_exceeded\"}\n"
        );
    }

    #[test]
    fn session_ended_has_no_payload() {
        let line = encode_line(&ServerFrame::SessionEnded).unwrap();
        assert_eq!(line, "{\"type\":\"session_ended\"}\n");
    }
}
