//! Rollcall wire protocol.
//!
//! Frames are JSON objects, one per line, tagged by a snake_case `type`
//! field. The same framing is used between students and the tutor server and
//! between students directly.

mod codec;
mod parser;
mod types;

pub use codec::{DEFAULT_MAX_FRAME_BYTES, FrameReader, write_frame};
pub use parser::{encode_line, parse_client_frame, parse_line};
pub use types::*;
