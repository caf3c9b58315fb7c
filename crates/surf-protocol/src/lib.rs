//! Wire protocol for surf daemon communication.
//!
//! Frames are newline-delimited UTF-8 JSON. Requests carry an opaque `id`
//! and an `action`; exactly one response is produced per accepted request,
//! echoing that `id`.

pub mod command;
pub mod parse;
pub mod response;

pub use command::{Action, Command};
pub use parse::{looks_like_http, parse_command, ParseFailure, MAX_FRAME_SIZE};
pub use response::{Response, UNKNOWN_ID};
