//! coedit wire protocol
//!
//! A line-oriented text protocol in the style of Redis RESP. Every command
//! is a single line terminated by `\r\n` (or `\n`).
//!
//! ## Command Format
//! ```text
//! REGISTER <document_id> <user_id>
//! UNREGISTER <document_id> <user_id>
//! PULL <document_id> <user_id>
//! PUSH <document_id> <user_id> <json array of operations>
//! AUTH <password> | PING | INFO | QUIT
//! ```
//!
//! ## Response Format
//! ```text
//! +OK                      # Success
//! -ERR <code> <message>    # Error
//! $<length>\r\n<data>      # Bulk data (document text, JSON)
//! ```

pub mod command;
pub mod error;
pub mod parser;
pub mod response;

pub use command::{Command, CommandKind};
pub use error::{ProtocolError, ProtocolResult};
pub use parser::Parser;
pub use response::Response;
