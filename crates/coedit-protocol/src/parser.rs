//! Command parser

use crate::command::Command;
use crate::error::{ProtocolError, ProtocolResult};
use bytes::BytesMut;
use coedit_core::{DocumentId, Operation, UserId};
use tracing::warn;

/// Maximum message size (1MB)
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Incremental line parser
pub struct Parser {
    buffer: BytesMut,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the parser buffer
    pub fn feed(&mut self, data: &[u8]) -> ProtocolResult<()> {
        if self.buffer.len() + data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: self.buffer.len() + data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Try to parse a complete command from the buffer
    pub fn parse(&mut self) -> ProtocolResult<Option<Command>> {
        let line_end = match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let line_len = if line_end > 0 && self.buffer[line_end - 1] == b'\r' {
            line_end - 1
        } else {
            line_end
        };

        let line = String::from_utf8_lossy(&self.buffer[..line_len]).to_string();
        let _ = self.buffer.split_to(line_end + 1);

        Self::parse_line(&line).map(Some)
    }

    /// Drop any buffered partial input
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Parse a single command line
    fn parse_line(line: &str) -> ProtocolResult<Command> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::InvalidCommand("Empty command".into()));
        }

        let mut tokens = Tokenizer::new(line);
        let cmd = tokens
            .next()
            .ok_or_else(|| ProtocolError::InvalidCommand("Empty command".into()))?
            .to_uppercase();

        match cmd.as_str() {
            "AUTH" => Self::parse_auth(&mut tokens),
            "REGISTER" | "REG" => {
                let (id, user) = Self::parse_target(&mut tokens)?;
                Ok(Command::register(id, user))
            }
            "UNREGISTER" | "UNREG" => {
                let (id, user) = Self::parse_target(&mut tokens)?;
                Ok(Command::unregister(id, user))
            }
            "PULL" => {
                let (id, user) = Self::parse_target(&mut tokens)?;
                Ok(Command::pull(id, user))
            }
            "PUSH" => Self::parse_push(&mut tokens),
            "PING" => Ok(Command::ping()),
            "QUIT" => Ok(Command::quit()),
            "INFO" => Ok(Command::info()),
            _ => Err(ProtocolError::InvalidCommand(format!("Unknown command: {}", cmd))),
        }
    }

    fn parse_auth(tokens: &mut Tokenizer) -> ProtocolResult<Command> {
        let password = tokens
            .next()
            .ok_or_else(|| ProtocolError::MissingArgument("password".into()))?;

        Ok(Command::auth(password.to_string()))
    }

    /// `<document_id> <user_id>`
    fn parse_target(tokens: &mut Tokenizer) -> ProtocolResult<(DocumentId, UserId)> {
        let id = tokens
            .next()
            .ok_or_else(|| ProtocolError::MissingArgument("document_id".into()))?;
        let user = tokens
            .next()
            .ok_or_else(|| ProtocolError::MissingArgument("user_id".into()))?;

        Ok((DocumentId::new(id)?, UserId::new(user)?))
    }

    fn parse_push(tokens: &mut Tokenizer) -> ProtocolResult<Command> {
        let (id, user) = Self::parse_target(tokens)?;
        let payload = tokens
            .rest()
            .ok_or_else(|| ProtocolError::MissingArgument("operations".into()))?;

        let ops = parse_operations(&payload)?;
        Ok(Command::push(id, user, ops))
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple tokenizer that handles quoted strings
struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos..].starts_with(' ') {
            self.pos += 1;
        }
    }

    fn next(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        if self.pos >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.pos..];

        if let Some(quoted) = remaining.strip_prefix('"') {
            if let Some(end) = quoted.find('"') {
                self.pos += end + 2;
                return Some(&quoted[..end]);
            }
        }

        let end = remaining.find(' ').unwrap_or(remaining.len());
        self.pos += end;
        Some(&remaining[..end])
    }

    fn rest(&mut self) -> Option<String> {
        self.skip_whitespace();
        if self.pos >= self.input.len() {
            return None;
        }

        let remaining = self.input[self.pos..].to_string();
        self.pos = self.input.len();
        Some(remaining)
    }
}

/// Parse a JSON array of operations.
///
/// A payload that is not a JSON array is rejected. Elements that are not
/// well-formed operations are skipped so the rest of the batch still applies.
fn parse_operations(payload: &str) -> ProtocolResult<Vec<Operation>> {
    let elements: Vec<serde_json::Value> =
        serde_json::from_str(payload.trim()).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let mut ops = Vec::with_capacity(elements.len());
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<Operation>(element) {
            Ok(op) => ops.push(op),
            Err(e) => warn!(index, error = %e, "Skipping malformed operation"),
        }
    }
    Ok(ops)
}
