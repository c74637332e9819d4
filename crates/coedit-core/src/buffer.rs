//! Sequence buffer backing a document's live content

use crate::error::{Error, Result};
use ropey::Rope;

/// Mutable character sequence with indexed insert and erase.
///
/// Positions are character offsets (Unicode scalar values), never byte
/// offsets. The only mutations are [`Buffer::insert`] and [`Buffer::erase`].
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    rope: Rope,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Number of characters in the buffer
    pub fn len(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `text` before the character at `pos`. `pos == len()` appends.
    pub fn insert(&mut self, pos: usize, text: &str) -> Result<()> {
        let len = self.len();
        if pos > len {
            return Err(Error::OutOfRange { position: pos, len });
        }
        self.rope.insert(pos, text);
        Ok(())
    }

    /// Remove the single character at `pos`, returning it.
    pub fn erase(&mut self, pos: usize) -> Result<char> {
        let len = self.len();
        if pos >= len {
            return Err(Error::OutOfRange { position: pos, len });
        }
        let removed = self.rope.char(pos);
        self.rope.remove(pos..pos + 1);
        Ok(removed)
    }
}

impl std::fmt::Display for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.rope)
    }
}
