//! Line editor — the in-progress input buffer.
//!
//! The edit position is always the end of the line: characters append, and
//! backspace removes the last one.  The buffer holds single-byte printable
//! ASCII (the [`crate::event_loop::KeyDecoder`] only ever produces such
//! characters), so byte length and character count coincide.

/// Maximum characters the editor accepts.  Two bytes of the 1024-byte wire
/// line budget are reserved for the newline terminator and a trailing NUL,
/// for parity with servers that treat lines as C strings.
pub const MAX_INPUT: usize = 1022;

/// The input buffer behind the prompt line.
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
    buffer: String,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append `ch` at the edit position.
    ///
    /// Returns `false` when the buffer is full; the caller decides how to
    /// signal the rejection (the event loop rings the bell).  The existing
    /// contents are preserved either way.
    pub fn append_char(&mut self, ch: char) -> bool {
        if self.buffer.len() >= MAX_INPUT {
            return false;
        }
        self.buffer.push(ch);
        true
    }

    /// Remove the character before the edit position.
    /// Returns `true` if one was removed.
    pub fn backspace(&mut self) -> bool {
        self.buffer.pop().is_some()
    }

    /// Consume and return the buffer contents, resetting the editor to
    /// empty so the next keystroke starts a fresh line.
    pub fn take_line(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// Replace the entire buffer (history recall), truncated to fit, with
    /// the edit position at the end.
    pub fn set_text(&mut self, text: &str) {
        self.buffer.clear();
        self.buffer.push_str(text);
        self.buffer.truncate(MAX_INPUT);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
