//! Accumulated session output for late joiners.

/// Default buffer capacity: 1MB
pub const DEFAULT_CAPACITY: usize = 1_048_576;

/// Text buffer with a fixed byte capacity; the oldest text is dropped first.
#[derive(Debug)]
pub struct Scrollback {
    text: String,
    capacity: usize,
}

impl Scrollback {
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            capacity,
        }
    }

    /// Append text. Past capacity the oldest text is trimmed on a char
    /// boundary down to three quarters of capacity, so a full buffer is
    /// shifted once per quarter of capacity appended rather than per chunk.
    pub fn append(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.len() <= self.capacity {
            return;
        }
        let retain = self.capacity - self.capacity / 4;
        let mut cut = self.text.len() - retain;
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        self.text.drain(..cut);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl Default for Scrollback {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
