use crate::error::MacroError;

/// Bounded destination for an expansion
///
/// `capacity` counts the terminating NUL of the classic fixed buffer, so at
/// most `capacity - 1` bytes of output fit. Every appended byte is checked.
#[derive(Debug)]
pub(crate) struct ExpansionBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl ExpansionBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
        }
    }

    /// Bytes that can still be written before the buffer is exhausted
    pub(crate) fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    pub(crate) fn push(&mut self, byte: u8) -> Result<(), MacroError> {
        if self.remaining() <= 1 {
            return Err(MacroError::BufferOverflow);
        }
        self.data.push(byte);
        Ok(())
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) -> Result<(), MacroError> {
        for &b in bytes {
            self.push(b)?;
        }
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Turn engine output back into text, tolerating foreign bytes from shells
pub(crate) fn into_string(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}
