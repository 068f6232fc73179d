//! Streaming prompt matcher.
//!
//! Matches a fixed literal against a byte stream that arrives in arbitrary
//! chunks. The only state carried between chunks is the number of pattern
//! bytes matched so far.
//!
//! On a mismatch the matcher restarts at zero and re-tests the current byte
//! against the first pattern byte. It does not backtrack through a failure
//! function, so occurrences of self-overlapping patterns (`"abab"`) can be
//! missed. Prompt strings such as `"password"` have no such overlap.

/// A literal byte sequence searched for in the child's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    bytes: Vec<u8>,
}

impl Pattern {
    /// Default prompt searched for before sending the secret.
    pub const DEFAULT_PROMPT: &'static str = "password";

    /// Prefix of the host-key confirmation question printed by ssh.
    pub const HOST_AUTHENTICITY: &'static str = "The authenticity of host ";

    pub fn new(pattern: impl AsRef<[u8]>) -> Self {
        Self {
            bytes: pattern.as_ref().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Feed `chunk` to the automaton starting from `state` and return the new
    /// state.
    ///
    /// Processing stops as soon as the pattern completes, so bytes after a
    /// completed match in the same chunk are not consumed. A completed state
    /// is sticky until the caller resets it.
    pub fn advance(&self, mut state: usize, chunk: &[u8]) -> usize {
        for &byte in chunk {
            if state >= self.bytes.len() {
                break;
            }
            if self.bytes[state] == byte {
                state += 1;
            } else {
                state = usize::from(self.bytes[0] == byte);
            }
        }
        state
    }

    pub fn is_complete(&self, state: usize) -> bool {
        !self.bytes.is_empty() && state == self.bytes.len()
    }
}

/// A [`Pattern`] paired with its running match state.
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    pattern: Pattern,
    state: usize,
}

impl PromptMatcher {
    pub fn new(pattern: Pattern) -> Self {
        Self { pattern, state: 0 }
    }

    /// Advance over `chunk`, returning `true` when the pattern is complete.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        self.state = self.pattern.advance(self.state, chunk);
        self.pattern.is_complete(self.state)
    }

    pub fn state(&self) -> usize {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0;
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}
