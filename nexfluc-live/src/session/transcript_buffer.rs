//! Transcript buffer
//!
//! Committed text is append-only; at most one partial overlays it. A new
//! partial replaces the previous one; a committed event appends and clears
//! the partial.

use crate::types::TranscriptEvent;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    committed: String,
    partial: Option<String>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: TranscriptEvent) {
        match event {
            TranscriptEvent::Partial { text } => {
                let text = text.trim();
                self.partial = (!text.is_empty()).then(|| text.to_string());
            }
            TranscriptEvent::Committed { text } => {
                let text = text.trim();
                if !text.is_empty() {
                    if !self.committed.is_empty() {
                        self.committed.push(' ');
                    }
                    self.committed.push_str(text);
                }
                self.partial = None;
            }
        }
    }

    pub fn committed(&self) -> &str {
        &self.committed
    }

    pub fn partial(&self) -> Option<&str> {
        self.partial.as_deref()
    }

    /// Committed text followed by the partial overlay
    pub fn visible(&self) -> String {
        match (&self.partial, self.committed.is_empty()) {
            (None, _) => self.committed.clone(),
            (Some(partial), true) => partial.clone(),
            (Some(partial), false) => format!("{} {}", self.committed, partial),
        }
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.partial = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(text: &str) -> TranscriptEvent {
        TranscriptEvent::Partial {
            text: text.to_string(),
        }
    }

    fn committed(text: &str) -> TranscriptEvent {
        TranscriptEvent::Committed {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_partial_replaces_partial() {
        let mut buffer = TranscriptBuffer::new();
        buffer.apply(partial("our star"));
        buffer.apply(partial("our startup"));
        assert_eq!(buffer.visible(), "our startup");
        assert_eq!(buffer.committed(), "");
    }

    #[test]
    fn test_commit_appends_and_clears_partial() {
        let mut buffer = TranscriptBuffer::new();
        buffer.apply(committed("Our startup Acme."));
        buffer.apply(partial("It builds"));
        assert_eq!(buffer.visible(), "Our startup Acme. It builds");

        buffer.apply(committed("It builds tools."));
        assert_eq!(buffer.committed(), "Our startup Acme. It builds tools.");
        assert!(buffer.partial().is_none());
    }

    #[test]
    fn test_empty_commit_only_clears_partial() {
        let mut buffer = TranscriptBuffer::new();
        buffer.apply(committed("first"));
        buffer.apply(partial("pending"));
        buffer.apply(committed("   "));
        assert_eq!(buffer.visible(), "first");
    }

    #[test]
    fn test_clear() {
        let mut buffer = TranscriptBuffer::new();
        buffer.apply(committed("first"));
        buffer.apply(partial("second"));
        buffer.clear();
        assert_eq!(buffer, TranscriptBuffer::default());
    }
}
