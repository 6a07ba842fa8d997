//! Shared identifiers and the message model passed through the relay.

use std::fmt;

/// Identifier distinguishing one producer from another.
pub type ProducerId = u64;
/// Per-producer sequence number, starting at 0.
pub type Sequence = u64;

/// One labelled message, rendered as `Q<producer> OK<sequence>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Producer that created the message.
    pub producer: ProducerId,
    /// Position in the producer's stream.
    pub sequence: Sequence,
    text: String,
}

impl Message {
    /// Build the message for `producer` at position `sequence`.
    pub fn new(producer: ProducerId, sequence: Sequence) -> Self {
        Self {
            producer,
            sequence,
            text: format!("Q{producer} OK{sequence}"),
        }
    }

    /// Parse the `Q<producer> OK<sequence>` text form.
    #[allow(dead_code)]
    pub fn parse(text: &str) -> Option<Self> {
        let (queue, ok) = text.split_once(' ')?;
        let producer = queue.strip_prefix('Q')?.parse().ok()?;
        let sequence = ok.strip_prefix("OK")?.parse().ok()?;
        Some(Self::new(producer, sequence))
    }

    #[allow(dead_code)]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_queue_label() {
        let msg = Message::new(7, 3);
        assert_eq!(msg.as_str(), "Q7 OK3");
        assert_eq!(msg.to_string(), "Q7 OK3");
    }

    #[test]
    fn parses_rendered_text() {
        let msg = Message::parse("Q2 OK41").expect("valid message");
        assert_eq!(msg.producer, 2);
        assert_eq!(msg.sequence, 41);
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(Message::parse("Q2OK41").is_none());
        assert!(Message::parse("X2 OK41").is_none());
        assert!(Message::parse("Q2 OKx").is_none());
    }
}
