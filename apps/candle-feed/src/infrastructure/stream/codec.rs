//! Stream Codec
//!
//! JSON encoding of outgoing requests and decoding of incoming frames.

use crate::infrastructure::stream::messages::Envelope;

/// Frame-level protocol errors. The offending frame is dropped.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary frame that is not UTF-8 text.
    #[error("binary frame is not UTF-8 ({0} bytes)")]
    NonUtf8Binary(usize),
}

/// JSON codec for stream envelopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a valid envelope.
    pub fn decode(&self, text: &str) -> Result<Envelope, ProtocolError> {
        Ok(serde_json::from_str(text.trim())?)
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not UTF-8 or not a valid envelope.
    pub fn decode_binary(&self, bytes: &[u8]) -> Result<Envelope, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NonUtf8Binary(bytes.len()))?;
        self.decode(text)
    }

    /// Encode an envelope for sending.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, envelope: &Envelope) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::room::Room;

    #[test]
    fn decodes_message_frames() {
        let codec = JsonCodec::new();
        let envelope = codec
            .decode(r#" {"type":"message","room":"price:P","data":{"price":2.0}} "#)
            .unwrap();
        assert_eq!(
            envelope,
            Envelope::Message {
                room: Room::price("P"),
                data: json!({"price": 2.0})
            }
        );
    }

    #[test]
    fn rejects_non_json() {
        let codec = JsonCodec::new();
        assert!(matches!(codec.decode("not json"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn rejects_bad_room_names() {
        let codec = JsonCodec::new();
        assert!(codec.decode(r#"{"type":"message","room":"price:"}"#).is_err());
        assert!(codec.decode(r#"{"type":"message"}"#).is_err());
    }

    #[test]
    fn binary_frames_must_be_utf8() {
        let codec = JsonCodec::new();
        assert!(codec.decode_binary(br#"{"type":"join","room":"price:P"}"#).is_ok());
        assert!(matches!(
            codec.decode_binary(&[0xff, 0xfe]),
            Err(ProtocolError::NonUtf8Binary(2))
        ));
    }

    #[test]
    fn encodes_leave() {
        let codec = JsonCodec::new();
        let text = codec.encode(&Envelope::leave(Room::transactions("T", "P"))).unwrap();
        assert_eq!(text, r#"{"type":"leave","room":"transaction:T:P"}"#);
    }
}
