/// Failures turning frames into messages and back.
///
/// A decode failure is the client's fault and ends its connection; an
/// encode failure means a response could not be written and is logged.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Malformed JSON, an unknown `"type"`, or missing fields.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("empty frame")]
    EmptyFrame,

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
}
