//! Frame encoding.
//!
//! Sessions hand raw frames to a [`Codec`] and get typed
//! [`Request`](crate::Request)s back; [`Response`](crate::Response)s go the
//! other way through the same codec.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Largest frame a codec will try to decode.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Shared by every session for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// # Errors
    /// [`ProtocolError::EmptyFrame`] and [`ProtocolError::FrameTooLarge`]
    /// are checked before the payload is parsed.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// JSON text, one message per frame.
///
/// ```rust
/// use gamehall_protocol::{Codec, JsonCodec, Request, RoomId};
///
/// let request: Request = JsonCodec
///     .decode(br#"{"type":"Cancel","room_id":3}"#)
///     .unwrap();
/// assert_eq!(request, Request::Cancel { room_id: RoomId(3) });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        if data.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                len: data.len(),
                max: MAX_FRAME_LEN,
            });
        }
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, Response};

    #[test]
    fn test_decode_garbage_decode_error() {
        let result: Result<Request, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_type_decode_error() {
        let result: Result<Request, _> = JsonCodec.decode(br#"{"type":"Teleport"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_empty_frame_rejected() {
        let result: Result<Request, _> = JsonCodec.decode(b"");
        assert!(matches!(result, Err(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn test_decode_oversized_frame_rejected() {
        let frame = vec![b' '; MAX_FRAME_LEN + 1];
        let result: Result<Request, _> = JsonCodec.decode(&frame);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { len, max: MAX_FRAME_LEN }) if len == MAX_FRAME_LEN + 1
        ));
    }

    #[test]
    fn test_encode_response_tagged_by_type() {
        let bytes = JsonCodec.encode(&Response::Authenticated).unwrap();
        assert_eq!(bytes, br#"{"type":"Authenticated"}"#);
    }
}
