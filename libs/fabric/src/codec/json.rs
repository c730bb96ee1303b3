use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::Result;

/// JSON codec used for event frames and document bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl JsonCodec {
    /// Encode straight to a string, for text websocket messages.
    pub fn encode_text<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::codec::Frame;

    #[test]
    fn frame_without_data_decodes_as_null() {
        let frame: Frame = JsonCodec.decode(br#"{"event":"ping"}"#).unwrap();
        assert_eq!(frame, Frame::new("ping", serde_json::Value::Null));
    }

    #[test]
    fn frame_text_shape() {
        let frame = Frame::new("chat_message", json!({ "message": "hi" }));
        assert_eq!(
            JsonCodec.encode_text(&frame).unwrap(),
            r#"{"event":"chat_message","data":{"message":"hi"}}"#
        );
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let err = JsonCodec.decode::<Frame>(b"not json").unwrap_err();
        assert!(matches!(err, crate::Error::Codec(_)));
    }
}
