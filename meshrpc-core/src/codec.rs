//! Payload codecs: the pluggable `(T -> Bytes)` / `(Bytes -> T)` layer that
//! sits above the frame codec. Distinct from [`crate::link`], which
//! transforms already-encoded bytes rather than typed values.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

/// A payload codec identified by a content-type string carried in
/// [`crate::Header::codec`].
pub trait PayloadCodec: Send + Sync {
    fn content_type(&self) -> &'static str;
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| Error::CodecFailure(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::CodecFailure(e.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MsgpackCodec;

impl PayloadCodec for MsgpackCodec {
    fn content_type(&self) -> &'static str {
        "application/x-msgpack"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes> {
        rmp_serde::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| Error::CodecFailure(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::CodecFailure(e.to_string()))
    }
}

/// Protobuf is only meaningful for `prost::Message` types; the generic
/// bound is enforced at each call site rather than at the trait level so
/// that `JsonCodec`/`MsgpackCodec` keep serving ordinary `Serialize`
/// types. [`Error::InvalidProtobufMessage`] is reserved for the server's
/// dynamic-dispatch path, where a registered method's reply type is
/// looked up by name rather than known at compile time.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProtobufCodec;

impl ProtobufCodec {
    pub fn content_type(&self) -> &'static str {
        "application/x-protobuf"
    }

    pub fn encode<T: prost::Message>(&self, value: &T) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(value.encoded_len());
        value
            .encode(&mut buf)
            .map_err(|e| Error::CodecFailure(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    pub fn decode<T: prost::Message + Default>(&self, bytes: &[u8]) -> Result<T> {
        T::decode(bytes).map_err(|e| Error::CodecFailure(e.to_string()))
    }
}

/// Resolve a `Header::codec` content-type string to the codec that should
/// handle it. Unknown or empty strings default to JSON, matching the
/// distilled spec's "absent codec field means JSON" rule.
pub fn codec_for_content_type(content_type: &str) -> KnownCodec {
    match content_type {
        "application/x-msgpack" => KnownCodec::Msgpack,
        "application/x-protobuf" => KnownCodec::Protobuf,
        _ => KnownCodec::Json,
    }
}

/// The closed set of codecs meshrpc ships, for call sites that need to
/// dispatch on content-type without erasing the concrete codec type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KnownCodec {
    Json,
    Msgpack,
    Protobuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[test]
    fn json_round_trip() {
        let codec = JsonCodec;
        let encoded = codec.encode(&Ping { n: 7 }).unwrap();
        let decoded: Ping = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, Ping { n: 7 });
    }

    #[test]
    fn msgpack_round_trip() {
        let codec = MsgpackCodec;
        let encoded = codec.encode(&Ping { n: 9 }).unwrap();
        let decoded: Ping = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, Ping { n: 9 });
    }

    #[test]
    fn unknown_content_type_defaults_to_json() {
        assert_eq!(codec_for_content_type(""), KnownCodec::Json);
        assert_eq!(codec_for_content_type("bogus"), KnownCodec::Json);
        assert_eq!(
            codec_for_content_type("application/x-protobuf"),
            KnownCodec::Protobuf
        );
    }

    #[test]
    fn bad_json_is_codec_failure() {
        let codec = JsonCodec;
        let err = codec.decode::<Ping>(b"not json").unwrap_err();
        assert!(matches!(err, Error::CodecFailure(_)));
    }
}
