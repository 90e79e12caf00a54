//! Wire protocol types, frame codec, payload codec set, and link-layer
//! transforms shared by meshrpc's transport, server, and client crates.

mod codec;
mod compression;
mod encryption;
mod error;
mod frame;
mod header;
mod heartbeat;
mod link;

pub use codec::{codec_for_content_type, JsonCodec, KnownCodec, MsgpackCodec, PayloadCodec, ProtobufCodec};
pub use compression::{Compressor, GzipCompressor, IdentityCompressor};
pub use encryption::{AesGcmEncryptor, Encryptor};
pub use error::{Error, Result};
pub use frame::{decode, encode, MAGIC};
pub use header::{split_service_method, Header, Message, MessageKind};
pub use heartbeat::{HeartbeatBody, HeartbeatType};
pub use link::{BoxedCompressor, BoxedEncryptor, LinkLayer};
