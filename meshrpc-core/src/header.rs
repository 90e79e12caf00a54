//! [`Header`] and [`Message`]: the unit of transfer described in spec §3.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Discriminates what a [`Message`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Request,
    Response,
    Heartbeat,
}

/// Request/response/heartbeat envelope metadata.
///
/// `metadata` is a `BTreeMap` rather than a `HashMap` so that two headers
/// built from the same entries compare equal regardless of insertion
/// order — required for the frame codec's round-trip law (spec §8).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub id: u64,
    pub kind: MessageKind,
    pub compress: u8,
    pub codec: String,
    pub service: String,
    pub method: String,
    pub metadata: BTreeMap<String, String>,
    pub timeout: Duration,
    pub error: String,
}

impl Header {
    /// Build a Request header. `service`/`method` must be non-empty per
    /// the Request invariant in spec §3.
    pub fn request(id: u64, service: impl Into<String>, method: impl Into<String>) -> Self {
        Header {
            id,
            kind: MessageKind::Request,
            compress: 0,
            codec: String::new(),
            service: service.into(),
            method: method.into(),
            metadata: BTreeMap::new(),
            timeout: Duration::ZERO,
            error: String::new(),
        }
    }

    /// Build a Response header for the given request id. `error` is empty
    /// on success.
    pub fn response(id: u64) -> Self {
        Header {
            id,
            kind: MessageKind::Response,
            compress: 0,
            codec: String::new(),
            service: String::new(),
            method: String::new(),
            metadata: BTreeMap::new(),
            timeout: Duration::ZERO,
            error: String::new(),
        }
    }

    /// Build a Heartbeat header. `id` is ignored by receivers.
    pub fn heartbeat() -> Self {
        Header {
            id: 0,
            kind: MessageKind::Heartbeat,
            compress: 0,
            codec: String::new(),
            service: String::new(),
            method: String::new(),
            metadata: BTreeMap::new(),
            timeout: Duration::ZERO,
            error: String::new(),
        }
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// `(Header, body)` — the unit of transfer between peers.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub header: Header,
    pub body: bytes::Bytes,
}

impl Message {
    pub fn new(header: Header, body: impl Into<bytes::Bytes>) -> Self {
        Message {
            header,
            body: body.into(),
        }
    }
}

/// `service_method` splitting per spec §6: the substring before the last
/// `.` is the service, after is the method. No `.` means the whole string
/// is the method and the service is empty (and will not resolve).
pub fn split_service_method(service_method: &str) -> (&str, &str) {
    match service_method.rfind('.') {
        Some(idx) => (&service_method[..idx], &service_method[idx + 1..]),
        None => ("", service_method),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_service_method_normal() {
        assert_eq!(split_service_method("Echo.Ping"), ("Echo", "Ping"));
        assert_eq!(
            split_service_method("pkg.Echo.Ping"),
            ("pkg.Echo", "Ping")
        );
    }

    #[test]
    fn split_service_method_no_dot() {
        assert_eq!(split_service_method("Ping"), ("", "Ping"));
    }

    #[test]
    fn header_metadata_order_independent_eq() {
        let mut a = Header::request(1, "Echo", "Ping");
        a.metadata.insert("b".into(), "2".into());
        a.metadata.insert("a".into(), "1".into());

        let mut b = Header::request(1, "Echo", "Ping");
        b.metadata.insert("a".into(), "1".into());
        b.metadata.insert("b".into(), "2".into());

        assert_eq!(a, b);
    }
}
