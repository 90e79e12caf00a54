//! Heartbeat payload shape carried inside Heartbeat-kind [`crate::Message`]s
//! (spec §6). Serialized with JSON regardless of the negotiated payload
//! codec — heartbeats are transport-internal and never reach a service
//! handler.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatType {
    Ping,
    Pong,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatBody {
    #[serde(rename = "type")]
    pub kind: HeartbeatType,
    /// Sender's local clock at send time, nanoseconds since the Unix epoch.
    pub time_now: i64,
}

impl HeartbeatBody {
    pub fn ping(time_now: i64) -> Self {
        HeartbeatBody {
            kind: HeartbeatType::Ping,
            time_now,
        }
    }

    pub fn pong(time_now: i64) -> Self {
        HeartbeatBody {
            kind: HeartbeatType::Pong,
            time_now,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::CodecFailure(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::CodecFailure(e.to_string()))
    }
}
