//! The per-connection pending-call table that demultiplexes responses
//! back to their originating caller by request id (spec §4.6).

use std::collections::HashMap;
use std::sync::Mutex;

use meshrpc_core::{Message, Result};
use tokio::sync::oneshot;

pub type PendingCall = oneshot::Sender<Result<Message>>;

/// Keyed by request id. A plain `Mutex` is sufficient here: entries are
/// inserted once per request and removed at most once by whichever of
/// "response arrived" or "connection died" happens first, so there is
/// never real contention, only the appearance of it.
#[derive(Default)]
pub struct PendingTable {
    calls: Mutex<HashMap<u64, PendingCall>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: u64, tx: PendingCall) {
        self.calls.lock().unwrap().insert(id, tx);
    }

    pub fn remove(&self, id: u64) -> Option<PendingCall> {
        self.calls.lock().unwrap().remove(&id)
    }

    /// Fail every still-pending call, e.g. when the underlying transport
    /// has died and no more responses will ever arrive.
    pub fn fail_all(&self, make_error: impl Fn() -> meshrpc_core::Error) {
        let mut calls = self.calls.lock().unwrap();
        for (_, tx) in calls.drain() {
            let _ = tx.send(Err(make_error()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshrpc_core::{Error, Header};

    #[tokio::test]
    async fn insert_then_remove_delivers_to_waiter() {
        let table = PendingTable::new();
        let (tx, rx) = oneshot::channel();
        table.insert(1, tx);

        let waiter = table.remove(1).unwrap();
        waiter
            .send(Ok(Message::new(Header::response(1), Default::default())))
            .unwrap();

        let msg = rx.await.unwrap().unwrap();
        assert_eq!(msg.header.id, 1);
    }

    #[tokio::test]
    async fn fail_all_delivers_error_to_every_waiter() {
        let table = PendingTable::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        table.insert(1, tx1);
        table.insert(2, tx2);

        table.fail_all(|| Error::TransportClosed);

        assert!(matches!(rx1.await.unwrap().unwrap_err(), Error::TransportClosed));
        assert!(matches!(rx2.await.unwrap().unwrap_err(), Error::TransportClosed));
    }
}
