//! Deferred broker acknowledgements
//!
//! The ack request shares a bounded channel with the event loop that
//! drains it. Awaiting room in that channel from the polling task would
//! park the task that frees it, so acks that do not fit are held here and
//! retried after the next poll.

use rumqttc::{AsyncClient, Publish};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Default)]
pub struct PendingAcks {
    queue: VecDeque<Publish>,
}

impl PendingAcks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an ack for a publish that is already on disk
    pub fn push(&mut self, publish: Publish) {
        self.queue.push_back(publish);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Hand as many acks as fit to the client, oldest first
    ///
    /// Never waits. Returns how many were handed over.
    pub fn flush(&mut self, client: &AsyncClient) -> usize {
        let mut sent = 0;
        while let Some(publish) = self.queue.front() {
            if let Err(e) = client.try_ack(publish) {
                debug!(pending = self.queue.len(), error = %e, "Request channel full, deferring acks");
                break;
            }
            self.queue.pop_front();
            sent += 1;
        }
        sent
    }
}
