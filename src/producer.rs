//! Producer task: publishes a labelled message stream into the channel.

use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::channel::ProducerLease;
use crate::error::{ChannelError, ProducerError};
use crate::events::{Event, EventSink};
use crate::log_dev;
use crate::types::{Message, ProducerId, Sequence};

/// Per-producer state; owned by exactly one thread.
pub struct Producer {
    id: ProducerId,
    next_sequence: Sequence,
    interval: Duration,
    limit: Option<u64>,
}

impl Producer {
    /// A producer that never stops on its own.
    pub fn new(id: ProducerId, interval: Duration) -> Self {
        Self {
            id,
            next_sequence: 0,
            interval,
            limit: None,
        }
    }

    /// Stop after `limit` messages per call to [`run`](Self::run).
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn id(&self) -> ProducerId {
        self.id
    }

    /// Send messages until the limit is reached or `token` is cancelled.
    ///
    /// Returns how many messages were sent. A closed channel is fatal; the
    /// error still carries the count delivered before it. The lease is
    /// consumed, so the channel closes when this was the last producer, on
    /// every exit path.
    pub fn run(
        &mut self,
        lease: ProducerLease<Message>,
        token: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<u64, ProducerError> {
        let channel = lease.channel();
        let mut sent = 0u64;
        while self.limit.is_none_or(|limit| sent < limit) {
            if token.is_cancelled() {
                break;
            }
            let message = Message::new(self.id, self.next_sequence);
            match channel.send_cancellable(message.clone(), token) {
                Ok(()) => {}
                Err(ChannelError::Cancelled) => break,
                Err(err) => {
                    log_dev!("[PRODUCER] Q{} send failed: {err}", self.id);
                    return Err(ProducerError { sent, source: err });
                }
            }
            sink.record(Event::Sent {
                producer: self.id,
                message,
            });
            self.next_sequence += 1;
            sent += 1;

            let more = self.limit.is_none_or(|limit| sent < limit);
            if more && token.sleep(self.interval) {
                break;
            }
        }
        log_dev!("[PRODUCER] Q{} exiting after {sent} message(s)", self.id);
        Ok(sent)
    }
}
