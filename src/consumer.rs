//! Consumer task: drains the channel with a non-blocking poll loop.

use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::channel::{BoundedChannel, TryRecv};
use crate::events::{Event, EventSink};
use crate::log_dev;
use crate::types::Message;

/// Totals reported when the consumer loop ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub idle_polls: u64,
}

pub struct Consumer {
    processing: Duration,
    idle_backoff: Duration,
}

impl Consumer {
    /// An `idle_backoff` of zero busy-polls an empty channel.
    pub fn new(processing: Duration, idle_backoff: Duration) -> Self {
        Self {
            processing,
            idle_backoff,
        }
    }

    /// Poll until cancelled, or until the channel is closed and drained.
    ///
    /// The poll itself never blocks; the only suspensions are the simulated
    /// processing delay and the optional idle backoff.
    pub fn run(
        &self,
        channel: &BoundedChannel<Message>,
        token: &CancellationToken,
        sink: &dyn EventSink,
    ) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        while !token.is_cancelled() {
            match channel.poll() {
                TryRecv::Message(message) => {
                    stats.received += 1;
                    sink.record(Event::Received {
                        message: message.clone(),
                    });
                    sink.record(Event::Processing {
                        message,
                        duration: self.processing,
                    });
                    token.sleep(self.processing);
                }
                TryRecv::Empty => {
                    stats.idle_polls += 1;
                    sink.record(Event::Idle);
                    if !self.idle_backoff.is_zero() {
                        token.sleep(self.idle_backoff);
                    }
                }
                TryRecv::Closed => {
                    log_dev!("[CONSUMER] channel closed and drained");
                    break;
                }
            }
        }
        stats
    }
}
