//! Driver: wires producers and the consumer to one shared channel.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;

use crate::cancel::CancellationToken;
use crate::channel::BoundedChannel;
use crate::config::RelayConfig;
use crate::consumer::{Consumer, ConsumerStats};
use crate::error::ChannelError;
use crate::events::{Event, EventSink};
use crate::log_dev;
use crate::producer::Producer;
use crate::types::{Message, ProducerId};

/// Outcome of one relay run, gathered after every thread has been joined.
#[derive(Debug, Default)]
pub struct RelaySummary {
    pub capacity: usize,
    pub sent: BTreeMap<ProducerId, u64>,
    pub failures: BTreeMap<ProducerId, ChannelError>,
    pub consumer: ConsumerStats,
    pub high_water_mark: usize,
    pub buffered_at_exit: usize,
}

impl RelaySummary {
    /// True when no task ended with an error.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "RELAY SUMMARY")?;
        writeln!(
            out,
            "capacity={} high_water_mark={}",
            self.capacity, self.high_water_mark
        )?;
        writeln!(out, "sent_per_producer={:?}", self.sent)?;
        writeln!(out, "received={}", self.consumer.received)?;
        writeln!(out, "idle_polls={}", self.consumer.idle_polls)?;
        writeln!(out, "buffered_at_exit={}", self.buffered_at_exit)?;
        let failures: BTreeMap<_, _> = self
            .failures
            .iter()
            .map(|(id, err)| (*id, err.to_string()))
            .collect();
        writeln!(out, "failures={failures:?}")?;
        out.flush()
    }
}

/// Run the relay until every thread has stopped.
///
/// With the default configuration nothing stops on its own: producers loop
/// forever and the consumer keeps polling, so the call returns only after
/// `token` is cancelled.
pub fn run(
    config: &RelayConfig,
    token: CancellationToken,
    sink: Arc<dyn EventSink>,
) -> Result<RelaySummary, ChannelError> {
    let channel = Arc::new(BoundedChannel::new(config.capacity)?);
    Ok(run_on(channel, config, token, sink))
}

/// Same as [`run`], on a caller-provided channel.
pub fn run_on(
    channel: Arc<BoundedChannel<Message>>,
    config: &RelayConfig,
    token: CancellationToken,
    sink: Arc<dyn EventSink>,
) -> RelaySummary {
    log_dev!(
        "[RELAY] start producers={:?} capacity={}",
        config.producers,
        channel.capacity()
    );

    // Leases are taken before any thread starts so an early finisher cannot
    // close the channel under a producer that has not registered yet.
    let mut producer_handles = Vec::new();
    for &id in &config.producers {
        let lease = channel.register_producer();
        let token = token.clone();
        let sink = Arc::clone(&sink);
        let mut producer =
            Producer::new(id, config.producer_interval).with_limit(config.messages_per_producer);
        let handle = thread::Builder::new()
            .name(format!("producer-{id}"))
            .spawn(move || {
                let result = producer.run(lease, &token, sink.as_ref());
                match &result {
                    Ok(sent) => sink.record(Event::ProducerStopped {
                        producer: producer.id(),
                        sent: *sent,
                    }),
                    Err(err) => sink.record(Event::ProducerFailed {
                        producer: producer.id(),
                        sent: err.sent,
                        error: err.source.to_string(),
                    }),
                }
                result
            })
            .expect("failed to spawn producer thread");
        producer_handles.push((id, handle));
    }

    let consumer_handle = {
        let channel = Arc::clone(&channel);
        let token = token.clone();
        let sink = Arc::clone(&sink);
        let consumer = Consumer::new(config.processing, config.idle_backoff);
        thread::Builder::new()
            .name("consumer".to_string())
            .spawn(move || {
                let stats = consumer.run(&channel, &token, sink.as_ref());
                sink.record(Event::ConsumerStopped {
                    received: stats.received,
                });
                stats
            })
            .expect("failed to spawn consumer thread")
    };

    let mut summary = RelaySummary {
        capacity: channel.capacity(),
        ..RelaySummary::default()
    };
    for (id, handle) in producer_handles {
        match handle.join().expect("producer thread panicked") {
            Ok(sent) => {
                summary.sent.insert(id, sent);
            }
            Err(err) => {
                eprintln!("producer {id} failed: {err}");
                summary.sent.insert(id, err.sent);
                summary.failures.insert(id, err.source);
            }
        }
    }
    summary.consumer = consumer_handle.join().expect("consumer thread panicked");
    summary.high_water_mark = channel.high_water_mark();
    summary.buffered_at_exit = channel.len();
    log_dev!("[RELAY] all threads joined");
    summary
}
