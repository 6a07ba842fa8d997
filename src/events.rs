//! Trace events emitted by the relay threads and the sinks that render them.

use std::io::{self, ErrorKind, Write};
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::log_dev;
use crate::types::{Message, ProducerId};

/// Something a producer or the consumer did that is worth reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Sent { producer: ProducerId, message: Message },
    Received { message: Message },
    Processing { message: Message, duration: Duration },
    Idle,
    ProducerStopped { producer: ProducerId, sent: u64 },
    ProducerFailed {
        producer: ProducerId,
        sent: u64,
        error: String,
    },
    ConsumerStopped { received: u64 },
}

/// Destination for trace events. Implementations must tolerate calls from
/// several threads at once.
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

/// Writes one human-readable line per event to stdout.
///
/// When the reader goes away (`queue_relay | head`) the sink cancels
/// `shutdown`, so the relay winds down instead of polling into a dead pipe.
pub struct StdoutSink {
    /// Drop idle notices; the busy-polling consumer emits them continuously.
    quiet_idle: bool,
    shutdown: CancellationToken,
}

impl StdoutSink {
    pub fn new(quiet_idle: bool, shutdown: CancellationToken) -> Self {
        Self {
            quiet_idle,
            shutdown,
        }
    }

    fn write_line(&self, out: &mut impl Write, line: &str) {
        let result = writeln!(out, "{line}").and_then(|()| out.flush());
        match result {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                if !self.shutdown.is_cancelled() {
                    log_dev!("[SINK] stdout closed, shutting down");
                    self.shutdown.cancel();
                }
            }
            // Other write errors only cost this line.
            Err(err) => log_dev!("[SINK] stdout write failed: {err}"),
        }
    }

    fn render(event: &Event) -> String {
        match event {
            Event::Sent { message, .. } => format!("Sending: {message}"),
            Event::Received { message } => format!("Received: {message}"),
            Event::Processing { duration, .. } => format!(
                "\"Processing\" the received message for {}ms",
                duration.as_millis()
            ),
            Event::Idle => "No message received".to_string(),
            Event::ProducerStopped { producer, sent } => {
                format!("Producer {producer} stopped after {sent} message(s)")
            }
            Event::ProducerFailed {
                producer,
                sent,
                error,
            } => format!("Producer {producer} failed after {sent} message(s): {error}"),
            Event::ConsumerStopped { received } => {
                format!("Consumer stopped after {received} message(s)")
            }
        }
    }
}

impl EventSink for StdoutSink {
    fn record(&self, event: Event) {
        if self.quiet_idle && event == Event::Idle {
            return;
        }
        let line = Self::render(&event);
        self.write_line(&mut io::stdout().lock(), &line);
    }
}

/// Keeps every event in memory, in arrival order.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<Event>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().expect("recording sink mutex poisoned").clone()
    }

    /// Messages the consumer reported as received, in order.
    pub fn received(&self) -> Vec<Message> {
        self.snapshot()
            .into_iter()
            .filter_map(|event| match event {
                Event::Received { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn idle_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|event| **event == Event::Idle)
            .count()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn record(&self, event: Event) {
        self.events
            .lock()
            .expect("recording sink mutex poisoned")
            .push(event);
    }
}
