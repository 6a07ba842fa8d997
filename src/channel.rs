//! Bounded FIFO channel with blocking senders and a non-blocking receiver.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::error::ChannelError;
use crate::log_dev;

// How often a sender blocked on a full channel re-checks its token.
const CANCEL_POLL_MS: u64 = 20;

/// Result of a non-blocking receive that distinguishes "nothing yet" from
/// "nothing ever again".
#[derive(Debug, PartialEq, Eq)]
pub enum TryRecv<T> {
    Message(T),
    /// Empty but still open.
    Empty,
    /// Closed and fully drained.
    Closed,
}

/// A fixed-capacity, synchronized FIFO shared by producers and a consumer.
pub struct BoundedChannel<T> {
    inner: Mutex<ChannelState<T>>,
    space: Condvar,
    capacity: usize,
}

struct ChannelState<T> {
    queue: VecDeque<T>,
    closed: bool,
    producers: usize,
    high_water: usize,
}

impl<T> BoundedChannel<T> {
    /// Create an open, empty channel holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Result<Self, ChannelError> {
        if capacity == 0 {
            return Err(ChannelError::InvalidCapacity);
        }
        Ok(Self {
            inner: Mutex::new(ChannelState {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
                producers: 0,
                high_water: 0,
            }),
            space: Condvar::new(),
            capacity,
        })
    }

    /// Append a message, blocking while the channel is full.
    ///
    /// Fails with [`ChannelError::Closed`] if the channel is closed before
    /// space frees up; the buffer is left untouched in that case.
    #[allow(dead_code)]
    pub fn send(&self, msg: T) -> Result<(), ChannelError> {
        self.send_until(msg, None, None)
    }

    /// Like [`send`](Self::send), but gives up with [`ChannelError::Timeout`]
    /// once `timeout` elapses without space.
    #[allow(dead_code)]
    pub fn send_timeout(&self, msg: T, timeout: Duration) -> Result<(), ChannelError> {
        self.send_until(msg, Some(Instant::now() + timeout), None)
    }

    /// Like [`send`](Self::send), but gives up with
    /// [`ChannelError::Cancelled`] once `token` is cancelled.
    pub fn send_cancellable(
        &self,
        msg: T,
        token: &CancellationToken,
    ) -> Result<(), ChannelError> {
        self.send_until(msg, None, Some(token))
    }

    fn send_until(
        &self,
        msg: T,
        deadline: Option<Instant>,
        token: Option<&CancellationToken>,
    ) -> Result<(), ChannelError> {
        let mut guard = self.inner.lock().expect("channel mutex poisoned");
        loop {
            if guard.closed {
                return Err(ChannelError::Closed);
            }
            if guard.queue.len() < self.capacity {
                guard.queue.push_back(msg);
                guard.high_water = guard.high_water.max(guard.queue.len());
                return Ok(());
            }
            if token.is_some_and(CancellationToken::is_cancelled) {
                return Err(ChannelError::Cancelled);
            }

            let mut wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ChannelError::Timeout);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            if token.is_some() {
                let poll = Duration::from_millis(CANCEL_POLL_MS);
                wait = Some(wait.map_or(poll, |w| w.min(poll)));
            }

            // Wait releases the lock and re-acquires it before returning.
            guard = match wait {
                Some(wait) => {
                    self.space
                        .wait_timeout(guard, wait)
                        .expect("condvar wait failed")
                        .0
                }
                None => self.space.wait(guard).expect("condvar wait failed"),
            };
        }
    }

    /// Take the oldest message without blocking; `None` when empty, whether
    /// or not the channel is closed.
    #[allow(dead_code)]
    pub fn try_recv(&self) -> Option<T> {
        let mut guard = self.inner.lock().expect("channel mutex poisoned");
        let msg = guard.queue.pop_front();
        if msg.is_some() {
            self.space.notify_all();
        }
        msg
    }

    /// Non-blocking receive that also reports when the channel is closed and
    /// drained.
    pub fn poll(&self) -> TryRecv<T> {
        let mut guard = self.inner.lock().expect("channel mutex poisoned");
        match guard.queue.pop_front() {
            Some(msg) => {
                self.space.notify_all();
                TryRecv::Message(msg)
            }
            None if guard.closed => TryRecv::Closed,
            None => TryRecv::Empty,
        }
    }

    /// Transition from open to closed and wake every blocked sender.
    ///
    /// Only the first call has an effect; later calls report
    /// [`ChannelError::AlreadyClosed`] and leave the channel as it is.
    #[allow(dead_code)]
    pub fn close(&self) -> Result<(), ChannelError> {
        let mut guard = self.inner.lock().expect("channel mutex poisoned");
        if guard.closed {
            return Err(ChannelError::AlreadyClosed);
        }
        guard.closed = true;
        self.space.notify_all();
        log_dev!("[CHANNEL] closed with {} buffered", guard.queue.len());
        Ok(())
    }

    /// Current number of buffered messages.
    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("channel mutex poisoned");
        guard.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        let guard = self.inner.lock().expect("channel mutex poisoned");
        guard.closed
    }

    /// Largest number of messages ever buffered at once.
    pub fn high_water_mark(&self) -> usize {
        let guard = self.inner.lock().expect("channel mutex poisoned");
        guard.high_water
    }

    /// Register a producer; the channel closes when the last lease drops.
    pub fn register_producer(self: &Arc<Self>) -> ProducerLease<T> {
        let mut guard = self.inner.lock().expect("channel mutex poisoned");
        guard.producers += 1;
        ProducerLease {
            channel: Arc::clone(self),
        }
    }

    fn release_producer(&self) {
        let mut guard = self.inner.lock().expect("channel mutex poisoned");
        guard.producers = guard.producers.saturating_sub(1);
        if guard.producers > 0 {
            log_dev!("[CHANNEL] producer released, {} remaining", guard.producers);
            return;
        }
        if !guard.closed {
            guard.closed = true;
            self.space.notify_all();
            log_dev!("[CHANNEL] last producer released, channel closed");
        }
    }
}

/// A producer's hold on a channel. Dropping the last lease closes it, so
/// closing runs on every exit path of the owning thread, unwinding included.
pub struct ProducerLease<T> {
    channel: Arc<BoundedChannel<T>>,
}

impl<T> ProducerLease<T> {
    pub fn channel(&self) -> &BoundedChannel<T> {
        &self.channel
    }
}

impl<T> Drop for ProducerLease<T> {
    fn drop(&mut self) {
        self.channel.release_producer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::collections::HashMap;
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn text(msg: Option<Message>) -> Option<String> {
        msg.map(|m| m.to_string())
    }

    #[test]
    fn rejects_zero_capacity() {
        assert_eq!(
            BoundedChannel::<Message>::new(0).err(),
            Some(ChannelError::InvalidCapacity)
        );
    }

    #[test]
    fn try_recv_on_empty_returns_none_immediately() {
        let channel = BoundedChannel::<Message>::new(3).expect("channel");
        let start = Instant::now();
        assert!(channel.try_recv().is_none());
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(channel.len(), 0);
        assert!(!channel.is_closed());
        assert_eq!(channel.poll(), TryRecv::Empty);
    }

    #[test]
    fn full_channel_blocks_fourth_send_until_receive() {
        let channel = Arc::new(BoundedChannel::new(3).expect("channel"));
        for seq in 0..3 {
            channel.send(Message::new(7, seq)).expect("send");
        }
        assert_eq!(channel.len(), 3);

        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let sender = Arc::clone(&channel);
        let handle = thread::spawn(move || {
            ready_tx.send(()).expect("ready");
            sender.send(Message::new(7, 3)).expect("fourth send");
            done_tx.send(()).expect("done");
        });

        ready_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("ready");
        // The fourth send must still be waiting on a full buffer.
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(channel.len(), 3);

        assert_eq!(text(channel.try_recv()).as_deref(), Some("Q7 OK0"));
        done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("fourth send did not complete");
        handle.join().expect("sender thread panicked");

        assert_eq!(channel.len(), 3);
        let rest: Vec<String> = std::iter::from_fn(|| channel.try_recv())
            .map(|m| m.to_string())
            .collect();
        assert_eq!(rest, ["Q7 OK1", "Q7 OK2", "Q7 OK3"]);
    }

    #[test]
    fn send_after_close_fails_without_touching_buffer() {
        let channel = BoundedChannel::new(3).expect("channel");
        channel.send(Message::new(1, 0)).expect("send");
        channel.close().expect("first close");

        assert_eq!(channel.send(Message::new(1, 1)), Err(ChannelError::Closed));
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn drains_buffered_messages_after_close() {
        let channel = BoundedChannel::new(3).expect("channel");
        for seq in 0..3 {
            channel.send(Message::new(4, seq)).expect("send");
        }
        channel.close().expect("close");

        assert_eq!(text(channel.try_recv()).as_deref(), Some("Q4 OK0"));
        assert_eq!(channel.poll(), TryRecv::Message(Message::new(4, 1)));
        assert_eq!(text(channel.try_recv()).as_deref(), Some("Q4 OK2"));
        assert!(channel.try_recv().is_none());
        assert_eq!(channel.poll(), TryRecv::Closed);
        assert_eq!(channel.poll(), TryRecv::Closed);
    }

    #[test]
    fn double_close_reports_already_closed() {
        let channel = BoundedChannel::<Message>::new(3).expect("channel");
        assert_eq!(channel.close(), Ok(()));
        assert_eq!(channel.close(), Err(ChannelError::AlreadyClosed));
        assert!(channel.is_closed());
    }

    #[test]
    fn close_wakes_blocked_sender_with_error() {
        let channel = Arc::new(BoundedChannel::new(1).expect("channel"));
        channel.send(Message::new(1, 0)).expect("send");

        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let sender = Arc::clone(&channel);
        let handle = thread::spawn(move || {
            ready_tx.send(()).expect("ready");
            done_tx.send(sender.send(Message::new(1, 1))).expect("done");
        });

        ready_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("ready");
        channel.close().expect("close");

        let result = done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("blocked sender did not wake");
        assert_eq!(result, Err(ChannelError::Closed));
        assert_eq!(channel.len(), 1);
        handle.join().expect("sender thread panicked");
    }

    #[test]
    fn send_timeout_gives_up_on_full_channel() {
        let channel = BoundedChannel::new(1).expect("channel");
        channel.send(Message::new(1, 0)).expect("send");
        let result = channel.send_timeout(Message::new(1, 1), Duration::from_millis(30));
        assert_eq!(result, Err(ChannelError::Timeout));
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn cancellation_unblocks_full_send() {
        let channel = Arc::new(BoundedChannel::new(1).expect("channel"));
        channel.send(Message::new(1, 0)).expect("send");
        let token = CancellationToken::new();

        let (done_tx, done_rx) = mpsc::channel();
        let sender = Arc::clone(&channel);
        let sender_token = token.clone();
        let handle = thread::spawn(move || {
            let result = sender.send_cancellable(Message::new(1, 1), &sender_token);
            done_tx.send(result).expect("done");
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(60)).is_err());
        token.cancel();
        let result = done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("cancelled sender did not wake");
        assert_eq!(result, Err(ChannelError::Cancelled));
        handle.join().expect("sender thread panicked");
    }

    #[test]
    fn last_lease_closes_channel() {
        let channel = Arc::new(BoundedChannel::<Message>::new(3).expect("channel"));
        let first = channel.register_producer();
        let second = channel.register_producer();

        drop(first);
        assert!(!channel.is_closed());
        drop(second);
        assert!(channel.is_closed());
        // An explicit close after the leases is still well defined.
        assert_eq!(channel.close(), Err(ChannelError::AlreadyClosed));
    }

    #[test]
    fn lease_released_on_panic() {
        let channel = Arc::new(BoundedChannel::<Message>::new(3).expect("channel"));
        let lease = channel.register_producer();
        let handle = thread::spawn(move || {
            let _lease = lease;
            panic!("producer failed");
        });
        assert!(handle.join().is_err());
        assert!(channel.is_closed());
    }

    #[test]
    fn concurrent_producers_respect_capacity_and_order() {
        let channel = Arc::new(BoundedChannel::new(3).expect("channel"));
        let producers = 4u64;
        let per_producer = 200u64;
        let barrier = Arc::new(Barrier::new(producers as usize + 1));

        let mut handles = Vec::new();
        for id in 1..=producers {
            let lease = channel.register_producer();
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for seq in 0..per_producer {
                    lease.channel().send(Message::new(id, seq)).expect("send");
                }
            }));
        }

        barrier.wait();
        let mut next: HashMap<u64, u64> = HashMap::new();
        let mut received = 0;
        loop {
            match channel.poll() {
                TryRecv::Message(msg) => {
                    assert!(channel.len() <= channel.capacity());
                    let expected = next.entry(msg.producer).or_insert(0);
                    // No gaps, no duplicates, no reordering per producer.
                    assert_eq!(msg.sequence, *expected);
                    *expected += 1;
                    received += 1;
                }
                TryRecv::Empty => thread::yield_now(),
                TryRecv::Closed => break,
            }
        }

        for handle in handles {
            handle.join().expect("producer thread panicked");
        }
        assert_eq!(received, producers * per_producer);
        assert!(channel.high_water_mark() <= 3);
        assert!(channel.high_water_mark() >= 1);
    }
}
