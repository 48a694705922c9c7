//! Periodic throughput sampling.
//!
//! Each owned stream has a [`ByteCounter`] written by the packet path. A
//! [`SamplerScheduler`] runs one timer task per stream id that swaps the
//! counter to zero every period and publishes the rate as
//! [`MirrorEvent::ThroughputUpdated`]. Stopping a sampler cancels its task
//! immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

use crate::events::MirrorEvent;

/// Bytes received since the last sample.
#[derive(Debug, Default)]
pub struct ByteCounter(AtomicU64);

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: usize) {
        self.0.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Read and reset in one atomic step.
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Owns the per-stream sampling tasks, keyed by stream id.
#[derive(Debug)]
pub struct SamplerScheduler {
    period: Duration,
    events: broadcast::Sender<MirrorEvent>,
    tasks: Mutex<HashMap<u32, CancellationToken>>,
}

impl SamplerScheduler {
    pub fn new(period: Duration, events: broadcast::Sender<MirrorEvent>) -> Self {
        Self {
            period,
            events,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start sampling `counter` for `stream_id` on the current runtime.
    ///
    /// Returns `false` if a sampler is already running for the id, or if
    /// called outside a tokio runtime.
    pub fn start(&self, stream_id: u32, counter: Arc<ByteCounter>) -> bool {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    stream_id = format!("0x{:08X}", stream_id),
                    "No tokio runtime; throughput sampling disabled"
                );
                return false;
            }
        };

        let mut tasks = self.lock_tasks();
        if tasks.contains_key(&stream_id) {
            return false;
        }

        let token = CancellationToken::new();
        tasks.insert(stream_id, token.clone());
        drop(tasks);

        let period = self.period;
        let events = self.events.clone();
        handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let bytes = counter.take();
                        let bytes_per_sec = (bytes as f64 / period.as_secs_f64()).round() as u64;
                        let _ = events.send(MirrorEvent::ThroughputUpdated {
                            stream_id,
                            bytes_per_sec,
                        });
                    }
                }
            }
            tracing::trace!(stream_id = format!("0x{:08X}", stream_id), "Sampler stopped");
        });

        tracing::debug!(
            stream_id = format!("0x{:08X}", stream_id),
            period_ms = period.as_millis() as u64,
            "Sampler started"
        );
        true
    }

    /// Cancel the sampler for `stream_id`. Returns `true` if one was running.
    pub fn stop(&self, stream_id: u32) -> bool {
        match self.lock_tasks().remove(&stream_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every sampler.
    pub fn stop_all(&self) {
        for (_, token) in self.lock_tasks().drain() {
            token.cancel();
        }
    }

    pub fn is_running(&self, stream_id: u32) -> bool {
        self.lock_tasks().contains_key(&stream_id)
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<u32, CancellationToken>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SamplerScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn scheduler(period: Duration) -> (SamplerScheduler, broadcast::Receiver<MirrorEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (SamplerScheduler::new(period, tx), rx)
    }

    async fn next_rate(rx: &mut broadcast::Receiver<MirrorEvent>) -> (u32, u64) {
        match rx.recv().await.unwrap() {
            MirrorEvent::ThroughputUpdated {
                stream_id,
                bytes_per_sec,
            } => (stream_id, bytes_per_sec),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn byte_counter_take_resets() {
        let counter = ByteCounter::new();
        counter.add(100);
        counter.add(28);
        assert_eq!(counter.get(), 128);
        assert_eq!(counter.take(), 128);
        assert_eq!(counter.take(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_rate_every_period() {
        let (sched, mut rx) = scheduler(Duration::from_secs(1));
        let counter = Arc::new(ByteCounter::new());
        assert!(sched.start(0x1A2B, Arc::clone(&counter)));

        counter.add(4800);
        assert_eq!(next_rate(&mut rx).await, (0x1A2B, 4800));

        counter.add(2400);
        assert_eq!(next_rate(&mut rx).await, (0x1A2B, 2400));
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_is_scaled_to_one_second() {
        let (sched, mut rx) = scheduler(Duration::from_millis(500));
        let counter = Arc::new(ByteCounter::new());
        sched.start(7, Arc::clone(&counter));

        counter.add(1000);
        assert_eq!(next_rate(&mut rx).await, (7, 2000));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_immediately() {
        let (sched, mut rx) = scheduler(Duration::from_secs(1));
        let counter = Arc::new(ByteCounter::new());
        sched.start(1, Arc::clone(&counter));
        assert!(sched.is_running(1));
        assert!(!sched.start(1, Arc::clone(&counter)));

        assert!(sched.stop(1));
        assert!(!sched.is_running(1));
        assert!(!sched.stop(1));

        counter.add(100);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_cancels_every_stream() {
        let (sched, _rx) = scheduler(Duration::from_secs(1));
        for id in [1, 2, 3] {
            sched.start(id, Arc::new(ByteCounter::new()));
        }
        sched.stop_all();
        for id in [1, 2, 3] {
            assert!(!sched.is_running(id));
        }
    }

    #[test]
    fn start_outside_runtime_is_refused() {
        let (sched, _rx) = scheduler(Duration::from_secs(1));
        assert!(!sched.start(1, Arc::new(ByteCounter::new())));
        assert!(!sched.is_running(1));
    }
}
