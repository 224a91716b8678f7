//! Paced composite publisher
//!
//! One publisher runs per viewer. Each cycle it snapshots the registry,
//! renders the grid on the worker pool, writes one multipart part to the
//! viewer and sleeps for whatever is left of the pacing interval. A slow
//! cycle is never followed by a burst to catch up.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::multipart;
use super::pool::WorkerPool;
use crate::compositor::Compositor;
use crate::error::{Error, Result};
use crate::registry::ClientRegistry;
use crate::stats::ServerMetrics;

/// Default publish rate in frames per second
pub const DEFAULT_PUBLISH_RATE: f64 = 30.0;

/// Destination for encoded multipart parts
///
/// An error means the viewer is gone; the publisher stops on the first one.
pub trait FrameSink: Send {
    /// Write one part
    fn send_part(&mut self, part: Bytes) -> impl Future<Output = Result<()>> + Send;
}

impl FrameSink for mpsc::Sender<Bytes> {
    async fn send_part(&mut self, part: Bytes) -> Result<()> {
        self.send(part).await.map_err(|_| Error::ViewerGone)
    }
}

/// Publisher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherPhase {
    /// Created, not yet streaming
    Prepared,
    /// Emitting frames
    Streaming,
    /// Loop exited; the sink has been released
    Closed,
}

/// Why a publisher stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Process-wide shutdown was signalled
    Shutdown,
    /// The viewer stopped accepting data
    ViewerGone,
}

/// Per-publisher statistics
#[derive(Debug, Clone, Default)]
pub struct PublisherStats {
    /// Parts written to the viewer
    pub frames_sent: u64,
    /// Cycles that fell back to a previous or blank frame
    pub compositor_failures: u64,
    /// Cycles that produced nothing to send
    pub skipped_cycles: u64,
    /// Why the loop ended
    pub exit_reason: Option<ExitReason>,
}

/// Pacing interval for a rate in frames per second
///
/// Non-positive or non-finite rates fall back to the default rate.
pub fn interval_for_rate(fps: f64) -> Duration {
    let fps = if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        DEFAULT_PUBLISH_RATE
    };
    Duration::from_secs_f64(1.0 / fps)
}

/// Paced publisher for one viewer
pub struct StreamPublisher {
    id: u64,
    registry: Arc<ClientRegistry>,
    compositor: Arc<Compositor>,
    pool: WorkerPool,
    interval: Duration,
    metrics: Option<Arc<ServerMetrics>>,
    phase: PublisherPhase,
    last_frame: Option<Bytes>,
    stats: PublisherStats,
}

impl StreamPublisher {
    /// Create a publisher in the `Prepared` phase
    pub fn new(
        id: u64,
        registry: Arc<ClientRegistry>,
        compositor: Arc<Compositor>,
        pool: WorkerPool,
        interval: Duration,
    ) -> Self {
        Self {
            id,
            registry,
            compositor,
            pool,
            interval,
            metrics: None,
            phase: PublisherPhase::Prepared,
            last_frame: None,
            stats: PublisherStats::default(),
        }
    }

    /// Report into shared server metrics
    pub fn with_metrics(mut self, metrics: Arc<ServerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Current phase
    pub fn phase(&self) -> PublisherPhase {
        self.phase
    }

    /// Statistics so far
    pub fn stats(&self) -> &PublisherStats {
        &self.stats
    }

    /// Pacing interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stream composites into `sink` until shutdown or viewer disconnect
    ///
    /// The sink is dropped on return, which ends the viewer's stream.
    pub async fn run<S: FrameSink>(&mut self, mut sink: S, cancel: CancellationToken) -> PublisherStats {
        self.phase = PublisherPhase::Streaming;
        tracing::debug!(
            publisher = self.id,
            interval_ms = self.interval.as_millis() as u64,
            "Publisher streaming"
        );

        let reason = loop {
            if cancel.is_cancelled() {
                break ExitReason::Shutdown;
            }

            let cycle_start = Instant::now();

            if let Some(jpeg) = self.next_frame().await {
                let part = multipart::encode_part(&jpeg);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break ExitReason::Shutdown,
                    result = sink.send_part(part) => {
                        if let Err(e) = result {
                            tracing::debug!(publisher = self.id, error = %e, "Viewer write failed");
                            break ExitReason::ViewerGone;
                        }
                    }
                }

                self.stats.frames_sent += 1;
                if let Some(ref metrics) = self.metrics {
                    metrics.frame_published();
                }
            } else {
                self.stats.skipped_cycles += 1;
            }

            let remaining = self.interval.saturating_sub(cycle_start.elapsed());
            if !remaining.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break ExitReason::Shutdown,
                    _ = tokio::time::sleep(remaining) => {}
                }
            }
        };

        drop(sink);
        self.phase = PublisherPhase::Closed;
        self.stats.exit_reason = Some(reason);

        tracing::debug!(
            publisher = self.id,
            frames_sent = self.stats.frames_sent,
            reason = ?reason,
            "Publisher closed"
        );

        self.stats.clone()
    }

    /// Render the current snapshot, falling back to the previous or a blank frame
    async fn next_frame(&mut self) -> Option<Bytes> {
        let snapshot = self.registry.snapshot().await;
        let compositor = Arc::clone(&self.compositor);

        let rendered = self
            .pool
            .run(move || compositor.render(&snapshot))
            .await
            .and_then(|result| result);

        match rendered {
            Ok(jpeg) => {
                self.last_frame = Some(jpeg.clone());
                Some(jpeg)
            }
            Err(e) => {
                self.stats.compositor_failures += 1;
                if let Some(ref metrics) = self.metrics {
                    metrics.compositor_failed();
                }
                tracing::warn!(publisher = self.id, error = %e, "Compositor cycle failed");

                match self.last_frame {
                    Some(ref frame) => Some(frame.clone()),
                    None => self.compositor.blank_frame().ok(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant as StdInstant;

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::registry::ClientId;

    const W: u32 = 16;
    const H: u32 = 16;

    /// Sink that records parts
    struct CollectSink(mpsc::UnboundedSender<Bytes>);

    impl FrameSink for CollectSink {
        async fn send_part(&mut self, part: Bytes) -> Result<()> {
            self.0.send(part).map_err(|_| Error::ViewerGone)
        }
    }

    async fn registry_with_client() -> Arc<ClientRegistry> {
        let registry = Arc::new(ClientRegistry::new());
        let compositor = Compositor::new(W, H);
        let jpeg = compositor
            .encode(&RgbImage::from_pixel(W, H, Rgb([0, 128, 255])))
            .unwrap();
        registry
            .append(&ClientId::new("cam"), jpeg, StdInstant::now())
            .await;
        registry
    }

    fn publisher(registry: Arc<ClientRegistry>, pool: WorkerPool, interval: Duration) -> StreamPublisher {
        StreamPublisher::new(1, registry, Arc::new(Compositor::new(W, H)), pool, interval)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Vec<Bytes> {
        let mut parts = Vec::new();
        while let Ok(part) = rx.try_recv() {
            parts.push(part);
        }
        parts
    }

    #[test]
    fn test_interval_for_rate() {
        assert_eq!(interval_for_rate(10.0), Duration::from_millis(100));
        assert_eq!(interval_for_rate(0.0), interval_for_rate(DEFAULT_PUBLISH_RATE));
        assert_eq!(interval_for_rate(f64::NAN), interval_for_rate(DEFAULT_PUBLISH_RATE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_matches_rate() {
        let registry = registry_with_client().await;
        let mut publisher = publisher(registry, WorkerPool::new(2), interval_for_rate(10.0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let stats = publisher.run(CollectSink(tx), task_cancel).await;
            (publisher, stats)
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let (publisher, stats) = task.await.unwrap();

        let parts = drain(&mut rx);
        assert!(
            (9..=11).contains(&parts.len()),
            "expected ~10 frames in 1s at 10fps, got {}",
            parts.len()
        );
        assert_eq!(stats.frames_sent as usize, parts.len());
        assert_eq!(stats.exit_reason, Some(ExitReason::Shutdown));
        assert_eq!(publisher.phase(), PublisherPhase::Closed);
    }

    /// Sink that records send times and stalls on its first send
    struct StallingSink {
        sent_at: mpsc::UnboundedSender<Instant>,
        stall: Option<Duration>,
    }

    impl FrameSink for StallingSink {
        async fn send_part(&mut self, _part: Bytes) -> Result<()> {
            self.sent_at.send(Instant::now()).map_err(|_| Error::ViewerGone)?;
            if let Some(stall) = self.stall.take() {
                tokio::time::sleep(stall).await;
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_is_not_followed_by_burst() {
        let registry = registry_with_client().await;
        let interval = interval_for_rate(10.0);
        let mut publisher = publisher(registry, WorkerPool::new(1), interval);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let sink = StallingSink {
            sent_at: tx,
            stall: Some(Duration::from_millis(450)),
        };

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { publisher.run(sink, task_cancel).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        task.await.unwrap();

        let mut sent_at = Vec::new();
        while let Ok(at) = rx.try_recv() {
            sent_at.push(at);
        }

        // 1s at 10fps, with the stall eating several slots
        assert!(sent_at.len() >= 2, "got {} sends", sent_at.len());
        assert!(sent_at.len() <= 10, "got {} sends", sent_at.len());
        for pair in sent_at.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= interval, "burst: gap of {gap:?} under {interval:?}");
        }
        assert!(sent_at[1] - sent_at[0] >= Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parts_are_multipart_jpeg() {
        let registry = registry_with_client().await;
        let mut publisher = publisher(registry, WorkerPool::new(1), interval_for_rate(30.0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { publisher.run(CollectSink(tx), task_cancel).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        task.await.unwrap();

        let parts = drain(&mut rx);
        assert!(!parts.is_empty());
        let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        assert!(parts[0].starts_with(header));
        assert!(parts[0].ends_with(b"\r\n"));

        let jpeg = &parts[0][header.len()..parts[0].len() - 2];
        let decoded = image::load_from_memory(jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (W, H));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_within_one_interval() {
        let registry = registry_with_client().await;
        let interval = interval_for_rate(5.0);
        let mut publisher = publisher(registry, WorkerPool::new(1), interval);
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { publisher.run(CollectSink(tx), task_cancel).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let signalled_at = Instant::now();
        cancel.cancel();

        let stats = tokio::time::timeout(interval + Duration::from_secs(1), task)
            .await
            .expect("publisher did not stop")
            .unwrap();
        assert!(signalled_at.elapsed() <= interval);
        assert_eq!(stats.exit_reason, Some(ExitReason::Shutdown));
    }

    #[tokio::test]
    async fn test_viewer_disconnect_ends_only_that_publisher() {
        let registry = registry_with_client().await;
        let pool = WorkerPool::new(2);
        let cancel = CancellationToken::new();

        // First viewer drops its receiver immediately
        let (gone_tx, gone_rx) = mpsc::channel::<Bytes>(1);
        drop(gone_rx);
        let mut gone = publisher(Arc::clone(&registry), pool.clone(), Duration::from_millis(10));
        let gone_stats = gone.run(gone_tx, cancel.clone()).await;
        assert_eq!(gone_stats.exit_reason, Some(ExitReason::ViewerGone));
        assert_eq!(gone_stats.frames_sent, 0);

        // Second viewer keeps receiving from the same registry
        let (tx, mut rx) = mpsc::channel::<Bytes>(4);
        let mut live = publisher(Arc::clone(&registry), pool, Duration::from_millis(10));
        let live_cancel = cancel.clone();
        let task = tokio::spawn(async move { live.run(tx, live_cancel).await });

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        cancel.cancel();
        let stats = task.await.unwrap();
        assert_eq!(stats.exit_reason, Some(ExitReason::Shutdown));
        assert_eq!(registry.client_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compositor_failure_falls_back_to_blank() {
        let registry = registry_with_client().await;
        let pool = WorkerPool::new(1);
        // A closed pool fails every render
        pool.shutdown(Duration::from_millis(10)).await;

        let metrics = Arc::new(ServerMetrics::new());
        let mut publisher = publisher(registry, pool, interval_for_rate(10.0))
            .with_metrics(Arc::clone(&metrics));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { publisher.run(CollectSink(tx), task_cancel).await });

        tokio::time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();
        let stats = task.await.unwrap();

        let parts = drain(&mut rx);
        assert!(parts.len() >= 3);
        assert_eq!(stats.compositor_failures, stats.frames_sent);
        assert_eq!(metrics.snapshot().compositor_failures, stats.compositor_failures);
        assert_eq!(metrics.snapshot().frames_published, stats.frames_sent);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let registry = registry_with_client().await;
        let mut publisher = publisher(registry, WorkerPool::new(1), Duration::from_millis(10));
        assert_eq!(publisher.phase(), PublisherPhase::Prepared);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::unbounded_channel();
        let stats = publisher.run(CollectSink(tx), cancel).await;

        assert_eq!(stats.frames_sent, 0);
        assert_eq!(publisher.phase(), PublisherPhase::Closed);
    }
}
