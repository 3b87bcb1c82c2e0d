// src/ipc/mod.rs
//! Sample sources: the producer's shared-memory ring buffer and an in-process
//! ring used for demos and tests.
//!
//! The shared segment belongs to another process. Everything here treats it as
//! unreliable: a missing segment, a stalled producer or a failed lock all turn
//! into "no snapshot this tick" rather than an error for the caller.

pub mod local;
pub mod mac;
pub mod shmem;

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::error::IpcError;

pub use local::{LocalRing, ToneGenerator};
pub use shmem::{SharedSegment, ShmOpener};

/// Seconds without a producer heartbeat before a playing segment is considered dead.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 5;

/// Log every Nth consecutive open failure at info level, the rest at debug.
const OPEN_FAILURE_LOG_EVERY: u32 = 12;

/// An immutable copy of the most recent interleaved stereo samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSnapshot {
    playing: bool,
    sample_rate: u32,
    samples: Vec<i16>,
}

impl AudioSnapshot {
    /// Wrap interleaved `L R L R ...` samples taken while the producer was playing.
    pub fn new(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            playing: true,
            sample_rate,
            samples,
        }
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stereo frames held.
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// The newest `frames` frames (or all of them if fewer are held).
    pub fn latest(&self, frames: usize) -> &[i16] {
        let take = frames.min(self.frames()) * 2;
        &self.samples[self.samples.len() - take..]
    }
}

/// Anything the polling thread can pull audio from.
pub trait SampleSource {
    /// Latest `frames` stereo frames, or `None` when nothing is playing or the
    /// source is unavailable.
    fn snapshot(&mut self, frames: usize) -> Option<AudioSnapshot>;

    /// Release any underlying resources. Sources must tolerate being used again
    /// afterwards (they simply reopen lazily).
    fn close(&mut self) {}
}

/// Producer state read under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub playing: bool,
    /// Unix seconds of the producer's last write.
    pub updated: i64,
    pub sample_rate: u32,
    /// Ring length in samples (not frames).
    pub ring_len: u32,
}

/// A mapped producer segment.
pub trait Segment {
    fn heartbeat(&self) -> Result<Heartbeat, IpcError>;

    /// Copy the newest `samples` interleaved samples into `out`.
    ///
    /// Returns the sample rate when the producer is playing and `None` (with
    /// `out` left empty) when it is not.
    fn read_latest(&self, samples: usize, out: &mut Vec<i16>) -> Result<Option<u32>, IpcError>;
}

/// Knows how to (re)open a producer segment.
pub trait SegmentOpener {
    type Segment: Segment;

    fn open(&mut self) -> Result<Self::Segment, IpcError>;

    /// Human readable name of what is being opened, for logs.
    fn describe(&self) -> String;
}

/// Wall clock in unix seconds. The producer stamps its heartbeat with `time(2)`.
pub trait Clock {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// When a handle must be dropped and how often we may try to get a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReopenPolicy {
    pub stale_after: i64,
}

impl Default for ReopenPolicy {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER_SECS,
        }
    }
}

impl ReopenPolicy {
    pub fn new(stale_after: i64) -> Self {
        Self {
            stale_after: stale_after.max(1),
        }
    }

    /// A playing producer that stopped stamping its heartbeat has died mid-write.
    pub fn is_stale(&self, now: i64, last_updated: i64, playing: bool) -> bool {
        playing && now - last_updated > self.stale_after
    }

    /// At most one open attempt per staleness interval.
    pub fn may_attempt(&self, now: i64, last_attempt: Option<i64>) -> bool {
        match last_attempt {
            None => true,
            Some(at) => now - at >= self.stale_after,
        }
    }
}

/// Copy the `count` samples ending just before `write_index` out of `ring`,
/// oldest first. Handles the copy straddling the end of the ring.
pub fn copy_latest(ring: &[i16], write_index: usize, count: usize, out: &mut Vec<i16>) {
    out.clear();
    let len = ring.len();
    if len == 0 {
        return;
    }
    let count = count.min(len);
    let start = (write_index % len + len - count) % len;

    if start + count <= len {
        out.extend_from_slice(&ring[start..start + count]);
    } else {
        let first = len - start;
        out.extend_from_slice(&ring[start..]);
        out.extend_from_slice(&ring[..count - first]);
    }
}

/// An open connection to the producer segment plus what we last learned from it.
#[derive(Debug)]
struct RingBufferHandle<S> {
    segment: S,
    opened_at: i64,
    last_updated: i64,
    sample_rate: u32,
    ring_len: u32,
}

/// Owns the producer segment and turns it into snapshots.
pub struct RingBufferSource<O: SegmentOpener, C: Clock = SystemClock> {
    opener: O,
    clock: C,
    policy: ReopenPolicy,
    handle: Option<RingBufferHandle<O::Segment>>,
    last_attempt: Option<i64>,
    failed_opens: u32,
}

impl<O: SegmentOpener> RingBufferSource<O, SystemClock> {
    pub fn new(opener: O, policy: ReopenPolicy) -> Self {
        Self::with_clock(opener, SystemClock, policy)
    }
}

impl<O: SegmentOpener, C: Clock> RingBufferSource<O, C> {
    pub fn with_clock(opener: O, clock: C, policy: ReopenPolicy) -> Self {
        Self {
            opener,
            clock,
            policy,
            handle: None,
            last_attempt: None,
            failed_opens: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Open (or reopen) the segment right now, regardless of rate limiting.
    pub fn open(&mut self) -> Result<(), IpcError> {
        let now = self.clock.now();
        self.handle = None;
        self.last_attempt = Some(now);

        match self.opener.open() {
            Ok(segment) => {
                if self.failed_opens > 0 {
                    info!(
                        segment = %self.opener.describe(),
                        after = self.failed_opens,
                        "opened producer segment after failed attempts"
                    );
                } else {
                    info!(segment = %self.opener.describe(), "opened producer segment");
                }
                self.failed_opens = 0;
                self.handle = Some(RingBufferHandle {
                    segment,
                    opened_at: now,
                    last_updated: now,
                    sample_rate: 0,
                    ring_len: 0,
                });
                Ok(())
            }
            Err(err) => {
                self.failed_opens += 1;
                if self.failed_opens == 1 || self.failed_opens % OPEN_FAILURE_LOG_EVERY == 0 {
                    info!(attempts = self.failed_opens, "producer segment unavailable: {err}");
                } else {
                    debug!(attempts = self.failed_opens, "producer segment unavailable: {err}");
                }
                Err(err)
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(
                segment = %self.opener.describe(),
                open_secs = self.clock.now() - handle.opened_at,
                last_updated = handle.last_updated,
                rate = handle.sample_rate,
                ring_len = handle.ring_len,
                "closed producer segment"
            );
        }
    }

    /// Latest `frames` stereo frames when the producer is alive and playing.
    pub fn snapshot(&mut self, frames: usize) -> Option<AudioSnapshot> {
        let now = self.clock.now();
        if !self.check(now) {
            return None;
        }

        let handle = self.handle.as_mut()?;
        let mut samples = Vec::with_capacity(frames * 2);
        match handle.segment.read_latest(frames * 2, &mut samples) {
            Ok(Some(rate)) => {
                handle.sample_rate = rate;
                Some(AudioSnapshot::new(rate, samples))
            }
            Ok(None) => None,
            Err(err) => {
                debug!("snapshot skipped: {err}");
                None
            }
        }
    }

    /// Staleness check run before every snapshot. Returns true when the handle
    /// is open, fresh and worth reading.
    fn check(&mut self, now: i64) -> bool {
        match self.inspect(now) {
            Some(Ok(())) => return true,
            Some(Err(err @ IpcError::Stale { .. })) => {
                warn!("{err}, closing segment");
                self.close();
            }
            Some(Err(_)) => return false,
            None => {}
        }

        if !self.policy.may_attempt(now, self.last_attempt) {
            return false;
        }
        if self.open().is_err() {
            return false;
        }

        match self.inspect(now) {
            Some(Ok(())) => true,
            Some(Err(err @ IpcError::Stale { .. })) => {
                debug!("reopened segment is still stale: {err}");
                self.close();
                false
            }
            Some(Err(_)) | None => false,
        }
    }

    /// Refresh what we know from the producer's heartbeat. `None` when no
    /// segment is open.
    fn inspect(&mut self, now: i64) -> Option<Result<(), IpcError>> {
        let handle = self.handle.as_mut()?;
        Some(match handle.segment.heartbeat() {
            Ok(beat) => {
                handle.last_updated = beat.updated;
                handle.sample_rate = beat.sample_rate;
                handle.ring_len = beat.ring_len;
                if self.policy.is_stale(now, beat.updated, beat.playing) {
                    Err(IpcError::Stale {
                        age: now - beat.updated,
                    })
                } else {
                    Ok(())
                }
            }
            Err(err) => {
                debug!("heartbeat unreadable: {err}");
                Err(err)
            }
        })
    }
}

impl<O, C> SampleSource for RingBufferSource<O, C>
where
    O: SegmentOpener,
    C: Clock,
{
    fn snapshot(&mut self, frames: usize) -> Option<AudioSnapshot> {
        RingBufferSource::snapshot(self, frames)
    }

    fn close(&mut self) {
        RingBufferSource::close(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct ManualClock(Arc<AtomicI64>);

    impl ManualClock {
        fn set(&self, t: i64) {
            self.0.store(t, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Clone)]
    struct FakeProducer {
        beat: Arc<Mutex<Heartbeat>>,
        ring: Arc<Mutex<(Vec<i16>, usize)>>,
        lock_fails: Arc<Mutex<bool>>,
    }

    impl FakeProducer {
        fn new(updated: i64) -> Self {
            let ring: Vec<i16> = (0..64).collect();
            Self {
                beat: Arc::new(Mutex::new(Heartbeat {
                    playing: true,
                    updated,
                    sample_rate: 44_100,
                    ring_len: 64,
                })),
                ring: Arc::new(Mutex::new((ring, 10))),
                lock_fails: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl Segment for FakeProducer {
        fn heartbeat(&self) -> Result<Heartbeat, IpcError> {
            if *self.lock_fails.lock().unwrap() {
                return Err(IpcError::LockFailure(libc::EAGAIN));
            }
            Ok(*self.beat.lock().unwrap())
        }

        fn read_latest(&self, samples: usize, out: &mut Vec<i16>) -> Result<Option<u32>, IpcError> {
            let beat = self.heartbeat()?;
            if !beat.playing {
                out.clear();
                return Ok(None);
            }
            let ring = self.ring.lock().unwrap();
            copy_latest(&ring.0, ring.1, samples, out);
            Ok(Some(beat.sample_rate))
        }
    }

    struct FakeOpener {
        producer: Option<FakeProducer>,
        opens: Arc<AtomicUsize>,
    }

    impl SegmentOpener for FakeOpener {
        type Segment = FakeProducer;

        fn open(&mut self) -> Result<FakeProducer, IpcError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.producer
                .clone()
                .ok_or_else(|| IpcError::NotFound("/squeezelite-test".into()))
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    fn source(
        producer: Option<FakeProducer>,
    ) -> (RingBufferSource<FakeOpener, ManualClock>, ManualClock, Arc<AtomicUsize>) {
        let clock = ManualClock::default();
        let opens = Arc::new(AtomicUsize::new(0));
        let opener = FakeOpener {
            producer,
            opens: opens.clone(),
        };
        (
            RingBufferSource::with_clock(opener, clock.clone(), ReopenPolicy::default()),
            clock,
            opens,
        )
    }

    #[test]
    fn copy_latest_contiguous() {
        let ring: Vec<i16> = (0..16).collect();
        let mut out = Vec::new();
        copy_latest(&ring, 12, 4, &mut out);
        assert_eq!(out, vec![8, 9, 10, 11]);
    }

    #[test]
    fn copy_latest_straddles_wrap() {
        let ring: Vec<i16> = (0..16).collect();
        let mut out = Vec::new();
        copy_latest(&ring, 2, 6, &mut out);
        assert_eq!(out, vec![12, 13, 14, 15, 0, 1]);
    }

    #[test]
    fn copy_latest_clamps_to_ring() {
        let ring: Vec<i16> = (0..8).collect();
        let mut out = Vec::new();
        copy_latest(&ring, 0, 100, &mut out);
        assert_eq!(out, ring);
    }

    #[test]
    fn policy_only_flags_playing_producers() {
        let policy = ReopenPolicy::default();
        assert!(policy.is_stale(100, 94, true));
        assert!(!policy.is_stale(100, 95, true));
        assert!(!policy.is_stale(100, 0, false));
    }

    #[test]
    fn policy_rate_limits_attempts() {
        let policy = ReopenPolicy::default();
        assert!(policy.may_attempt(0, None));
        assert!(!policy.may_attempt(4, Some(0)));
        assert!(policy.may_attempt(5, Some(0)));
    }

    #[test]
    fn snapshot_reads_latest_frames() {
        let producer = FakeProducer::new(1_000);
        let (mut src, clock, _) = source(Some(producer));
        clock.set(1_000);

        let snap = src.snapshot(2).expect("playing producer yields a snapshot");
        assert_eq!(snap.sample_rate(), 44_100);
        assert_eq!(snap.samples(), &[6, 7, 8, 9]);
        assert_eq!(snap.frames(), 2);
    }

    #[test]
    fn not_playing_yields_none_without_reopen() {
        let producer = FakeProducer::new(0);
        producer.beat.lock().unwrap().playing = false;
        let (mut src, clock, opens) = source(Some(producer));
        clock.set(1_000);

        for t in 1_000..1_020 {
            clock.set(t);
            assert!(src.snapshot(4).is_none());
        }
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(src.is_open());
    }

    #[test]
    fn missing_segment_retries_once_per_interval() {
        let (mut src, clock, opens) = source(None);
        for t in 0..12 {
            clock.set(t);
            assert!(src.snapshot(4).is_none());
        }
        // attempts at t = 0, 5, 10
        assert_eq!(opens.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stale_producer_reopens_at_most_once_per_interval() {
        let producer = FakeProducer::new(100);
        let (mut src, clock, opens) = source(Some(producer.clone()));

        clock.set(100);
        assert!(src.snapshot(4).is_some());
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        // producer dies while marked playing: heartbeat frozen at t = 100
        let mut stale_snapshots = 0;
        for t in 101..=120 {
            clock.set(t);
            if src.snapshot(4).is_none() {
                stale_snapshots += 1;
            }
        }
        // t = 101..=105 still fresh; from t = 106 on every call is None
        assert_eq!(stale_snapshots, 15);
        // reopen attempts at t = 106, 111, 116
        assert_eq!(opens.load(Ordering::SeqCst), 4);
        assert!(!src.is_open());

        // a forced open still reports how old the heartbeat is
        src.open().unwrap();
        assert!(matches!(
            src.inspect(120),
            Some(Err(IpcError::Stale { age: 20 }))
        ));
        src.close();

        // producer comes back; the forced open at t = 120 delays the next try
        producer.beat.lock().unwrap().updated = 125;
        clock.set(124);
        assert!(src.snapshot(4).is_none());
        clock.set(125);
        assert!(src.snapshot(4).is_some());
    }

    #[test]
    fn lock_failure_skips_tick_but_keeps_handle() {
        let producer = FakeProducer::new(50);
        let (mut src, clock, opens) = source(Some(producer.clone()));
        clock.set(50);
        assert!(src.snapshot(4).is_some());

        *producer.lock_fails.lock().unwrap() = true;
        assert!(src.snapshot(4).is_none());
        assert!(src.is_open());

        *producer.lock_fails.lock().unwrap() = false;
        assert!(src.snapshot(4).is_some());
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_latest_returns_newest_frames() {
        let snap = AudioSnapshot::new(48_000, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(snap.latest(2), &[3, 4, 5, 6]);
        assert_eq!(snap.latest(10), &[1, 2, 3, 4, 5, 6]);
    }
}
