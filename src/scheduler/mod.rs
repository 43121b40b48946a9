//! # Command Scheduler Module
//!
//! Queues blind commands and paces their transmission.
//!
//! This module handles:
//! - Validating and merging submissions into the pending store
//! - Ordering duplicate precursors strictly before join and remove
//! - Inhibiting and resuming transmission
//! - Relaying learning requests to the worker that owns the radio
//!
//! Callers hold a cheap, cloneable [`Scheduler`]. A single [`Worker`] owns
//! the radio and is the only one to transmit; the pending store is the only
//! structure both sides lock, and never across an await.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{DirectolorError, Result};
use crate::learner::{LearnerReport, RemoteLearner};
use crate::protocol::encoder::{FrameEncoder, DUPLICATE_TOKEN_SIZE};
use crate::protocol::types::{BlindAction, ChannelMask, RadioIdentity};
use crate::radio::{RadioLink, RadioSettings, Transceiver};
use crate::telemetry::TrafficLogger;

pub mod queue;
pub mod worker;

pub use queue::{PendingCommand, PendingKey, PendingQueue};
pub use worker::{TickOutcome, Worker};

/// An inhibit can hold transmissions back for at most this many pacing intervals
const MAX_INHIBIT_INTERVALS: u32 = 4;

/// Scheduling parameters
#[derive(Debug, Clone)]
pub struct Settings {
    /// Transmissions of every command
    pub send_attempts: u8,

    /// Identical frames pushed per transmission
    pub burst_repeats: u16,

    /// Minimum pause between two transmissions
    pub min_interval: Duration,

    /// Distinct pending commands
    pub queue_capacity: usize,

    /// Worker wake-up period
    pub poll_interval: Duration,

    /// Seed for nonces and random bytes
    pub seed: Option<u64>,

    pub capture_first: bool,
    pub capture_debounce: Duration,
    pub duplicate_token: [u8; DUPLICATE_TOKEN_SIZE],
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            send_attempts: config.scheduler.send_attempts,
            burst_repeats: config.scheduler.burst_repeats,
            min_interval: Duration::from_millis(config.scheduler.min_interval_ms),
            queue_capacity: config.queue_capacity(),
            poll_interval: Duration::from_millis(config.scheduler.poll_interval_ms),
            seed: config.scheduler.seed,
            capture_first: config.learning.capture_first,
            capture_debounce: Duration::from_millis(config.learning.capture_debounce_ms),
            duplicate_token: config.protocol.duplicate_token,
        }
    }

    /// Longest embargo an inhibit can install
    pub fn max_inhibit(&self) -> Duration {
        self.min_interval * MAX_INHIBIT_INTERVALS
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Learning request travelling from callers to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum LearningRequest {
    None = 0,
    Start = 1,
    Stop = 2,
}

impl LearningRequest {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LearningRequest::Start,
            2 => LearningRequest::Stop,
            _ => LearningRequest::None,
        }
    }
}

/// Transmission gate shared by inhibit and the worker
#[derive(Debug, Default)]
pub(crate) struct Gate {
    /// A burst is in flight
    pub(crate) sending: bool,

    /// No transmission starts before this instant
    pub(crate) embargo: Option<Instant>,
}

impl Gate {
    pub(crate) fn embargoed(&self, now: Instant) -> bool {
        self.embargo.map_or(false, |until| now < until)
    }
}

/// State shared between the [`Scheduler`] handles and the [`Worker`]
pub(crate) struct Shared {
    pub(crate) remotes: Vec<RadioIdentity>,
    pub(crate) settings: Settings,
    pub(crate) queue: Mutex<PendingQueue>,
    pub(crate) gate: Mutex<Gate>,
    /// Signalled when the store frees a slot
    pub(crate) space: Notify,
    /// Signalled when a burst completes
    pub(crate) idle: Notify,
    pub(crate) radio_ready: AtomicBool,
    pub(crate) closed: AtomicBool,
    pub(crate) learning: AtomicU8,
    pub(crate) report: watch::Receiver<LearnerReport>,
}

impl Shared {
    pub(crate) fn queue(&self) -> MutexGuard<'_, PendingQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn take_learning_request(&self) -> LearningRequest {
        LearningRequest::from_u8(self.learning.swap(LearningRequest::None as u8, Ordering::AcqRel))
    }

    /// Mark the worker gone and release every waiting caller
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.radio_ready.store(false, Ordering::Release);
        self.space.notify_waiters();
        self.idle.notify_waiters();
    }
}

/// Caller side of the scheduler
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a scheduler handle and the worker that serves it
    ///
    /// # Arguments
    ///
    /// * `radio` - Transceiver driver, owned by the worker from now on
    /// * `remotes` - Identities of remotes `1..=N`
    /// * `radio_settings` - Hardware parameters
    /// * `settings` - Scheduling parameters
    pub fn new<R: RadioLink>(
        radio: R,
        remotes: Vec<RadioIdentity>,
        radio_settings: RadioSettings,
        settings: Settings,
    ) -> (Self, Worker<R>) {
        let learner = RemoteLearner::new(settings.capture_first, settings.capture_debounce);
        let (report_tx, report_rx) = watch::channel(learner.report());
        let encoder = FrameEncoder::new(settings.duplicate_token);

        let shared = Arc::new(Shared {
            remotes,
            queue: Mutex::new(PendingQueue::new(settings.queue_capacity, settings.send_attempts)),
            gate: Mutex::new(Gate::default()),
            space: Notify::new(),
            idle: Notify::new(),
            radio_ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            learning: AtomicU8::new(LearningRequest::None as u8),
            report: report_rx,
            settings,
        });

        let worker = Worker::new(
            Arc::clone(&shared),
            Transceiver::new(radio, radio_settings),
            learner,
            encoder,
            report_tx,
        );
        (Self { shared }, worker)
    }

    /// Build the scheduler, its worker and the traffic log from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the traffic log directory cannot be created
    pub fn from_config<R: RadioLink>(radio: R, config: &Config) -> Result<(Self, Worker<R>)> {
        let (scheduler, worker) = Self::new(
            radio,
            config.identities(),
            config.radio.settings(),
            Settings::from_config(config),
        );
        let worker = match TrafficLogger::from_config(&config.telemetry)? {
            Some(logger) => worker.with_traffic_log(logger),
            None => worker,
        };
        Ok((scheduler, worker))
    }

    /// Number of configured remotes
    pub fn remote_count(&self) -> usize {
        self.shared.remotes.len()
    }

    /// Whether the worker has started the radio
    pub fn radio_ready(&self) -> bool {
        self.shared.radio_ready.load(Ordering::Acquire)
    }

    fn validate(&self, remote: usize, mask: u8, action: BlindAction) -> Result<ChannelMask> {
        if action == BlindAction::Duplicate {
            return Err(DirectolorError::DirectDuplicate);
        }
        if remote == 0 || remote > self.remote_count() {
            return Err(DirectolorError::InvalidRemote(remote, self.remote_count()));
        }
        let mask = ChannelMask::new(mask)?;
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(DirectolorError::Shutdown);
        }
        if !self.radio_ready() {
            return Err(DirectolorError::RadioUnavailable);
        }
        Ok(mask)
    }

    /// Queue `action` for the channels of `mask` on `remote`
    ///
    /// A pending command with the same remote and action is widened to the
    /// union of both masks and gets its full attempt budget back. Join and
    /// remove are preceded by a duplicate frame for the same remote. Waits
    /// while the store is full.
    ///
    /// # Arguments
    ///
    /// * `remote` - 1-based remote index
    /// * `mask` - Channel bitmask, bit `i` is channel `i + 1`
    /// * `action` - Action to send
    ///
    /// # Errors
    ///
    /// Returns error without touching the store if the remote, the mask or
    /// the action is invalid, or if the radio is not started.
    pub async fn submit(&self, remote: usize, mask: u8, action: BlindAction) -> Result<()> {
        let mask = self.validate(remote, mask, action)?;

        let mut commands = Vec::with_capacity(2);
        if action.requires_duplicate() {
            commands.push((PendingKey::precursor(remote, action), mask));
        }
        commands.push((PendingKey::new(remote, action), mask));

        loop {
            // Register before checking so a slot freed in between is not missed
            let space = self.shared.space.notified();
            let queued = self.shared.queue().submit_all(&commands);
            if queued {
                debug!("Queued {} for remote {} channels {}", action, remote, mask);
                return Ok(());
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(DirectolorError::Shutdown);
            }
            debug!("Pending store full, waiting for a slot");
            space.await;
        }
    }

    /// Queue `action` for a single 1-based `channel`
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::submit`], plus an invalid channel number
    pub async fn submit_channel(&self, remote: usize, channel: u8, action: BlindAction) -> Result<()> {
        let mask = ChannelMask::from_channel(channel)?;
        self.submit(remote, mask.bits(), action).await
    }

    /// Hold transmissions back for `duration_ms`
    ///
    /// Waits for a burst in flight to finish, then installs an embargo of at
    /// most four pacing intervals. `inhibit(0)` is the same as [`resume`].
    ///
    /// [`resume`]: Scheduler::resume
    pub async fn inhibit(&self, duration_ms: u64) {
        if duration_ms == 0 {
            self.resume();
            return;
        }
        let duration = Duration::from_millis(duration_ms).min(self.shared.settings.max_inhibit());

        loop {
            let idle = self.shared.idle.notified();
            {
                let mut gate = self.shared.gate();
                if !gate.sending || self.shared.closed.load(Ordering::Acquire) {
                    gate.embargo = Some(Instant::now() + duration);
                    info!("Transmissions inhibited for {:?}", duration);
                    return;
                }
            }
            idle.await;
        }
    }

    /// Lift any embargo immediately
    pub fn resume(&self) {
        if self.shared.gate().embargo.take().is_some() {
            info!("Transmissions resumed");
        }
    }

    /// Put the radio in search mode to discover a physical remote
    ///
    /// # Errors
    ///
    /// Returns [`DirectolorError::RadioUnavailable`] if the radio is not started
    pub fn start_learning(&self) -> Result<()> {
        if !self.radio_ready() {
            return Err(DirectolorError::RadioUnavailable);
        }
        self.shared
            .learning
            .store(LearningRequest::Start as u8, Ordering::Release);
        Ok(())
    }

    /// Leave learning mode and power the radio down when idle
    pub fn stop_learning(&self) {
        self.shared
            .learning
            .store(LearningRequest::Stop as u8, Ordering::Release);
    }

    /// What the learner has discovered so far; displays as a code dump
    pub fn dump_codes(&self) -> LearnerReport {
        self.shared.report.borrow().clone()
    }

    /// Pending commands in transmission order
    pub fn pending(&self) -> Vec<PendingCommand> {
        self.shared.queue().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decoder::parse_frame;
    use crate::protocol::frame::Frame;
    use crate::protocol::types::{PacketKind, FRAME_SIZE};
    use crate::radio::mocks::RecordingRadio;
    use tokio_test::{assert_pending, assert_ready};

    fn test_settings() -> Settings {
        Settings {
            burst_repeats: 4,
            seed: Some(7),
            ..Settings::default()
        }
    }

    fn remotes() -> Vec<RadioIdentity> {
        Config::default().identities()
    }

    /// Scheduler whose worker has already started the radio
    fn ready_scheduler(settings: Settings) -> (Scheduler, Worker<RecordingRadio>, RecordingRadio) {
        let radio = RecordingRadio::new();
        let (scheduler, mut worker) =
            Scheduler::new(radio.clone(), remotes(), RadioSettings::default(), settings);
        worker.tick(Instant::now());
        assert!(scheduler.radio_ready());
        radio.clear();
        (scheduler, worker, radio)
    }

    fn frame_of(bytes: &[u8]) -> Frame {
        assert_eq!(bytes.len(), FRAME_SIZE);
        let start = bytes.iter().position(|&b| b != 0x55).unwrap();
        Frame::finalize(&bytes[start..FRAME_SIZE - 2]).unwrap()
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_input_without_mutation() {
        let (scheduler, _worker, _radio) = ready_scheduler(test_settings());

        assert!(matches!(
            scheduler.submit(0, 0b1, BlindAction::Open).await,
            Err(DirectolorError::InvalidRemote(0, 7))
        ));
        assert!(matches!(
            scheduler.submit(8, 0b1, BlindAction::Open).await,
            Err(DirectolorError::InvalidRemote(8, 7))
        ));
        assert!(matches!(
            scheduler.submit(1, 0b1100_0000, BlindAction::Open).await,
            Err(DirectolorError::InvalidChannelMask(0b1100_0000))
        ));
        assert!(matches!(
            scheduler.submit(1, 0, BlindAction::Open).await,
            Err(DirectolorError::InvalidChannelMask(0))
        ));
        assert!(matches!(
            scheduler.submit(1, 0b1, BlindAction::Duplicate).await,
            Err(DirectolorError::DirectDuplicate)
        ));
        assert!(matches!(
            scheduler.submit_channel(1, 7, BlindAction::Open).await,
            Err(DirectolorError::InvalidChannel(7))
        ));

        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn test_submit_requires_started_radio() {
        let radio = RecordingRadio::new();
        radio.set_begin_ok(false);
        let (scheduler, mut worker) =
            Scheduler::new(radio.clone(), remotes(), RadioSettings::default(), test_settings());

        // Worker has not run yet
        assert!(matches!(
            scheduler.submit(1, 0b1, BlindAction::Open).await,
            Err(DirectolorError::RadioUnavailable)
        ));

        // Start fails
        worker.tick(Instant::now());
        assert!(!scheduler.radio_ready());
        assert!(matches!(
            scheduler.submit(1, 0b1, BlindAction::Open).await,
            Err(DirectolorError::RadioUnavailable)
        ));
        assert!(matches!(
            scheduler.start_learning(),
            Err(DirectolorError::RadioUnavailable)
        ));
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn test_submit_single_channel() {
        let (scheduler, _worker, _radio) = ready_scheduler(test_settings());
        scheduler.submit_channel(1, 1, BlindAction::Open).await.unwrap();

        let pending = scheduler.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, PendingKey::new(1, BlindAction::Open));
        assert_eq!(pending[0].mask.bits(), 0b000001);
        assert_eq!(pending[0].attempts_remaining, 3);
    }

    #[tokio::test]
    async fn test_submit_merges_same_remote_and_action() {
        let (scheduler, _worker, _radio) = ready_scheduler(test_settings());
        scheduler.submit(2, 0b001, BlindAction::Close).await.unwrap();
        scheduler.submit(2, 0b100, BlindAction::Close).await.unwrap();
        scheduler.submit(2, 0b001, BlindAction::Open).await.unwrap();

        let pending = scheduler.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].mask.bits(), 0b101);
        assert_eq!(pending[1].action(), BlindAction::Open);
    }

    #[tokio::test]
    async fn test_join_is_preceded_by_duplicate() {
        let (scheduler, _worker, _radio) = ready_scheduler(test_settings());
        scheduler.submit(3, 0b000100, BlindAction::Join).await.unwrap();

        let actions: Vec<BlindAction> = scheduler.pending().iter().map(|c| c.action()).collect();
        assert_eq!(actions, vec![BlindAction::Duplicate, BlindAction::Join]);
    }

    #[tokio::test]
    async fn test_e2e_single_channel_open() {
        let (scheduler, mut worker, radio) = ready_scheduler(test_settings());
        scheduler.submit(1, 0b000001, BlindAction::Open).await.unwrap();

        let now = Instant::now();
        assert!(matches!(worker.tick(now), TickOutcome::Waiting));
        let sent = worker.tick(now + Duration::from_millis(20));
        assert!(matches!(sent, TickOutcome::Sent(_)));

        let writes = radio.writes();
        assert_eq!(writes.len(), 4);
        assert!(writes.iter().all(|w| w == &writes[0]));

        let parsed = parse_frame(&frame_of(&writes[0])).unwrap();
        assert_eq!(parsed.kind, PacketKind::Command);
        assert_eq!(parsed.identity, remotes()[0]);
        assert_eq!(parsed.channels, vec![1]);
        assert_eq!(parsed.action, BlindAction::Open);
        assert_eq!(frame_of(&writes[0]).as_bytes()[..], writes[0][..]);
    }

    #[tokio::test]
    async fn test_e2e_merged_multi_channel_close() {
        let (scheduler, mut worker, radio) = ready_scheduler(test_settings());
        scheduler.submit_channel(2, 1, BlindAction::Close).await.unwrap();
        scheduler.submit_channel(2, 3, BlindAction::Close).await.unwrap();

        let now = Instant::now();
        worker.tick(now);
        worker.tick(now + Duration::from_millis(20));

        let bursts = radio.bursts();
        assert_eq!(bursts.len(), 1);
        let frame = frame_of(&bursts[0]);
        let parsed = parse_frame(&frame).unwrap();
        assert_eq!(parsed.identity, remotes()[1]);
        assert_eq!(parsed.channels, vec![1, 3]);
        assert_eq!(parsed.action, BlindAction::Close);
        // Count byte is base + 2
        assert_eq!(frame.content()[12], 2);
    }

    #[tokio::test]
    async fn test_submit_waits_while_store_is_full() {
        let settings = Settings {
            queue_capacity: 2,
            send_attempts: 1,
            ..test_settings()
        };
        let (scheduler, mut worker, _radio) = ready_scheduler(settings);
        scheduler.submit(1, 0b1, BlindAction::Open).await.unwrap();
        scheduler.submit(2, 0b1, BlindAction::Open).await.unwrap();

        let mut blocked = tokio_test::task::spawn(scheduler.submit(3, 0b1, BlindAction::Stop));
        assert_pending!(blocked.poll());

        // Sending the last attempt of the oldest command frees a slot
        let now = Instant::now();
        worker.tick(now);
        assert!(matches!(
            worker.tick(now + Duration::from_millis(20)),
            TickOutcome::Sent(_)
        ));

        assert!(blocked.is_woken());
        assert!(assert_ready!(blocked.poll()).is_ok());

        let remotes: Vec<usize> = scheduler.pending().iter().map(|c| c.key.remote).collect();
        assert_eq!(remotes, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_closed_scheduler_rejects_and_releases_waiters() {
        let settings = Settings {
            queue_capacity: 2,
            ..test_settings()
        };
        let (scheduler, worker, _radio) = ready_scheduler(settings);
        scheduler.submit(1, 0b1, BlindAction::Join).await.unwrap();

        let mut blocked = tokio_test::task::spawn(scheduler.submit(2, 0b1, BlindAction::Open));
        assert_pending!(blocked.poll());

        drop(worker);
        assert!(blocked.is_woken());
        assert!(matches!(
            assert_ready!(blocked.poll()),
            Err(DirectolorError::Shutdown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inhibit_is_clamped() {
        let (scheduler, _worker, _radio) = ready_scheduler(test_settings());
        let start = Instant::now();
        scheduler.inhibit(10_000).await;

        let embargo = scheduler.shared.gate().embargo.unwrap();
        assert_eq!(embargo - start, Duration::from_millis(4 * 170));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inhibit_zero_resumes() {
        let (scheduler, _worker, _radio) = ready_scheduler(test_settings());
        scheduler.inhibit(300).await;
        assert!(scheduler.shared.gate().embargo.is_some());

        scheduler.inhibit(0).await;
        assert!(scheduler.shared.gate().embargo.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inhibit_waits_for_burst_in_flight() {
        let (scheduler, _worker, _radio) = ready_scheduler(test_settings());
        scheduler.shared.gate().sending = true;

        let mut inhibit = tokio_test::task::spawn(scheduler.inhibit(100));
        assert_pending!(inhibit.poll());
        assert!(scheduler.shared.gate().embargo.is_none());

        scheduler.shared.gate().sending = false;
        scheduler.shared.idle.notify_waiters();
        assert!(inhibit.is_woken());
        assert_ready!(inhibit.poll());
        assert!(scheduler.shared.gate().embargo.is_some());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.send_attempts, 3);
        assert_eq!(settings.burst_repeats, 513);
        assert_eq!(settings.min_interval, Duration::from_millis(170));
        assert_eq!(settings.max_inhibit(), Duration::from_millis(680));
        assert_eq!(settings.queue_capacity, 14);
    }

    #[test]
    fn test_learning_request_roundtrip() {
        assert_eq!(LearningRequest::from_u8(LearningRequest::Start as u8), LearningRequest::Start);
        assert_eq!(LearningRequest::from_u8(LearningRequest::Stop as u8), LearningRequest::Stop);
        assert_eq!(LearningRequest::from_u8(9), LearningRequest::None);
    }
}
