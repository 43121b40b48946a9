//! Single owner of the radio: transmits pending commands and listens in
//! between

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::queue::PendingCommand;
use super::{LearningRequest, Shared};
use crate::learner::{LearnEvent, LearnerReport, LearnerState, RemoteLearner};
use crate::protocol::decoder::DUPLICATE_PREFIX;
use crate::protocol::encoder::FrameEncoder;
use crate::radio::{RadioLink, Transceiver};
use crate::telemetry::{TrafficLogger, TrafficRecord};

/// Result of one worker cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A command was transmitted
    Sent(PendingCommand),
    /// Commands are pending but pacing or warm-up holds them back
    Waiting,
    /// Nothing to send (empty store, embargo or radio down); the radio listens
    Idle,
}

/// Transmitting side of the scheduler
pub struct Worker<R> {
    shared: Arc<Shared>,
    transceiver: Transceiver<R>,
    learner: RemoteLearner,
    encoder: FrameEncoder,
    rng: StdRng,
    last_send: Option<Instant>,
    /// Group command owed right after the duplicate just sent
    partner: Option<PendingCommand>,
    traffic: Option<TrafficLogger>,
    report_tx: watch::Sender<LearnerReport>,
}

impl<R: RadioLink> Worker<R> {
    pub(crate) fn new(
        shared: Arc<Shared>,
        transceiver: Transceiver<R>,
        learner: RemoteLearner,
        encoder: FrameEncoder,
        report_tx: watch::Sender<LearnerReport>,
    ) -> Self {
        let rng = match shared.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            shared,
            transceiver,
            learner,
            encoder,
            rng,
            last_send: None,
            partner: None,
            traffic: None,
            report_tx,
        }
    }

    /// Record every sent and observed frame
    pub fn with_traffic_log(mut self, logger: TrafficLogger) -> Self {
        self.traffic = Some(logger);
        self
    }

    /// Radio under the worker's control
    pub fn radio(&self) -> &R {
        self.transceiver.radio()
    }

    /// Run one cycle
    ///
    /// Applies learning requests, (re)starts the radio, sends the oldest
    /// pending command when pacing allows it and otherwise services
    /// reception.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        self.apply_learning_request();

        let ready = self.transceiver.ensure_started(now);
        self.shared.radio_ready.store(ready, Ordering::Release);
        if !ready {
            return TickOutcome::Idle;
        }

        match self.try_send(now) {
            TickOutcome::Idle => {
                self.listen(now);
                TickOutcome::Idle
            }
            outcome => outcome,
        }
    }

    fn apply_learning_request(&mut self) {
        match self.shared.take_learning_request() {
            LearningRequest::Start => self.learner.begin_search(),
            LearningRequest::Stop => self.learner.cancel(),
            LearningRequest::None => return,
        }
        self.publish_report();
    }

    fn publish_report(&self) {
        self.report_tx.send_replace(self.learner.report());
    }

    fn try_send(&mut self, now: Instant) -> TickOutcome {
        // A group command owed to its duplicate ignores pacing and embargo
        let owed = self.partner.is_some();

        if !owed {
            if self.shared.queue().is_empty() || self.shared.gate().embargoed(now) {
                return TickOutcome::Idle;
            }
            if let Some(last) = self.last_send {
                if now.saturating_duration_since(last) < self.shared.settings.min_interval {
                    return TickOutcome::Waiting;
                }
            }
        }

        self.transceiver.enter_transmit(now);
        if !self.transceiver.transmit_ready(now) {
            return TickOutcome::Waiting;
        }

        {
            let mut gate = self.shared.gate();
            if !owed && gate.embargoed(now) {
                return TickOutcome::Idle;
            }
            gate.sending = true;
        }

        let next = match self.partner.take() {
            Some(partner) => Some(partner),
            None => {
                let dispatch = self.shared.queue().pop_dispatch();
                dispatch.map(|(first, partner)| {
                    self.partner = partner;
                    first
                })
            }
        };
        let outcome = match next {
            Some(command) => self.send(command, now),
            None => TickOutcome::Idle,
        };

        self.shared.gate().sending = false;
        self.shared.idle.notify_waiters();
        self.shared.space.notify_waiters();
        outcome
    }

    fn send(&mut self, mut command: PendingCommand, now: Instant) -> TickOutcome {
        let remote = command.key.remote;
        let identity = match self.shared.remotes.get(remote.wrapping_sub(1)) {
            Some(identity) => *identity,
            None => {
                error!("Dropping command for unknown remote {}", remote);
                self.partner = None;
                return TickOutcome::Idle;
            }
        };
        let action = command.action();

        let frame = match self.encoder.encode(&identity, command.mask, action, &mut self.rng) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Dropping {} for remote {}: {}", action, remote, e);
                self.partner = None;
                return TickOutcome::Idle;
            }
        };

        self.transceiver
            .transmit(&frame, self.shared.settings.burst_repeats);
        command.attempts_remaining = command.attempts_remaining.saturating_sub(1);

        debug!(
            "Sent {} to remote {} channels {} ({} attempts left): {}",
            action, remote, command.mask, command.attempts_remaining, frame
        );

        if let Some(logger) = self.traffic.as_mut() {
            let record = TrafficRecord::sent(
                remote,
                &identity,
                command.mask,
                action,
                command.attempts_remaining,
                &frame,
            );
            if let Err(e) = logger.log(&record) {
                warn!("Failed to write traffic log: {}", e);
            }
        }

        self.last_send = Some(now);

        if command.attempts_remaining > 0 {
            self.shared.queue().requeue(command);
        }
        TickOutcome::Sent(command)
    }

    /// Put the radio in the listening mode the learner needs and drain
    /// received payloads
    fn listen(&mut self, now: Instant) {
        match self.learner.state() {
            LearnerState::Capturing(prefix) => self.transceiver.enter_capture(prefix),
            LearnerState::Searching => self.transceiver.enter_search(),
            LearnerState::Idle => self.transceiver.power_down(),
        }

        while let Some((pipe, payload)) = self.transceiver.receive() {
            match self.learner.ingest(pipe, &payload, now) {
                LearnEvent::Nothing => {}
                LearnEvent::Discovered(prefix) => {
                    self.transceiver.enter_capture(prefix);
                    self.publish_report();
                    // Remaining payloads were received with the search address
                    break;
                }
                LearnEvent::Captured(observed) => {
                    if let (Some(logger), LearnerState::Capturing(prefix)) =
                        (self.traffic.as_mut(), self.learner.state())
                    {
                        let address = if pipe == 0 { DUPLICATE_PREFIX } else { prefix };
                        if let Err(e) = logger.log(&TrafficRecord::observed(address, &observed)) {
                            warn!("Failed to write traffic log: {}", e);
                        }
                    }
                    self.publish_report();
                }
            }
        }
    }

    /// Drive the worker until `shutdown` turns `true` or its sender is dropped
    ///
    /// Powers the radio down on exit.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut poll = interval(self.shared.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Scheduler worker running ({} remotes, {} attempts x {} repeats)",
            self.shared.remotes.len(),
            self.shared.settings.send_attempts,
            self.shared.settings.burst_repeats
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.tick(Instant::now());
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.transceiver.power_down();
        info!(
            "Scheduler worker stopping, {} commands dropped",
            self.shared.queue().len()
        );
    }
}

impl<R> Drop for Worker<R> {
    fn drop(&mut self) {
        self.shared.close();
    }
}
