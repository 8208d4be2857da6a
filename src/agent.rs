//! The telemetry agent: lifecycle, scheduling and the upload feedback loop.
//!
//! One scheduler task owns the sampling interval and the upload timer. Each
//! sampling tick classifies the latest magnitudes, reacts to a state change
//! with a forced flush and a new location request, then appends a sample.
//! Uploads run on their own tasks so a slow collector never delays a tick.
//!
//! Every run gets an epoch. Stopping bumps it, and an upload response is only
//! applied while its epoch is still current, so a late response cannot
//! reconfigure an agent that has already stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::buffer::BatchBuffer;
use crate::classifier::MotionClassifier;
use crate::clock::AgentClock;
use crate::config::{AgentConfig, ConfigStore};
use crate::model::{MovementState, TelemetryRequest, TelemetryResponse};
use crate::sampler::{SampleBuilder, SequenceCounter};
use crate::session::SessionGate;
use crate::signal::{LocationCell, MotionSignal};
use crate::sources::{InertialSource, LocationPriority, LocationRequest, LocationSource};
use crate::uploader::{UploadContext, Uploader};

/// Result of [`TelemetryAgent::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    SessionInvalid,
}

/// Why a flush was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The upload timer fired.
    Periodic,
    /// The movement state just changed.
    Transition,
}

impl FlushReason {
    fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Periodic => "periodic",
            FlushReason::Transition => "transition",
        }
    }
}

/// Point-in-time view of the agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub running: bool,
    pub movement_state: MovementState,
    pub pending_samples: usize,
    pub last_sequence: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub location_request: Option<LocationRequest>,
    pub config: AgentConfig,
}

#[derive(Debug, Default)]
struct Lifecycle {
    epoch: u64,
    running: bool,
}

/// State shared between the agent handle, its scheduler and upload tasks.
struct Shared<U> {
    base_config: AgentConfig,
    config: ConfigStore,
    context: UploadContext,
    uploader: U,
    clock: AgentClock,
    signal: Arc<MotionSignal>,
    fix: Arc<LocationCell>,
    buffer: BatchBuffer,
    sequence: SequenceCounter,
    state: AtomicU8,
    lifecycle: Mutex<Lifecycle>,
    location_request: Mutex<Option<LocationRequest>>,
    uploads_succeeded: AtomicU64,
    uploads_failed: AtomicU64,
}

impl<U: Uploader> Shared<U> {
    fn movement_state(&self) -> MovementState {
        MovementState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_movement_state(&self, state: MovementState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    async fn deliver(self: Arc<Self>, request: TelemetryRequest, epoch: u64, reason: FlushReason) {
        let samples = request.samples.len();
        let first_seq = request.samples.first().map(|s| s.sequence);
        let last_seq = request.samples.last().map(|s| s.sequence);

        match self.uploader.upload(&request).await {
            Ok(response) => {
                self.uploads_succeeded.fetch_add(1, Ordering::Relaxed);
                if self.apply_response(epoch, &response) {
                    info!(
                        samples,
                        accepted = response.accepted,
                        first_seq,
                        last_seq,
                        reason = reason.as_str(),
                        "Telemetry batch uploaded"
                    );
                } else {
                    debug!(samples, "Agent stopped during upload; response discarded");
                }
            }
            Err(e) => {
                self.uploads_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    samples,
                    first_seq,
                    last_seq,
                    reason = reason.as_str(),
                    error = %e,
                    "Telemetry upload failed; batch dropped"
                );
            }
        }
    }

    /// Merge collector feedback unless the issuing run has ended.
    fn apply_response(&self, epoch: u64, response: &TelemetryResponse) -> bool {
        let lifecycle = self.lifecycle.lock();
        if !lifecycle.running || lifecycle.epoch != epoch {
            return false;
        }

        let update = response.config.as_ref().filter(|update| !update.is_empty());
        if update.is_some() || response.next_upload_in_ms > 0 {
            let config = self.config.apply(update, response.next_upload_in_ms);
            info!(
                gyro_threshold = config.gyro_threshold,
                accel_threshold = config.accel_threshold,
                move_min_ms = config.move_min_ms,
                stop_min_ms = config.stop_min_ms,
                upload_moving_ms = config.upload_moving_ms,
                "Applied collector configuration"
            );
        }
        true
    }
}

/// Handle of an active run.
struct Run {
    epoch: u64,
    task: JoinHandle<()>,
}

/// Long-running motion telemetry agent.
pub struct TelemetryAgent<U: Uploader> {
    shared: Arc<Shared<U>>,
    inertial: Arc<dyn InertialSource>,
    location: Arc<dyn LocationSource>,
    run: tokio::sync::Mutex<Option<Run>>,
}

impl<U: Uploader> TelemetryAgent<U> {
    pub fn new(
        config: AgentConfig,
        context: UploadContext,
        uploader: U,
        clock: AgentClock,
        inertial: Arc<dyn InertialSource>,
        location: Arc<dyn LocationSource>,
    ) -> Self {
        let shared = Shared {
            config: ConfigStore::new(config.clone()),
            base_config: config,
            context,
            uploader,
            clock,
            signal: Arc::new(MotionSignal::new()),
            fix: Arc::new(LocationCell::new()),
            buffer: BatchBuffer::new(),
            sequence: SequenceCounter::new(),
            state: AtomicU8::new(MovementState::Unknown.to_u8()),
            lifecycle: Mutex::new(Lifecycle::default()),
            location_request: Mutex::new(None),
            uploads_succeeded: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
        };

        Self {
            shared: Arc::new(shared),
            inertial,
            location,
            run: tokio::sync::Mutex::new(None),
        }
    }

    /// Begin collecting telemetry.
    ///
    /// Refuses without a valid session and does nothing when already running.
    pub async fn start(&self, session: Arc<dyn SessionGate>) -> StartOutcome {
        let mut run = self.run.lock().await;
        if run.is_some() {
            debug!("Telemetry agent already running");
            return StartOutcome::AlreadyRunning;
        }
        if !session.is_valid() {
            warn!("Refusing to start telemetry without a valid session");
            return StartOutcome::SessionInvalid;
        }

        let shared = &self.shared;
        shared.config.replace(shared.base_config.clone());
        shared.signal.reset();
        shared.fix.clear();
        shared.buffer.clear();
        shared.set_movement_state(MovementState::Unknown);

        let epoch = {
            let mut lifecycle = shared.lifecycle.lock();
            lifecycle.epoch += 1;
            lifecycle.running = true;
            lifecycle.epoch
        };

        self.inertial.subscribe(Arc::clone(&shared.signal));

        let config = shared.config.snapshot();
        let mut scheduler = Scheduler {
            shared: Arc::clone(shared),
            location: Arc::clone(&self.location),
            session,
            epoch,
            classifier: MotionClassifier::new(),
            builder: SampleBuilder::new(
                Arc::clone(&shared.signal),
                Arc::clone(&shared.fix),
                shared.sequence.clone(),
            ),
        };
        scheduler.request_location(MovementState::Unknown, &config);

        let task = tokio::spawn(scheduler.run());
        *run = Some(Run { epoch, task });

        info!(
            epoch,
            device_id = %shared.context.device_id,
            sample_interval_ms = config.sample_interval_ms,
            "Telemetry agent started"
        );
        StartOutcome::Started
    }

    /// Stop collecting telemetry. Returns whether the agent was running.
    ///
    /// When this returns the scheduler task has finished and the sources are
    /// unsubscribed. Uploads already in flight complete in the background but
    /// their responses are ignored.
    pub async fn stop(&self) -> bool {
        let mut run = self.run.lock().await;
        let Some(active) = run.take() else {
            debug!("Telemetry agent not running");
            return false;
        };

        {
            let mut lifecycle = self.shared.lifecycle.lock();
            lifecycle.epoch += 1;
            lifecycle.running = false;
        }

        active.task.abort();
        if let Err(e) = active.task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Telemetry scheduler ended abnormally");
            }
        }

        self.inertial.unsubscribe();
        self.location.remove_updates();
        *self.shared.location_request.lock() = None;

        let dropped = self.shared.buffer.clear();
        self.shared.set_movement_state(MovementState::Unknown);

        info!(epoch = active.epoch, dropped_samples = dropped, "Telemetry agent stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.shared.lifecycle.lock().running
    }

    pub fn movement_state(&self) -> MovementState {
        self.shared.movement_state()
    }

    pub fn config(&self) -> Arc<AgentConfig> {
        self.shared.config.snapshot()
    }

    pub fn pending_samples(&self) -> usize {
        self.shared.buffer.len()
    }

    pub fn clock(&self) -> AgentClock {
        self.shared.clock
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            running: self.is_running(),
            movement_state: self.movement_state(),
            pending_samples: self.pending_samples(),
            last_sequence: self.shared.sequence.last(),
            uploads_succeeded: self.shared.uploads_succeeded.load(Ordering::Relaxed),
            uploads_failed: self.shared.uploads_failed.load(Ordering::Relaxed),
            location_request: *self.shared.location_request.lock(),
            config: (*self.config()).clone(),
        }
    }
}

/// Single task driving sampling and uploads for one run.
struct Scheduler<U> {
    shared: Arc<Shared<U>>,
    location: Arc<dyn LocationSource>,
    session: Arc<dyn SessionGate>,
    epoch: u64,
    classifier: MotionClassifier,
    builder: SampleBuilder,
}

impl<U: Uploader> Scheduler<U> {
    async fn run(mut self) {
        let config = self.shared.config.snapshot();
        let sample_period = Duration::from_millis(config.sample_interval_ms.max(1));
        let mut sample_timer = tokio::time::interval(sample_period);
        sample_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let upload_timer = tokio::time::sleep(Duration::from_millis(config.upload_moving_ms));
        tokio::pin!(upload_timer);

        loop {
            tokio::select! {
                tick = sample_timer.tick() => {
                    let now_ms = self.shared.clock.at(tick);
                    self.sample_tick(now_ms);
                }
                () = &mut upload_timer => {
                    self.flush(FlushReason::Periodic);
                    let period = self
                        .shared
                        .config
                        .snapshot()
                        .upload_period_ms(self.classifier.state());
                    upload_timer
                        .as_mut()
                        .reset(Instant::now() + Duration::from_millis(period));
                }
            }
        }
    }

    fn sample_tick(&mut self, now_ms: i64) {
        let config = self.shared.config.snapshot();
        if !self.builder.is_due(now_ms, &config) {
            debug!(now_ms, "Sampling tick arrived early; skipped");
            return;
        }

        let reading = self.shared.signal.read();
        let previous = self.classifier.state();
        let state = self.classifier.observe(
            reading.gyro_magnitude,
            reading.accel_magnitude,
            now_ms,
            &config,
        );

        if state != previous {
            self.shared.set_movement_state(state);
            info!(
                from = previous.as_str(),
                to = state.as_str(),
                gyro = reading.gyro_magnitude,
                accel = reading.accel_magnitude,
                "Movement state changed"
            );
            self.flush(FlushReason::Transition);
            self.request_location(state, &config);
        }

        if let Some(sample) = self.builder.build(now_ms, state, &config) {
            debug!(seq = sample.sequence, gps = sample.gps_available, "Sample buffered");
            self.shared.buffer.append(sample);
        }
    }

    /// Drain the buffer and hand the batch to an upload task.
    fn flush(&self, reason: FlushReason) {
        if !self.session.is_valid() {
            debug!(reason = reason.as_str(), "Session invalid; upload skipped");
            return;
        }

        let min_len = match reason {
            FlushReason::Periodic => self.shared.config.snapshot().periodic_min_batch,
            FlushReason::Transition => 1,
        };
        let Some(batch) = self.shared.buffer.drain_at_least(min_len) else {
            return;
        };

        let request = self.shared.context.request(batch);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(shared.deliver(request, self.epoch, reason));
    }

    /// Replace the location subscription with one matching `state`.
    fn request_location(&self, state: MovementState, config: &AgentConfig) {
        let request = LocationRequest {
            priority: LocationPriority::HighAccuracy,
            interval_ms: config.location_interval_ms(state),
            min_interval_ms: config.location_fastest_ms,
            min_displacement_m: config.location_min_displacement_m,
        };

        self.location.remove_updates();
        self.location
            .request_updates(request, Arc::clone(&self.shared.fix));
        *self.shared.location_request.lock() = Some(request);
    }
}
