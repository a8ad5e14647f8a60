// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Alarm sequencing - audio, relay and the visual alarm flag
//!
//! Triggers are queued to one worker thread. Each trigger runs the full
//! phase sequence `Triggered -> PhaseAudio -> PhaseRelay -> VisualOn ->
//! VisualOff -> Idle` under the sequence lock, so two alarms never
//! interleave their side effects.

mod audio;
mod relay;

pub use audio::{audio_output, AudioOutput, SilentAudio};
#[cfg(feature = "audio")]
pub use audio::{CpalAudio, WavClip};
pub use relay::{lcus_frame, relay_output, RelayOutput, RelayTarget, SimulatedRelay, SysfsGpioRelay};
#[cfg(feature = "serial")]
pub use relay::SerialRelay;
#[cfg(feature = "hardware")]
pub use relay::I2cExpanderRelay;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::EventBus;
use crate::db::AlarmStateStore;
use crate::error::{Result, VigilError};

/// Alarm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// WAV file played in the audio phase
    pub sound_file: Option<PathBuf>,

    /// Play the sound file
    pub enable_audio: bool,

    /// Raise the visual alarm flag
    pub enable_visual_flag: bool,

    /// Relay identifier (`17`, `gpio:17`, `serial:/dev/ttyUSB0`, `i2c:/dev/i2c-1:0x20:3`)
    pub relay_pin: Option<String>,

    /// Seconds the relay stays energized; 0 skips the relay phase
    pub relay_active_secs: f64,

    /// How long the visual flag stays raised
    pub visual_hold_ms: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            sound_file: None,
            enable_audio: true,
            enable_visual_flag: true,
            relay_pin: None,
            relay_active_secs: 5.0,
            visual_hold_ms: 1000,
        }
    }
}

impl AlarmConfig {
    /// Relay pulse length, `None` when the relay phase is disabled
    pub fn relay_duration(&self) -> Option<Duration> {
        (self.relay_active_secs.is_finite() && self.relay_active_secs > 0.0)
            .then(|| Duration::from_secs_f64(self.relay_active_secs))
    }

    pub fn visual_hold(&self) -> Duration {
        Duration::from_millis(self.visual_hold_ms)
    }
}

/// Durable alarm status shared with any reader in the process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmState {
    pub visual_active: bool,
    pub last_alarm_at: Option<DateTime<Utc>>,
}

/// Where the worker currently is in a phase sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmPhase {
    Idle,
    Triggered,
    PhaseAudio,
    PhaseRelay,
    VisualOn,
    VisualOff,
}

impl std::fmt::Display for AlarmPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Triggered => "triggered",
            Self::PhaseAudio => "audio",
            Self::PhaseRelay => "relay",
            Self::VisualOn => "visual-on",
            Self::VisualOff => "visual-off",
        };
        f.write_str(name)
    }
}

/// One queued alarm
#[derive(Debug, Clone)]
pub struct AlarmRequest {
    pub id: Uuid,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

struct Shared {
    config: AlarmConfig,
    state: RwLock<AlarmState>,
    phase: RwLock<AlarmPhase>,
    sequence_lock: Mutex<()>,
    pending: Mutex<usize>,
    idle: Condvar,
    store: Arc<dyn AlarmStateStore>,
    events: Option<Arc<EventBus>>,
}

impl Shared {
    fn enter(&self, phase: AlarmPhase, request: &AlarmRequest) {
        *self.phase.write() = phase;
        debug!(alarm_id = %request.id, "Alarm phase: {}", phase);
        if let Some(events) = &self.events {
            events.publish_alarm(phase, &request.reason);
        }
    }

    fn update_state(&self, apply: impl FnOnce(&mut AlarmState)) {
        let snapshot = {
            let mut state = self.state.write();
            apply(&mut state);
            state.clone()
        };
        if let Err(e) = self.store.save_alarm_state(&snapshot) {
            warn!("Failed to persist alarm state: {}", e);
        }
    }

    fn run_sequence(&self, request: &AlarmRequest, audio: &mut dyn AudioOutput, relay: &mut dyn RelayOutput) {
        let _sequence = self.sequence_lock.lock();
        let started = Instant::now();

        self.enter(AlarmPhase::Triggered, request);
        info!(
            alarm_id = %request.id,
            queued_ms = (Utc::now() - request.requested_at).num_milliseconds(),
            "Alarm triggered: {}",
            request.reason
        );

        self.enter(AlarmPhase::PhaseAudio, request);
        if self.config.enable_audio {
            match &self.config.sound_file {
                Some(path) if path.is_file() => {
                    if let Err(e) = audio.play_blocking(path) {
                        error!("Alarm sound playback via {} failed: {}", audio.name(), e);
                    }
                }
                Some(path) => warn!("Alarm sound {:?} not found; skipping audio", path),
                None => debug!("No alarm sound configured"),
            }
        }

        self.enter(AlarmPhase::PhaseRelay, request);
        if let Some(duration) = self.config.relay_duration() {
            if let Err(e) = relay.pulse(duration) {
                error!("Relay {} failed: {}", relay.describe(), e);
                if let Err(e) = relay.set_active(false) {
                    error!("Relay {} could not be released: {}", relay.describe(), e);
                }
            }
        }

        self.enter(AlarmPhase::VisualOn, request);
        let visual = self.config.enable_visual_flag;
        self.update_state(|state| {
            state.visual_active = visual;
            state.last_alarm_at = Some(Utc::now());
        });

        thread::sleep(self.config.visual_hold());

        self.enter(AlarmPhase::VisualOff, request);
        self.update_state(|state| state.visual_active = false);

        self.enter(AlarmPhase::Idle, request);
        info!(
            alarm_id = %request.id,
            "Alarm sequence complete in {:.2}s",
            started.elapsed().as_secs_f64()
        );
    }

    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Single owner of the alarm hardware and the alarm state
pub struct AlarmCoordinator {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<AlarmRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AlarmCoordinator {
    /// Load the persisted state and start the alarm worker
    pub fn start(
        config: AlarmConfig,
        audio: Box<dyn AudioOutput>,
        relay: Box<dyn RelayOutput>,
        store: Arc<dyn AlarmStateStore>,
    ) -> Result<Self> {
        Self::start_with_events(config, audio, relay, store, None)
    }

    /// Like [`AlarmCoordinator::start`], also publishing phase changes
    pub fn start_with_events(
        config: AlarmConfig,
        audio: Box<dyn AudioOutput>,
        relay: Box<dyn RelayOutput>,
        store: Arc<dyn AlarmStateStore>,
        events: Option<Arc<EventBus>>,
    ) -> Result<Self> {
        let mut state = store.load_alarm_state()?;
        if state.visual_active {
            // left over from a process that stopped mid-sequence
            info!("Clearing stale visual alarm flag");
            state.visual_active = false;
            store.save_alarm_state(&state)?;
        }

        let shared = Arc::new(Shared {
            config,
            state: RwLock::new(state),
            phase: RwLock::new(AlarmPhase::Idle),
            sequence_lock: Mutex::new(()),
            pending: Mutex::new(0),
            idle: Condvar::new(),
            store,
            events,
        });

        let (sender, receiver) = channel::unbounded();
        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("vigil-alarm".into())
                .spawn(move || alarm_worker(shared, receiver, audio, relay))?
        };

        info!("Alarm coordinator started");
        Ok(Self {
            shared,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue an alarm and return immediately.
    ///
    /// Returns the request id, or `None` once the coordinator is shut down.
    pub fn trigger(&self, reason: &str) -> Option<Uuid> {
        let request = AlarmRequest {
            id: Uuid::new_v4(),
            reason: reason.to_string(),
            requested_at: Utc::now(),
        };
        let id = request.id;

        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            warn!("Alarm coordinator stopped; ignoring trigger: {}", reason);
            return None;
        };

        *self.shared.pending.lock() += 1;
        if sender.send(request).is_err() {
            self.shared.finish_one();
            error!("Alarm worker is gone; trigger dropped: {}", reason);
            return None;
        }
        debug!(alarm_id = %id, "Alarm queued");
        Some(id)
    }

    /// Snapshot of the alarm state; never waits on a running sequence
    pub fn state(&self) -> AlarmState {
        self.shared.state.read().clone()
    }

    pub fn is_visual_active(&self) -> bool {
        self.shared.state.read().visual_active
    }

    pub fn current_phase(&self) -> AlarmPhase {
        *self.shared.phase.read()
    }

    pub fn config(&self) -> &AlarmConfig {
        &self.shared.config
    }

    /// Queued plus running sequences
    pub fn pending(&self) -> usize {
        *self.shared.pending.lock()
    }

    /// Block until every queued trigger has finished or `timeout` passes.
    /// Returns true when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.shared.pending.lock();
        while *pending > 0 {
            if self.shared.idle.wait_until(&mut pending, deadline).timed_out() {
                return *pending == 0;
            }
        }
        true
    }

    /// Run queued triggers to completion, then stop the worker
    pub fn shutdown(&self) -> Result<()> {
        drop(self.sender.lock().take());
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        worker
            .join()
            .map_err(|_| VigilError::Hardware("alarm worker panicked".into()))?;
        info!("Alarm coordinator stopped");
        Ok(())
    }
}

impl Drop for AlarmCoordinator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Alarm shutdown failed: {}", e);
        }
    }
}

fn alarm_worker(
    shared: Arc<Shared>,
    receiver: Receiver<AlarmRequest>,
    mut audio: Box<dyn AudioOutput>,
    mut relay: Box<dyn RelayOutput>,
) {
    debug!(
        "Alarm worker running (audio: {}, relay: {})",
        audio.name(),
        relay.describe()
    );
    for request in receiver.iter() {
        shared.run_sequence(&request, audio.as_mut(), relay.as_mut());
        shared.finish_one();
    }
    debug!("Alarm queue closed");
}
