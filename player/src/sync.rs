//! Keeps the set of visible overlays in step with the playback position.
//!
//! `PlaybackSync` is a plain state machine fed by the player's progress
//! callbacks. `SyncSession` adds a frame ticker so that bursts of progress
//! updates are coalesced and evaluated at most once per frame.

use std::collections::{BTreeSet, HashMap};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::interaction::{InteractionKind, InteractionPoint};
use crate::ticker::FrameTicker;

/// A progress report from the embedded player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub played_fraction: f64,
    pub played_seconds: f64,
}

impl Progress {
    pub fn at(seconds: f64) -> Self {
        Self {
            played_fraction: 0.0,
            played_seconds: seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Activated(i64),
    Deactivated(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub choice: String,
    pub decided_at: DateTime<Utc>,
}

/// Invoked with the interaction id and the chosen option.
pub type DecisionCallback = Box<dyn FnMut(i64, &str) + Send>;

pub struct PlaybackSync {
    points: Vec<InteractionPoint>,
    active: BTreeSet<i64>,
    duration: Option<f64>,
    pending: Option<Progress>,
    decisions: HashMap<i64, Decision>,
    on_decision: Option<DecisionCallback>,
    torn_down: bool,
}

impl PlaybackSync {
    pub fn new(points: Vec<InteractionPoint>) -> Self {
        let malformed = points.iter().filter(|p| !p.has_valid_window()).count();
        if malformed > 0 {
            warn!("{} interaction point(s) have malformed windows and will never show", malformed);
        }

        Self {
            points,
            active: BTreeSet::new(),
            duration: None,
            pending: None,
            decisions: HashMap::new(),
            on_decision: None,
            torn_down: false,
        }
    }

    pub fn on_decision_made(&mut self, callback: DecisionCallback) {
        if !self.torn_down {
            self.on_decision = Some(callback);
        }
    }

    /// Recompute the active set for a new position and report what changed.
    pub fn on_progress(&mut self, progress: Progress) -> Vec<SyncEvent> {
        if self.torn_down {
            return Vec::new();
        }

        let Some(position) = self.position_of(progress) else {
            debug!("Ignoring progress update without a usable position: {:?}", progress);
            return Vec::new();
        };

        let next: BTreeSet<i64> = self
            .points
            .iter()
            .filter(|p| p.contains(position))
            .map(|p| p.id)
            .collect();

        self.replace_active(next)
    }

    /// Store the latest position; only the most recent one survives until `on_frame`.
    pub fn queue_progress(&mut self, progress: Progress) {
        if !self.torn_down {
            self.pending = Some(progress);
        }
    }

    pub fn on_frame(&mut self) -> Vec<SyncEvent> {
        match self.pending.take() {
            Some(progress) => self.on_progress(progress),
            None => Vec::new(),
        }
    }

    pub fn on_duration(&mut self, total_seconds: f64) {
        if self.torn_down {
            return;
        }
        if total_seconds.is_finite() && total_seconds > 0.0 {
            self.duration = Some(total_seconds);
        } else {
            warn!("Ignoring invalid duration report: {}", total_seconds);
        }
    }

    pub fn on_ended(&mut self) -> Vec<SyncEvent> {
        if self.torn_down {
            return Vec::new();
        }
        self.pending = None;
        self.replace_active(BTreeSet::new())
    }

    /// Record a decision answer. The overlay stays active until its window ends.
    pub fn record_decision(&mut self, id: i64, choice: &str) -> bool {
        if self.torn_down {
            return false;
        }

        let is_decision = self
            .points
            .iter()
            .any(|p| p.id == id && p.kind == InteractionKind::Decision);
        if !is_decision {
            warn!("Decision recorded for unknown or non-decision interaction {}", id);
            return false;
        }

        self.decisions.insert(
            id,
            Decision {
                choice: choice.to_string(),
                decided_at: Utc::now(),
            },
        );

        if let Some(callback) = self.on_decision.as_mut() {
            callback(id, choice);
        }
        true
    }

    /// Ids of the currently visible overlays, ascending.
    pub fn active_ids(&self) -> Vec<i64> {
        self.active.iter().copied().collect()
    }

    pub fn decisions(&self) -> &HashMap<i64, Decision> {
        &self.decisions
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Release everything. Every entry point is a no-op afterwards.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.pending = None;
        self.active.clear();
        self.on_decision = None;
    }

    fn position_of(&self, progress: Progress) -> Option<f64> {
        if progress.played_seconds.is_finite() {
            return Some(progress.played_seconds);
        }
        // Fall back to the fraction once the duration is known.
        let duration = self.duration?;
        progress
            .played_fraction
            .is_finite()
            .then(|| progress.played_fraction * duration)
    }

    fn replace_active(&mut self, next: BTreeSet<i64>) -> Vec<SyncEvent> {
        if next == self.active {
            return Vec::new();
        }

        let mut events: Vec<SyncEvent> = self
            .active
            .difference(&next)
            .map(|id| SyncEvent::Deactivated(*id))
            .collect();
        events.extend(next.difference(&self.active).map(|id| SyncEvent::Activated(*id)));

        self.active = next;
        events
    }
}

/// A controller driven by a frame ticker.
///
/// Progress updates are queued as they arrive; `pump` consumes pending ticks
/// on the caller's thread and evaluates the newest position once. Dropping
/// the session stops and joins the ticker thread.
pub struct SyncSession {
    sync: PlaybackSync,
    ticker: FrameTicker,
    ticks: Receiver<()>,
}

impl SyncSession {
    pub fn start(points: Vec<InteractionPoint>, frame_interval: Duration) -> Self {
        let (tx, ticks) = mpsc::channel();
        Self {
            sync: PlaybackSync::new(points),
            ticker: FrameTicker::start(frame_interval, tx),
            ticks,
        }
    }

    pub fn queue_progress(&mut self, progress: Progress) {
        self.sync.queue_progress(progress);
    }

    /// Run one frame if at least one tick arrived since the last pump.
    pub fn pump(&mut self) -> Vec<SyncEvent> {
        let mut ticked = false;
        while self.ticks.try_recv().is_ok() {
            ticked = true;
        }

        if ticked {
            self.sync.on_frame()
        } else {
            Vec::new()
        }
    }

    /// Block until the next tick (or `timeout`) and run one frame.
    pub fn wait_frame(&mut self, timeout: Duration) -> Vec<SyncEvent> {
        if self.ticks.recv_timeout(timeout).is_err() {
            return Vec::new();
        }
        while self.ticks.try_recv().is_ok() {}
        self.sync.on_frame()
    }

    pub fn sync(&self) -> &PlaybackSync {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut PlaybackSync {
        &mut self.sync
    }

    pub fn ticker_running(&self) -> bool {
        self.ticker.is_running()
    }

    pub fn teardown(&mut self) {
        self.ticker.stop();
        self.sync.teardown();
    }
}
