use crate::protocol::TabId;

use region_recorder_core::{geometry::SelectionRect, media::export::ExportFormat};
use tokio::{task::AbortHandle, time::Instant};
use tracing::debug;
use uuid::Uuid;

/// Lifecycle phase of a tab's recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing in progress.
    Idle,
    /// Selection received; capture starts after the delay or is starting.
    Armed,
    /// Capture running.
    Recording {
        /// When auto-stop fires, `None` when recording until stopped.
        deadline: Option<Instant>,
    },
    /// Finalize in flight.
    Stopping,
    /// Artifact ready for export.
    Stopped,
    /// At least one export saved.
    Exported,
    /// Cancel in flight.
    Cancelling,
}

/// What a pending timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Begin capture after the start delay.
    StartDelay,
    /// Stop a bounded recording.
    AutoStop,
}

/// The single live timer of a session.
#[derive(Debug)]
pub struct PendingTimer {
    /// Identity checked when the timer fires.
    pub id: u64,
    /// Action on fire.
    pub kind: TimerKind,
    /// Cancels the sleeping timer task.
    pub abort: AbortHandle,
}

/// Start parameters kept between arming and the actual start.
#[derive(Debug, Clone, Copy)]
pub struct ArmedStart {
    /// Region to record.
    pub rect: SelectionRect,
    /// Draw the cursor.
    pub capture_cursor: bool,
    /// Normalized length in seconds, `None` when unbounded.
    pub duration_sec: Option<f64>,
}

/// Canonical per-tab session state, owned by the coordinator.
#[derive(Debug)]
pub struct Session {
    /// Tab the session belongs to.
    pub tab_id: TabId,
    /// Format preselected for the export modal.
    pub format_choice: ExportFormat,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Bumped on arm, stop and cancel; late completions carrying an older
    /// epoch belong to a superseded attempt.
    pub epoch: u64,
    /// Parameters of the armed start.
    pub armed: Option<ArmedStart>,
    /// Correlates log lines of one recording attempt.
    pub session_id: Uuid,
    pending_timer: Option<PendingTimer>,
}

impl Session {
    /// Fresh idle session for `tab_id`.
    pub fn new(tab_id: TabId) -> Self {
        Self {
            tab_id,
            format_choice: ExportFormat::Video,
            phase: Phase::Idle,
            epoch: 0,
            armed: None,
            session_id: Uuid::new_v4(),
            pending_timer: None,
        }
    }

    /// Start a new attempt and return its epoch.
    pub fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Install `timer`, cancelling any timer already in the slot.
    pub fn set_timer(&mut self, timer: PendingTimer) {
        self.clear_timer();
        self.pending_timer = Some(timer);
    }

    /// Cancel the pending timer. Returns whether one was pending.
    pub fn clear_timer(&mut self) -> bool {
        match self.pending_timer.take() {
            Some(timer) => {
                timer.abort.abort();
                debug!(tab_id = %self.tab_id, timer_id = timer.id, kind = ?timer.kind, "Timer cleared");
                true
            }
            None => false,
        }
    }

    /// Claim a fired timer.
    ///
    /// Only the timer currently in the slot is honoured; a fire from a timer
    /// that was already cleared or replaced yields `None`.
    pub fn take_fired_timer(&mut self, timer_id: u64) -> Option<TimerKind> {
        match &self.pending_timer {
            Some(timer) if timer.id == timer_id => self.pending_timer.take().map(|t| t.kind),
            _ => None,
        }
    }

    /// Kind of the pending timer, if any.
    pub fn pending_timer(&self) -> Option<TimerKind> {
        self.pending_timer.as_ref().map(|timer| timer.kind)
    }

    /// Whether a stop would have anything to stop.
    pub fn accepts_stop(&self) -> bool {
        matches!(self.phase, Phase::Armed | Phase::Recording { .. })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.clear_timer();
    }
}
