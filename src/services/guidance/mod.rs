//! Time-paced turn-by-turn narration
//!
//! A `GuidanceSequencer` owns at most one `GuidanceSession`. Narration is a
//! logical schedule, not a pile of detached timers: instruction `cursor` is
//! due at `anchor + (cursor - anchor_index) * interval`, and the only thing
//! that ever emits an instruction is `poll`, which re-checks session state
//! and voice at fire time. Cancelling just flips the state, which removes the
//! deadline; nothing scheduled earlier can fire afterwards.
//!
//! Muting freezes the cursor. Unmuting resumes from the cursor: the pending
//! instruction keeps its original slot if that is still ahead, otherwise it
//! fires immediately and the rest follow at `interval` spacing. An
//! instruction is therefore never repeated and never skipped.

use crate::domain::types::{GuidanceState, Instruction, RouteResult, SessionId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// One instruction due for narration
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub session: SessionId,
    pub instruction: Instruction,
}

/// What `poll` produced
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub narrations: Vec<Narration>,
    /// Set when this poll emitted the last instruction
    pub completed: Option<SessionId>,
}

#[derive(Debug)]
struct GuidanceSession {
    id: SessionId,
    route: RouteResult,
    cursor: usize,
    state: GuidanceState,
    /// Instruction `anchor_index` is due at `anchor`
    anchor: Instant,
    anchor_index: usize,
}

impl GuidanceSession {
    fn due_at(&self, interval: Duration) -> Instant {
        let steps = (self.cursor - self.anchor_index) as u32;
        self.anchor + interval * steps
    }

    fn is_finished(&self) -> bool {
        self.cursor >= self.route.instructions.len()
    }
}

/// Result of starting a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Started {
    pub session: SessionId,
    /// Previous session that was still playing and got cancelled
    pub replaced: Option<SessionId>,
}

pub struct GuidanceSequencer {
    interval: Duration,
    voice_enabled: bool,
    session: Option<GuidanceSession>,
}

impl GuidanceSequencer {
    pub fn new(interval: Duration, voice_enabled: bool) -> Self {
        Self { interval, voice_enabled, session: None }
    }

    /// Start narrating `route`. A session still playing is cancelled first.
    pub fn start(&mut self, route: RouteResult, now: Instant) -> Started {
        let replaced = self.cancel();

        let id = SessionId::new();
        let steps = route.instructions.len();
        let mut session = GuidanceSession {
            id,
            route,
            cursor: 0,
            state: GuidanceState::Playing,
            anchor: now,
            anchor_index: 0,
        };
        if session.is_finished() {
            session.state = GuidanceState::Completed;
        }

        info!(
            session = %id,
            steps = %steps,
            voice = %self.voice_enabled,
            interval_ms = %self.interval.as_millis(),
            "guidance_started"
        );

        self.session = Some(session);
        Started { session: id, replaced }
    }

    /// Cancel the active session. Safe from any state; returns the session id
    /// only when this call moved it from `Playing` to `Cancelled`.
    pub fn cancel(&mut self) -> Option<SessionId> {
        let session = self.session.as_mut()?;
        if session.state != GuidanceState::Playing {
            return None;
        }

        session.state = GuidanceState::Cancelled;
        info!(
            session = %session.id,
            cursor = %session.cursor,
            remaining = %(session.route.instructions.len() - session.cursor),
            "guidance_cancelled"
        );
        Some(session.id)
    }

    /// Toggle voice. Returns true if the setting changed.
    pub fn set_voice_enabled(&mut self, enabled: bool, now: Instant) -> bool {
        if self.voice_enabled == enabled {
            return false;
        }
        self.voice_enabled = enabled;

        if let Some(session) = self.session.as_mut() {
            if enabled && session.state == GuidanceState::Playing {
                // Keep the original slot if it is still ahead, else fire now
                if session.due_at(self.interval) < now {
                    session.anchor = now;
                    session.anchor_index = session.cursor;
                }
            }
            debug!(session = %session.id, voice = %enabled, cursor = %session.cursor, "guidance_voice_toggled");
        }
        true
    }

    /// When the next narration is due, if any is scheduled
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.voice_enabled {
            return None;
        }
        let session = self.session.as_ref()?;
        if session.state != GuidanceState::Playing || session.is_finished() {
            return None;
        }
        Some(session.due_at(self.interval))
    }

    /// Emit every instruction due at `now`, in sequence order
    pub fn poll(&mut self, now: Instant) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let interval = self.interval;

        let Some(session) = self.session.as_mut() else {
            return outcome;
        };

        while self.voice_enabled
            && session.state == GuidanceState::Playing
            && !session.is_finished()
            && session.due_at(interval) <= now
        {
            let instruction = session.route.instructions[session.cursor].clone();
            session.cursor += 1;

            debug!(
                session = %session.id,
                sequence_index = %instruction.sequence_index,
                "guidance_instruction_due"
            );
            outcome.narrations.push(Narration { session: session.id, instruction });
        }

        if session.state == GuidanceState::Playing && session.is_finished() {
            session.state = GuidanceState::Completed;
            info!(session = %session.id, steps = %session.route.instructions.len(), "guidance_completed");
            outcome.completed = Some(session.id);
        }

        outcome
    }

    /// `Idle` when no session has been started
    pub fn state(&self) -> GuidanceState {
        self.session.as_ref().map_or(GuidanceState::Idle, |s| s.state)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn cursor(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.cursor)
    }

    pub fn route(&self) -> Option<&RouteResult> {
        self.session.as_ref().map(|s| &s.route)
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
