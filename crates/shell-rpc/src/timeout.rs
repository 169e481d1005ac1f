//! The resilient two-stage timeout state machine.
//!
//! States: `Active -> Grace -> Expired`, plus an always-on absolute
//! ceiling that can fire from either state. This module holds only the
//! decision logic; [`crate::shell`] owns the actual `tokio::time` timers
//! and drives this state machine from chunk arrivals and deadline fires.

use regex::Regex;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::TimeoutReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// What a matched pattern does to the timer.
#[derive(Debug, Clone)]
pub enum Action {
    /// Full-confidence progress indicator: reset the primary timer to
    /// `base_timeout`.
    Reset,
    /// Partial progress: extend the primary timer by `n` milliseconds.
    Extend(u64),
    /// Unrecoverable error output: terminate the command immediately.
    Terminate,
    /// Matches but carries no timer effect.
    Ignore,
    /// Matches, is logged, but carries no timer effect. Distinct from
    /// `Ignore` only in intent — kept separate so adapters can tell their
    /// own logging patterns apart from deliberately-silent ones.
    Log,
}

#[derive(Debug, Clone)]
pub struct PatternAction {
    pub regex: Regex,
    /// `None` matches either stream.
    pub stream: Option<Stream>,
    pub action: Action,
}

impl PatternAction {
    pub fn new(pattern: &str, stream: Option<Stream>, action: Action) -> Self {
        Self {
            regex: Regex::new(pattern).expect("pattern action regex must be valid"),
            stream,
            action,
        }
    }

    fn matches(&self, stream: Stream, chunk: &str) -> bool {
        self.stream.map(|s| s == stream).unwrap_or(true) && self.regex.is_match(chunk)
    }
}

/// Immutable per-invocation timeout configuration.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub base_timeout: Duration,
    pub activity_extension: Duration,
    pub grace: Duration,
    pub absolute_max: Duration,
    pub patterns: Vec<PatternAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Active,
    Grace,
    Expired(TimeoutReason),
}

/// Decision returned after feeding a chunk of output into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkDecision {
    /// Command keeps running; timers have been updated per the matched
    /// action (or generic activity extension if nothing matched).
    Continue,
    /// A `terminate` pattern fired; the caller must send the termination
    /// signal and finalize the result with this reason.
    Terminate(TimeoutReason),
}

/// Tracks timer deadlines and state transitions for a single in-flight
/// command. Deadlines are `Instant`s so the driving loop can race them
/// against `tokio::time::sleep_until` without this module depending on
/// an async runtime.
pub struct TimeoutStateMachine {
    config: TimeoutConfig,
    state: State,
    primary_deadline: Instant,
    grace_deadline: Option<Instant>,
    absolute_deadline: Instant,
}

impl TimeoutStateMachine {
    pub fn start(config: TimeoutConfig, now: Instant) -> Self {
        let primary_deadline = now + config.base_timeout;
        let absolute_deadline = now + config.absolute_max;
        Self {
            config,
            state: State::Active,
            primary_deadline,
            grace_deadline: None,
            absolute_deadline,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn primary_deadline(&self) -> Instant {
        self.primary_deadline
    }

    pub fn grace_deadline(&self) -> Option<Instant> {
        self.grace_deadline
    }

    pub fn absolute_deadline(&self) -> Instant {
        self.absolute_deadline
    }

    /// Feed a chunk of output observed on `stream` at time `now`.
    pub fn on_chunk(&mut self, stream: Stream, chunk: &str, now: Instant) -> ChunkDecision {
        if let State::Expired(reason) = self.state {
            return ChunkDecision::Terminate(reason);
        }

        for pattern in &self.config.patterns {
            if pattern.matches(stream, chunk) {
                return self.apply(pattern.action.clone(), now);
            }
        }
        // No match: generic activity still proves the process is alive.
        self.recover_to_active(now + self.config.activity_extension, now);
        ChunkDecision::Continue
    }

    fn apply(&mut self, action: Action, now: Instant) -> ChunkDecision {
        match action {
            Action::Reset => {
                self.recover_to_active(now + self.config.base_timeout, now);
                ChunkDecision::Continue
            }
            Action::Extend(ms) => {
                let base = if self.primary_deadline > now {
                    self.primary_deadline
                } else {
                    now
                };
                self.recover_to_active(base + Duration::from_millis(ms), now);
                ChunkDecision::Continue
            }
            Action::Terminate => {
                self.state = State::Expired(TimeoutReason::Pattern);
                ChunkDecision::Terminate(TimeoutReason::Pattern)
            }
            Action::Ignore | Action::Log => ChunkDecision::Continue,
        }
    }

    fn recover_to_active(&mut self, new_primary_deadline: Instant, _now: Instant) {
        self.state = State::Active;
        self.grace_deadline = None;
        self.primary_deadline = new_primary_deadline;
    }

    /// The primary timer fired. Transitions `Active -> Grace`; a no-op if
    /// already past Active (e.g. a concurrent chunk already recovered it).
    pub fn on_primary_expired(&mut self, now: Instant) {
        if self.state == State::Active {
            self.state = State::Grace;
            self.grace_deadline = Some(now + self.config.grace);
        }
    }

    /// The grace timer fired with no recovering activity. Terminal.
    pub fn on_grace_expired(&mut self) -> TimeoutReason {
        self.state = State::Expired(TimeoutReason::Silence);
        TimeoutReason::Silence
    }

    /// The absolute ceiling fired. Terminal regardless of current state.
    pub fn on_absolute_expired(&mut self) -> TimeoutReason {
        self.state = State::Expired(TimeoutReason::Absolute);
        TimeoutReason::Absolute
    }
}
