//! Commit clock
//!
//! Issues totally ordered commits for a single writer stream. Timestamps are
//! truncated to microseconds (the precision Postgres keeps) and never go
//! backwards: when the wall clock does not advance past the last issued
//! timestamp the clock steps forward by one microsecond instead.

use super::models::{Commit, CommitId};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::{Arc, Mutex};

/// Source of wall-clock time
pub type TimeSource = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Default)]
struct ClockState {
    last_id: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

pub struct CommitClock {
    state: Mutex<ClockState>,
    now: TimeSource,
}

impl std::fmt::Debug for CommitClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitClock").field("state", &self.state).finish()
    }
}

impl Default for CommitClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitClock {
    /// Clock over the system wall clock, starting at commit 1
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(Utc::now))
    }

    pub fn with_time_source(now: TimeSource) -> Self {
        Self {
            state: Mutex::new(ClockState::default()),
            now,
        }
    }

    /// Continue after the newest commit already in a store
    pub fn resume_from(self, last: Option<&Commit>) -> Self {
        if let Some(commit) = last {
            let mut state = self.lock();
            state.last_id = commit.id.0;
            state.last_timestamp = Some(commit.timestamp);
        }
        self
    }

    /// Issue the next commit
    pub fn next_commit(&self, author: Option<&str>) -> Commit {
        let wall = (self.now)().trunc_subsecs(6);
        let mut state = self.lock();

        let timestamp = match state.last_timestamp {
            Some(last) if wall <= last => {
                tracing::debug!(%wall, %last, "Wall clock did not advance, stepping commit timestamp");
                last + Duration::microseconds(1)
            },
            _ => wall,
        };

        state.last_id += 1;
        state.last_timestamp = Some(timestamp);

        Commit {
            id: CommitId(state.last_id),
            timestamp,
            author: author.map(str::to_string),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockState> {
        // The state is two integers; a panic while holding the lock cannot leave it torn
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
