//! Statement profiling hook.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Receives a start and a finish call around every native execution,
/// whether or not the statement succeeded.
pub trait Profiler: Send {
    fn profiler_start(&self, sql: &str);
    fn profiler_finish(&self, sql: &str);
}

impl<P: Profiler + Sync> Profiler for Arc<P> {
    fn profiler_start(&self, sql: &str) {
        (**self).profiler_start(sql);
    }

    fn profiler_finish(&self, sql: &str) {
        (**self).profiler_finish(sql);
    }
}

/// One profiled statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub sql: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct ProfilerState {
    pending: Option<(String, DateTime<Utc>, Instant)>,
    profiles: Vec<Profile>,
}

/// Records wall-clock timings for every statement it sees.
///
/// Share it with `Arc` to read the profiles back while the connection owns it:
///
/// ```rust
/// use std::sync::Arc;
/// use sql_adapter::prelude::*;
///
/// let profiler = Arc::new(QueryProfiler::new());
/// profiler.profiler_start("SELECT 1");
/// profiler.profiler_finish("SELECT 1");
/// assert_eq!(profiler.profiles()[0].sql, "SELECT 1");
/// ```
#[derive(Debug, Default)]
pub struct QueryProfiler {
    state: Mutex<ProfilerState>,
}

impl QueryProfiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn profiles(&self) -> Vec<Profile> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .profiles
            .clone()
    }

    /// Total time spent across every recorded statement.
    #[must_use]
    pub fn total_elapsed(&self) -> Duration {
        self.profiles().iter().map(|p| p.elapsed).sum()
    }
}

impl Profiler for QueryProfiler {
    fn profiler_start(&self, sql: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending = Some((sql.to_string(), Utc::now(), Instant::now()));
    }

    fn profiler_finish(&self, sql: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((started_sql, started_at, instant)) = state.pending.take() else {
            tracing::warn!(sql, "profiler finish without a matching start");
            return;
        };
        let elapsed = instant.elapsed();
        tracing::debug!(
            sql = %started_sql,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "statement profiled"
        );
        state.profiles.push(Profile {
            sql: started_sql,
            started_at,
            elapsed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_finish_pair_up() {
        let profiler = QueryProfiler::new();
        profiler.profiler_start("SELECT 1");
        profiler.profiler_finish("SELECT 1");
        profiler.profiler_finish("SELECT 2");
        let profiles = profiler.profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].sql, "SELECT 1");
        assert!(profiler.total_elapsed() >= profiles[0].elapsed);
    }
}
