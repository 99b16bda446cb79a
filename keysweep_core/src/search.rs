use crate::candidate::Candidate;
use crate::checkpoint::{CheckpointError, CheckpointStore, Loaded};
use crate::config::SearchSettings;
use crate::executor::{AttemptExecutor, ExecutionStatus, Outcome, Target};
use crate::generator::{CandidateSource, GeneratorError};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Conditions that stop a search before it can finish.
///
/// Rejected candidates are never errors; they are recorded and the search
/// moves on.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// The unlock mechanism could not be run for this candidate. Nothing was
    /// recorded for it.
    #[error("Could not attempt {candidate:?}: {message}")]
    Executor { candidate: Candidate, message: String },

    /// The candidate unlocked the target but the checkpoint could not record it.
    #[error("'{candidate}' worked but could not be saved to the checkpoint")]
    UnsavedSuccess {
        candidate: Candidate,
        source: CheckpointError,
    },
}

/// States of the search loop. Every state other than `Running` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchState {
    Running,
    /// A candidate unlocked the target during this run.
    Solved(Candidate),
    /// The checkpoint already held these successes; nothing was attempted.
    AlreadySolved(BTreeSet<Candidate>),
    /// Every generated candidate failed.
    Exhausted,
    FatalError,
}

impl SearchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SearchState::Running)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    /// Executor invocations made in this run.
    pub attempted: u64,
    /// Candidates skipped because the checkpoint already held them.
    pub skipped: u64,
    pub elapsed: Duration,
}

impl SearchStats {
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempted as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub state: SearchState,
    pub stats: SearchStats,
}

/// Drives candidates through the executor, one at a time, persisting the
/// checkpoint after every attempt.
pub struct SearchLoop<'a> {
    store: &'a CheckpointStore,
    target: &'a Target,
    settings: SearchSettings,
    state: SearchState,
}

impl<'a> SearchLoop<'a> {
    pub fn new(store: &'a CheckpointStore, target: &'a Target) -> Self {
        Self {
            store,
            target,
            settings: SearchSettings::default(),
            state: SearchState::Running,
        }
    }

    pub fn with_settings(mut self, settings: SearchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    /// Runs the search to a terminal state.
    ///
    /// On `Err` the state is `FatalError` and no further candidates were tried.
    pub fn run(
        &mut self,
        source: &dyn CandidateSource,
        executor: &mut dyn AttemptExecutor,
    ) -> Result<SearchReport, SearchError> {
        self.state = SearchState::Running;
        let start_time = Instant::now();
        let mut stats = SearchStats::default();

        let result = self.drive(source, executor, &mut stats);
        stats.elapsed = start_time.elapsed();

        match result {
            Ok(state) => {
                self.state = state.clone();
                Ok(SearchReport { state, stats })
            }
            Err(e) => {
                error!("Search aborted: {e}");
                self.state = SearchState::FatalError;
                Err(e)
            }
        }
    }

    fn drive(
        &self,
        source: &dyn CandidateSource,
        executor: &mut dyn AttemptExecutor,
        stats: &mut SearchStats,
    ) -> Result<SearchState, SearchError> {
        let _lock = self.store.lock()?;

        let mut record = match self.store.load(&self.target.identity)? {
            Loaded::AlreadySolved(record) => {
                info!(
                    "Successful passwords already known for {:?}; use a different checkpoint file to search again",
                    self.target.identity
                );
                return Ok(SearchState::AlreadySolved(record.success().clone()));
            }
            Loaded::Resumed(record) => {
                info!(
                    "Resuming search on {:?}: {} candidates already attempted",
                    self.target.identity,
                    record.attempted()
                );
                record
            }
            Loaded::Fresh(record) => record,
        };

        let candidates = source.candidates()?;
        match source.size_hint_total() {
            Some(total) => info!("Searching {} candidates from {} source", total, source.name()),
            None => info!("Searching candidates from {} source", source.name()),
        }

        let progress_interval = self.settings.progress_interval.max(1);
        let start_time = Instant::now();

        for item in candidates {
            let candidate = item?;

            if record.is_known_failure(&candidate) {
                debug!("Skipping '{candidate}' - already attempted");
                stats.skipped += 1;
                continue;
            }

            info!("Trying '{candidate}'");
            let status = executor.attempt(self.target, &candidate);
            let Some(outcome) = Outcome::from_status(&status) else {
                let message = match status {
                    ExecutionStatus::Other(message) => message,
                    other => format!("{other:?}"),
                };
                return Err(SearchError::Executor { candidate, message });
            };

            match &status {
                ExecutionStatus::Timeout => {
                    warn!("'{candidate}' timed out, recording as a failure")
                }
                ExecutionStatus::Rejected(desc) => info!("'{candidate}' failed ({desc})"),
                _ => {}
            }

            record.record_attempt(candidate.clone(), outcome);
            stats.attempted += 1;

            if outcome == Outcome::Success {
                info!("'{candidate}' worked");
                if let Err(source) = self.store.persist(&record) {
                    return Err(SearchError::UnsavedSuccess { candidate, source });
                }
                return Ok(SearchState::Solved(candidate));
            }
            self.store.persist(&record)?;

            if stats.attempted % progress_interval == 0 {
                let elapsed = start_time.elapsed().as_secs_f64();
                let rate = if elapsed > 0.0 {
                    stats.attempted as f64 / elapsed
                } else {
                    0.0
                };
                info!(
                    "Progress: {} attempted | {} skipped | Rate: {:.2} guesses/s",
                    stats.attempted, stats.skipped, rate
                );
            }
        }

        info!("Guesses exhausted");
        Ok(SearchState::Exhausted)
    }
}
