pub mod candidate;
pub mod checkpoint;
pub mod config;
pub mod executor;
pub mod generator;
pub mod search;

pub use candidate::Candidate;
pub use checkpoint::{CheckpointError, CheckpointLock, CheckpointRecord, CheckpointStore, Loaded};
pub use config::{ExhaustiveSettings, GeneratorSettings, KeysweepConfig, WordlistSettings};
pub use executor::{
    AttemptExecutor, CommandExecutor, CommandExecutorConfig, ExecutionStatus, InProcessExecutor,
    Outcome, Target,
};
pub use generator::{
    CandidateSource, CandidateStream, ExhaustiveSource, GeneratorError, WordlistSource,
    source_from_settings,
};
pub use search::{SearchError, SearchLoop, SearchReport, SearchState, SearchStats};
