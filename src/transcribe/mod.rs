//! Transcription runs: decoder plus reconnecting recognition sessions.

pub mod context;
pub mod supervisor;

pub use context::{TerminationCause, TranscriptionContext};
pub use supervisor::{SessionOutcome, SupervisorState, TranscriptionSupervisor};
