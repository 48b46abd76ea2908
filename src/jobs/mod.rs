//! Background collection jobs
//!
//! - [`orchestrator`] - Submission, authentication and job dispatch
//! - [`state`] - Job status tracking shared between jobs and pollers

pub mod orchestrator;
pub mod state;

pub use orchestrator::{Orchestrator, OrchestratorSettings, SubmitError, SubmitRequest, Submission};
pub use state::{JobStatus, JobsState};
