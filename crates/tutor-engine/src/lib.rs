//! The attempt conversation engine.
//!
//! [`Engine`] drives one turn per student message: append, count, retrieve,
//! evaluate, validate, and (when the turn is final) grade and finalize. It
//! is generic over the storage and service traits of `tutor-core`.

mod engine;
mod finalize;
mod retrieve;

pub mod config;
pub mod error;
pub mod outcome;

pub use config::{EngineConfig, GradingConfig};
pub use engine::{Engine, TutorStore};
pub use error::{EngineError, Result};
pub use outcome::{Completion, SkillOutcome, SubmissionOutcome};
