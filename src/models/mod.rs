//! Data models shared between the validation services and their callers

pub mod channel;
pub mod validation;

pub use channel::Channel;
pub use validation::{
    OutcomeMeta, OutcomeSource, StatsSnapshot, ValidationOptions, ValidationOutcome,
    ValidationReport,
};
