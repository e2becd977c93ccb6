//! Utility modules for stream validation
//!
//! Reusable helpers that carry no validation state of their own.

pub mod human_format;
pub mod status_code_matcher;
pub mod system_load;
pub mod url;

// Re-export commonly used types for convenience
pub use system_load::{LoadSample, LoadSampler, SystemLoadSampler};
pub use url::UrlUtils;
