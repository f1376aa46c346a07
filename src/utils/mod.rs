//! Formatting and file helpers

pub mod content_type;
pub mod format;
