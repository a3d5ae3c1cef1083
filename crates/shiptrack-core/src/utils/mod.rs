//! Utility functions for request building and message formatting.

pub mod format;
pub mod query;

// Re-export commonly used functions at module level
pub use format::{field_error_message, first_error_message, truncate_string};
pub use query::clean_query;
