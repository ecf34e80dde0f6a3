//! Utility functions and helpers

pub mod time;

pub use time::{millis, now_millis};
