//! Data types for tender extraction.

pub mod config;
pub mod identifier;
pub mod outcome;
pub mod request;
pub mod tender;
