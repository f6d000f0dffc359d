//! Core trait abstractions for the extraction engine.
//!
//! These traits define the collaborator contracts the engine consumes:
//! fetching, rendering, parsing and result export.

pub mod fetcher;
pub mod parser;
pub mod renderer;
pub mod sink;
