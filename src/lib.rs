//! Streaming parser and executor for `boltAction` tags embedded in model responses.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod strings;
