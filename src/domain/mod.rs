//! # Domain Layer
//!
//! Core definitions, types, and traits shared by the parser and its execution targets.

pub mod config;
pub mod paths;
pub mod traits;
pub mod types;
