//! # Infrastructure Layer
//!
//! Concrete implementations of the domain traits (the local sandbox) and
//! process-level setup such as logging.

pub mod logging;
pub mod tools;
