//! # Strings Module
//!
//! Centralizes log lines and user-facing messages.

pub mod logs;
pub mod messages;
