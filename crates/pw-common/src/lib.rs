//! procwarden common types and errors.
//!
//! This crate provides foundational types shared by the config and core crates:
//! - The fixed enumeration of journal entry types
//! - Output stream names for drained child processes
//! - A secret wrapper that never prints its contents
//! - The unified error taxonomy with stable codes

pub mod error;
pub mod log_type;
pub mod secret;

pub use error::{Error, ErrorCategory, Result};
pub use log_type::{LogType, StreamName};
pub use secret::Secret;
