//! procwarden core library
//!
//! - [`supervisor`]: run one external command (optionally escalated), drain
//!   its output into the journal, stop it on request
//! - [`journal`]: schema-validated, append-only structured log with
//!   persistent counters
//! - [`vault`]: Argon2id hashing and storage of the escalation secret
//! - [`logging`]: `tracing` diagnostics setup
//! - [`exit_codes`]: CLI exit code contract
//!
//! The binary entry point is in `main.rs`.

pub mod exit_codes;
pub mod journal;
pub mod logging;
pub mod supervisor;
pub mod vault;

pub use exit_codes::ExitCode;
pub use journal::{Journal, LogEntry};
pub use supervisor::{
    CommandSpec, DrainReport, ProcessSupervisor, SupervisorConfig, SupervisorState,
};
pub use vault::{CredentialVault, HashParameters, HostCapabilities, HostProbe, SecretStore};
