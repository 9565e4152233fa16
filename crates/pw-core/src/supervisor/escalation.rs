//! Privilege escalation wrapper.
//!
//! The secret never appears in an argument vector: the escalation program is
//! told to read it from stdin (`-S`) with an empty prompt, and the supervisor
//! writes it straight into the child's stdin pipe. `-k` discards cached
//! credentials so the program always consumes the secret instead of handing
//! it to the wrapped command.

use pw_common::Secret;
use std::io::{self, Write};

/// Arguments placed between the escalation program and the command.
pub const ESCALATION_FLAGS: [&str; 5] = ["-S", "-k", "-p", "", "--"];

/// Full argument vector (program first) for running `argv` escalated.
pub fn wrap(program: &str, argv: &[String]) -> Vec<String> {
    let mut wrapped = Vec::with_capacity(1 + ESCALATION_FLAGS.len() + argv.len());
    wrapped.push(program.to_string());
    wrapped.extend(ESCALATION_FLAGS.iter().map(|s| s.to_string()));
    wrapped.extend(argv.iter().cloned());
    wrapped
}

/// Write the secret and a newline, then close the pipe.
///
/// A program that exits without reading leaves a closed pipe; that is not a
/// delivery failure, the program's own exit status reports the outcome.
pub fn deliver_secret<W: Write>(mut stdin: W, secret: &Secret) -> io::Result<()> {
    let result = stdin
        .write_all(secret.expose().as_bytes())
        .and_then(|_| stdin.write_all(b"\n"))
        .and_then(|_| stdin.flush());
    drop(stdin);
    match result {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Command line for logs: arguments joined, quoted when they contain spaces.
pub fn display_command(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"') {
                format!("{:?}", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
