//! procwarden - supervise one command, journal everything it does
//!
//! The main entry point handles:
//! - Running a command (optionally escalated) with its output journaled
//! - Writing, flushing and inspecting the structured journal
//! - Managing the stored escalation secret
//! - Showing and validating configuration

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use pw_common::{Error, LogType, Result, Secret};
use pw_config::{resolve_paths, ConfigPaths, ConfigStore};
use pw_core::exit_codes::ExitCode;
use pw_core::logging::{init_logging, LogConfig, LogFormat};
use pw_core::supervisor::{describe_status, CommandSpec, ProcessSupervisor, SupervisorConfig};
use pw_core::vault::{CredentialVault, ProcHostProbe, SecretStore};
use pw_core::Journal;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// procwarden - run a command under supervision with a structured journal
#[derive(Parser)]
#[command(name = "procwarden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Override config directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Override journal file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Increase diagnostic verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors on stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Diagnostic output format
    #[arg(long, global = true, value_enum, env = "PW_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command until it exits, journaling its output
    Run(RunArgs),

    /// Inspect and maintain the journal
    Log(LogArgs),

    /// Manage the escalation secret
    Vault(VaultArgs),

    /// Show or validate configuration
    Config(ConfigArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Run through the escalation program
    #[arg(long)]
    sudo: bool,

    /// Read the escalation secret from stdin instead of the store
    #[arg(long, requires = "sudo")]
    secret_stdin: bool,

    /// Stop the command after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Do not mirror output lines to stdout
    #[arg(long)]
    no_echo: bool,

    /// Escalation program
    #[arg(long, default_value = "sudo")]
    escalation_program: String,

    /// Command and arguments
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

#[derive(Args, Debug)]
struct LogArgs {
    #[command(subcommand)]
    command: LogCommands,
}

#[derive(Subcommand, Debug)]
enum LogCommands {
    /// Append one entry
    Write {
        /// Entry type (e.g. INFO, EVENT)
        #[arg(long = "type", value_name = "TYPE")]
        log_type: LogType,

        /// Field as name=value (repeatable)
        #[arg(long = "field", value_name = "NAME=VALUE", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Remove entries
    Flush {
        /// Entries to remove; 0 removes all
        #[arg(long, default_value_t = 0)]
        count: usize,

        /// Remove the newest entries instead of the oldest
        #[arg(long)]
        inverse: bool,
    },

    /// Print the journal
    Show {
        /// One JSON object per entry
        #[arg(long)]
        json: bool,
    },

    /// Print the persisted counters
    Counters,
}

#[derive(Args, Debug)]
struct VaultArgs {
    #[command(subcommand)]
    command: VaultCommands,
}

#[derive(Subcommand, Debug)]
enum VaultCommands {
    /// Show hash parameters tuned for this machine
    Tune,
    /// Store the escalation secret read from stdin
    Set,
    /// Check a candidate read from stdin (exit 0 on match, 1 otherwise)
    Verify,
    /// Remove the stored secret and hash
    Forget,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print resolved paths and settings
    Show,
    /// Load and validate the config file
    Validate,
}

fn parse_field(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got `{}`", s)),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.exit();
            }
            let _ = e.print();
            std::process::exit(ExitCode::ArgsError.as_i32());
        }
    };

    let level = LogConfig::level_from_flags(cli.global.verbose, cli.global.quiet);
    let log_config = LogConfig::resolve(level, cli.global.log_format.unwrap_or_default())
        .with_source_location(cli.global.verbose >= 3);
    init_logging(&log_config);

    let exit_code = match dispatch(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("procwarden: {}", e);
            ExitCode::for_error(&e)
        }
    };

    std::process::exit(exit_code.as_i32());
}

fn dispatch(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Run(args) => run_command(&cli.global, args),
        Commands::Log(args) => run_log(&cli.global, args),
        Commands::Vault(args) => run_vault(&cli.global, args),
        Commands::Config(args) => run_config(&cli.global, args),
        Commands::Version => {
            println!("procwarden {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::Clean)
        }
    }
}

// ============================================================================
// Shared setup
// ============================================================================

fn paths(global: &GlobalOpts) -> ConfigPaths {
    let paths = resolve_paths(global.config_dir.as_deref(), global.log_file.as_deref());
    debug!(
        config = %paths.config_file.display(),
        config_source = %paths.config_source,
        log = %paths.log_file.display(),
        log_source = %paths.log_source,
        "resolved paths"
    );
    paths
}

fn open_journal(paths: &ConfigPaths) -> Result<Arc<Journal>> {
    let store = ConfigStore::load(&paths.config_file)?;
    Ok(Arc::new(Journal::open(&paths.log_file, store)?))
}

fn secret_store(paths: &ConfigPaths) -> Box<dyn SecretStore> {
    #[cfg(feature = "keyring")]
    {
        let _ = paths;
        Box::new(pw_core::vault::KeyringSecretStore::new())
    }
    #[cfg(not(feature = "keyring"))]
    {
        Box::new(pw_core::vault::FileSecretStore::new(&paths.secrets_file))
    }
}

fn open_vault(paths: &ConfigPaths, journal: &Arc<Journal>) -> Result<CredentialVault> {
    let caps = journal.settings().hash_parameters;
    CredentialVault::new(
        journal.clone(),
        secret_store(paths),
        Box::new(ProcHostProbe::new()),
        caps,
    )
}

/// One line from stdin, without the line terminator.
fn read_secret_line() -> Result<Secret> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
    Ok(Secret::from(trimmed))
}

// ============================================================================
// run
// ============================================================================

fn run_command(global: &GlobalOpts, args: &RunArgs) -> Result<ExitCode> {
    let paths = paths(global);
    let journal = open_journal(&paths)?;

    let config = SupervisorConfig {
        escalation_program: args.escalation_program.clone(),
        echo_to_console: !args.no_echo,
        ..SupervisorConfig::default()
    };
    let mut supervisor = ProcessSupervisor::new(journal.clone(), config);

    let mut spec = CommandSpec::new(args.command.iter().cloned());
    if args.sudo {
        spec = spec.escalated();
        if args.secret_stdin {
            spec = spec.with_secret(read_secret_line()?);
        } else {
            let vault = open_vault(&paths, &journal)?;
            supervisor = supervisor.with_vault(Arc::new(vault));
        }
    }

    supervisor.start(spec)?;
    let exited = supervisor.wait_for_exit(args.timeout.map(Duration::from_secs))?;
    let status = supervisor.stop()?;

    if exited.is_none() {
        eprintln!(
            "procwarden: timed out after {}s",
            args.timeout.unwrap_or_default()
        );
        return Ok(ExitCode::TimeoutError);
    }
    match status {
        Some(status) if status.success() => Ok(ExitCode::Clean),
        Some(status) => {
            eprintln!("procwarden: command {}", describe_status(status));
            Ok(ExitCode::ChildFailed)
        }
        None => Ok(ExitCode::Clean),
    }
}

// ============================================================================
// log
// ============================================================================

fn run_log(global: &GlobalOpts, args: &LogArgs) -> Result<ExitCode> {
    let paths = paths(global);
    let journal = open_journal(&paths)?;

    match &args.command {
        LogCommands::Write { log_type, fields } => {
            let sequence = journal.write(*log_type, fields.iter().map(|(k, v)| (k, v)))?;
            println!("{}", sequence);
        }
        LogCommands::Flush { count, inverse } => {
            let removed = journal.flush(*count, *inverse)?;
            println!("{}", removed);
        }
        LogCommands::Show { json } => {
            if *json {
                for entry in journal.entries()? {
                    println!("{}", serde_json::to_string(&entry)?);
                }
            } else {
                print!("{}", journal.read_raw()?);
            }
        }
        LogCommands::Counters => {
            println!("{}", serde_json::to_string_pretty(&journal.counters())?);
        }
    }
    Ok(ExitCode::Clean)
}

// ============================================================================
// vault
// ============================================================================

fn run_vault(global: &GlobalOpts, args: &VaultArgs) -> Result<ExitCode> {
    let paths = paths(global);
    let journal = open_journal(&paths)?;
    let vault = open_vault(&paths, &journal)?;

    match args.command {
        VaultCommands::Tune => {
            let params = vault.tune_parameters()?;
            println!("{}", serde_json::to_string_pretty(&params)?);
            Ok(ExitCode::Clean)
        }
        VaultCommands::Set => {
            vault.remember_escalation_secret(&read_secret_line()?)?;
            println!("stored");
            Ok(ExitCode::Clean)
        }
        VaultCommands::Verify => {
            if vault.verify(&read_secret_line()?)? {
                println!("match");
                Ok(ExitCode::Clean)
            } else {
                println!("no match");
                Ok(ExitCode::NoMatch)
            }
        }
        VaultCommands::Forget => {
            let removed = vault.forget()?;
            println!("{}", if removed { "removed" } else { "nothing stored" });
            Ok(ExitCode::Clean)
        }
    }
}

// ============================================================================
// config
// ============================================================================

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> Result<ExitCode> {
    let paths = paths(global);
    let store = ConfigStore::load(&paths.config_file).map_err(Error::from)?;

    match args.command {
        ConfigCommands::Show => {
            let view = serde_json::json!({
                "config_file": paths.config_file,
                "config_source": paths.config_source.to_string(),
                "config_exists": paths.config_file.exists(),
                "log_file": paths.log_file,
                "log_source": paths.log_source.to_string(),
                "secrets_file": paths.secrets_file,
                "settings": store.settings(),
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        ConfigCommands::Validate => {
            println!("valid: {}", paths.config_file.display());
        }
    }
    Ok(ExitCode::Clean)
}
