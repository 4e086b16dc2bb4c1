use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use termlink_connection::{Connection, ConnectionConfig};
use termlink_remote::{FileExchangeConfig, DEFAULT_FILE_EXTENSIONS};
use termlink_transport::DEFAULT_CONTROL_PORT;

use crate::exit::{connection_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod command;
pub mod files;
pub mod impedance;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a remote-script command and print the reply.
    Command(CommandArgs),
    /// Measure one impedance point.
    Impedance(ImpedanceArgs),
    /// Fetch a single file from the terminal.
    AcquireFile(AcquireFileArgs),
    /// Collect files the terminal pushes until interrupted.
    WatchFiles(WatchFilesArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Command(args) => command::run(args, format),
        Command::Impedance(args) => impedance::run(args, format),
        Command::AcquireFile(args) => files::acquire(args, format),
        Command::WatchFiles(args) => files::watch(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct TerminalArgs {
    /// Terminal host name or address.
    #[arg(long, env = "TERMLINK_HOST", default_value = "localhost")]
    pub host: String,
    /// Remote interface port.
    #[arg(long, env = "TERMLINK_PORT", default_value_t = DEFAULT_CONTROL_PORT)]
    pub port: u16,
    /// Connection name registered with the terminal.
    #[arg(long)]
    pub name: Option<String>,
    /// Connect and reply timeout (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

impl TerminalArgs {
    pub fn connection_config(&self) -> CliResult<ConnectionConfig> {
        let timeout = parse_duration(&self.timeout)?;
        let mut config = ConnectionConfig::default()
            .with_port(self.port)
            .with_default_timeout(Some(timeout));
        config.stream.connect_timeout = Some(timeout);
        Ok(config)
    }

    pub fn file_exchange_config(&self) -> CliResult<FileExchangeConfig> {
        let connection = self.connection_config()?;
        Ok(FileExchangeConfig {
            reply_timeout: connection.default_timeout,
            connection,
            ..FileExchangeConfig::default()
        })
    }

    /// Open a connection registered under `--name`, or `default_name`.
    pub fn connect(&self, default_name: &str) -> CliResult<Connection> {
        let connection = Connection::with_config(self.connection_config()?);
        let name = self.name.as_deref().unwrap_or(default_name);
        connection
            .connect(&self.host, name)
            .map_err(|err| connection_error("connect failed", err))?;
        Ok(connection)
    }
}

#[derive(Args, Debug)]
pub struct CommandArgs {
    #[command(flatten)]
    pub terminal: TerminalArgs,
    /// Remote-script command, e.g. `Pset=0.1` or `IMPEDANCE`.
    pub command: String,
    /// Switch the terminal into remote-script mode first.
    #[arg(long)]
    pub force_remote: bool,
}

#[derive(Args, Debug)]
pub struct ImpedanceArgs {
    #[command(flatten)]
    pub terminal: TerminalArgs,
    /// Excitation frequency in hertz.
    #[arg(long, short = 'f')]
    pub frequency: Option<f64>,
    /// Excitation amplitude in volts.
    #[arg(long, short = 'a', requires = "frequency")]
    pub amplitude: Option<f64>,
    /// Periods averaged per point (1 to 100).
    #[arg(long, default_value_t = 1, requires = "amplitude")]
    pub periods: u32,
}

#[derive(Args, Debug)]
pub struct AcquireFileArgs {
    #[command(flatten)]
    pub terminal: TerminalArgs,
    /// Path of the file on the terminal.
    pub path: String,
    /// Directory to save the file in.
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WatchFilesArgs {
    #[command(flatten)]
    pub terminal: TerminalArgs,
    /// Extensions the terminal should push.
    #[arg(long, default_value = DEFAULT_FILE_EXTENSIONS)]
    pub extensions: String,
    /// Directory to save received files in.
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output: Option<PathBuf>,
    /// File names to ignore (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,
    /// Exit after receiving N files.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
