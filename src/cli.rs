use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::io;
use std::path::PathBuf;

/// Parsed command-line intent.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "vmclink",
    version,
    about = "Serial command/response client for a vending-machine controller"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print shell completions to stdout
    Completions { shell: Shell },
}

/// Options for the link daemon; values are `None` when not provided on CLI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Args)]
pub struct RunOptions {
    /// Serial device path (default: /dev/serial0)
    #[arg(long, env = "VMCLINK_DEVICE", value_name = "PATH")]
    pub device: Option<String>,

    /// Baud rate (default: 9600)
    #[arg(long, value_name = "N")]
    pub baud: Option<u32>,

    /// Read timeout per exchange in milliseconds (default: 1000)
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub serial_timeout_ms: Option<u64>,

    /// Display refresh period in milliseconds (default: 750)
    #[arg(long = "poll-interval-ms", value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Key closure time in milliseconds (default: 1000)
    #[arg(long = "key-duration-ms", value_name = "MS")]
    pub key_press_duration_ms: Option<u32>,

    /// error, warn, info, debug or trace
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Append log lines to this file as well as stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<String>,

    /// How events are written to stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Config file to use instead of ~/.vmclink/config.toml
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    pub fn print_completions(shell: Shell) {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("vmclink").chain(args.iter().copied()))
    }

    #[test]
    fn parse_defaults_with_no_args() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.run.baud, None);
        assert_eq!(cli.run.format, OutputFormat::Text);
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = parse(&[
            "--device",
            "/dev/ttyUSB0",
            "--baud",
            "19200",
            "--timeout-ms",
            "500",
            "--poll-interval-ms",
            "1000",
            "--key-duration-ms",
            "250",
            "--log-level",
            "debug",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.run.device.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.run.baud, Some(19_200));
        assert_eq!(cli.run.serial_timeout_ms, Some(500));
        assert_eq!(cli.run.poll_interval_ms, Some(1000));
        assert_eq!(cli.run.key_press_duration_ms, Some(250));
        assert_eq!(cli.run.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.run.format, OutputFormat::Json);
    }

    #[test]
    fn parse_completions() {
        let cli = parse(&["completions", "bash"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Completions { shell: Shell::Bash })
        );
    }

    #[test]
    fn parse_rejects_unknown_flag() {
        assert!(parse(&["--nope"]).is_err());
    }

    #[test]
    fn parse_rejects_non_numeric_baud() {
        assert!(parse(&["--baud", "fast"]).is_err());
    }
}
