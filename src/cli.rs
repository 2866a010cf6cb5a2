use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell as ClapShell, generate};
use std::io;

/// Shell type for completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    Elvish,
    #[value(name = "powershell")]
    Powershell,
}

impl From<Shell> for ClapShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => ClapShell::Bash,
            Shell::Zsh => ClapShell::Zsh,
            Shell::Fish => ClapShell::Fish,
            Shell::Elvish => ClapShell::Elvish,
            Shell::Powershell => ClapShell::PowerShell,
        }
    }
}

/// CLI command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get,
    Poke,
    Set { percentage: i64 },
    Increment { percentage: i64 },
    Decrement { percentage: i64 },
    Watch,
    Daemon,
    Completion { shell: Shell },
}

/// Shared brightness control tool
#[derive(Parser, Debug)]
#[command(name = "ddclight")]
#[command(about = "Keep every display at a shared brightness percentage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current brightness setpoint
    Get,
    /// Re-announce the current setpoint to watchers and print it
    Poke,
    /// Set the setpoint, clamped to 0-100
    Set {
        /// Target percentage
        #[arg(allow_negative_numbers = true)]
        percentage: i64,
    },
    /// Raise the setpoint, saturating at 100
    Increment {
        /// Step size in percentage points
        percentage: i64,
    },
    /// Lower the setpoint, saturating at 0
    Decrement {
        /// Step size in percentage points
        percentage: i64,
    },
    /// Print the setpoint now and again after every change
    Watch,
    /// Run the brightness daemon on the session bus
    Daemon,
    /// Generate shell completion script
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse command-line arguments and return the Command
pub fn parse() -> Command {
    let cli = Cli::parse();
    command_from_commands(cli.command)
}

/// Generate shell completion script to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let clap_shell: ClapShell = shell.into();
    generate(clap_shell, &mut cmd, "ddclight", &mut io::stdout());
}

/// Convert internal Commands enum to public Command enum
fn command_from_commands(cmd: Commands) -> Command {
    match cmd {
        Commands::Get => Command::Get,
        Commands::Poke => Command::Poke,
        Commands::Set { percentage } => Command::Set { percentage },
        Commands::Increment { percentage } => Command::Increment { percentage },
        Commands::Decrement { percentage } => Command::Decrement { percentage },
        Commands::Watch => Command::Watch,
        Commands::Daemon => Command::Daemon,
        Commands::Completion { shell } => Command::Completion { shell },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_get() {
        let cli = Cli::try_parse_from(["ddclight", "get"]).unwrap();
        let command = command_from_commands(cli.command);
        assert_eq!(command, Command::Get);
    }

    #[test]
    fn parse_command_poke() {
        let cli = Cli::try_parse_from(["ddclight", "poke"]).unwrap();
        let command = command_from_commands(cli.command);
        assert_eq!(command, Command::Poke);
    }

    #[test]
    fn parse_command_watch() {
        let cli = Cli::try_parse_from(["ddclight", "watch"]).unwrap();
        let command = command_from_commands(cli.command);
        assert_eq!(command, Command::Watch);
    }

    #[test]
    fn parse_command_daemon() {
        let cli = Cli::try_parse_from(["ddclight", "daemon"]).unwrap();
        let command = command_from_commands(cli.command);
        assert_eq!(command, Command::Daemon);
    }

    #[test]
    fn parse_set_with_percentage() {
        let cli = Cli::try_parse_from(["ddclight", "set", "70"]).unwrap();
        let command = command_from_commands(cli.command);
        assert_eq!(command, Command::Set { percentage: 70 });
    }

    #[test]
    fn parse_set_negative_percentage() {
        // Out-of-range values are accepted here and clamped by the daemon.
        let cli = Cli::try_parse_from(["ddclight", "set", "-10"]).unwrap();
        let command = command_from_commands(cli.command);
        assert_eq!(command, Command::Set { percentage: -10 });
    }

    #[test]
    fn parse_set_requires_percentage() {
        let result = Cli::try_parse_from(["ddclight", "set"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_set_rejects_non_numeric() {
        let result = Cli::try_parse_from(["ddclight", "set", "bright"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_increment() {
        let cli = Cli::try_parse_from(["ddclight", "increment", "5"]).unwrap();
        let command = command_from_commands(cli.command);
        assert_eq!(command, Command::Increment { percentage: 5 });
    }

    #[test]
    fn parse_decrement() {
        let cli = Cli::try_parse_from(["ddclight", "decrement", "5"]).unwrap();
        let command = command_from_commands(cli.command);
        assert_eq!(command, Command::Decrement { percentage: 5 });
    }

    #[test]
    fn parse_completion_bash() {
        let cli = Cli::try_parse_from(["ddclight", "completion", "bash"]).unwrap();
        let command = command_from_commands(cli.command);
        assert!(matches!(
            command,
            Command::Completion { shell: Shell::Bash }
        ));
    }

    #[test]
    fn parse_completion_zsh() {
        let cli = Cli::try_parse_from(["ddclight", "completion", "zsh"]).unwrap();
        let command = command_from_commands(cli.command);
        assert!(matches!(command, Command::Completion { shell: Shell::Zsh }));
    }

    #[test]
    fn parse_completion_invalid() {
        let result = Cli::try_parse_from(["ddclight", "completion", "invalid"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_invalid_command() {
        let result = Cli::try_parse_from(["ddclight", "brighter"]);
        assert!(
            result.is_err(),
            "Expected parsing to fail for invalid command"
        );
    }

    #[test]
    fn usage_error_exit_code() {
        let result = Cli::try_parse_from(["ddclight", "invalid"]);
        assert!(result.is_err());

        let err = result.unwrap_err();
        assert_eq!(err.exit_code(), 2, "Usage errors should exit with code 2");
    }
}
