mod backlight;
mod bus;
mod cli;
mod client;
mod control;
mod daemon;
mod ddc;
mod error;
mod outputs;
mod state;
mod sysfs;
mod wayland;
mod worker;

use std::process::ExitCode as StdExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> StdExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI arguments - clap handles usage errors and exits with code 2
    let command = cli::parse();

    match run(command) {
        Ok(()) => error::ExitCode::Success.into(),
        Err(e) => {
            // All errors go to stderr
            eprintln!("Error: {}", e);
            e.exit_code().into()
        }
    }
}

fn run(command: cli::Command) -> Result<(), error::Error> {
    match command {
        cli::Command::Get => println!("{}", client::get()?),
        cli::Command::Poke => println!("{}", client::poke()?),
        cli::Command::Set { percentage } => println!("{}", client::set(percentage)?),
        cli::Command::Increment { percentage } => println!("{}", client::increment(percentage)?),
        cli::Command::Decrement { percentage } => println!("{}", client::decrement(percentage)?),
        cli::Command::Watch => client::watch()?,
        cli::Command::Daemon => daemon::run()?,
        cli::Command::Completion { shell } => cli::generate_completions(shell),
    }
    Ok(())
}
