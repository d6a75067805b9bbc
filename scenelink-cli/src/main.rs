//! Interactive shell and one-shot sender for scenelink.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod shell;

use std::io;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use scenelink::{DEFAULT_HOST, DEFAULT_PORT, Sender};
use tracing_subscriber::EnvFilter;

use crate::shell::Line;

#[derive(Parser)]
#[command(
    name = "scenelink",
    version,
    about = "Drive a 3D application through its scenelink listener"
)]
struct Cli {
    #[command(flatten)]
    conn: ConnArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Where and how to reach the listener.
#[derive(Args)]
struct ConnArgs {
    /// Listener host.
    #[arg(long, global = true, env = "SCENELINK_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Listener port.
    #[arg(long, global = true, env = "SCENELINK_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Connect/read/write timeout in milliseconds.
    #[arg(long, global = true, env = "SCENELINK_TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,

    /// Name recorded as the issuer of each command.
    #[arg(long, global = true, env = "USER", default_value = "scenelink")]
    user: String,
}

#[derive(Subcommand)]
enum Command {
    /// Start the interactive shell (default).
    Shell,

    /// Send a single shell line and print the result.
    ///
    /// Example: `scenelink send create_cube 1 0 0 2`
    Send {
        /// Command word followed by its arguments.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        line: Vec<String>,
    },

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = Cli::parse().dispatch() {
        eprintln!("scenelink: {e:#}");
        std::process::exit(1);
    }
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        let sender = self.conn.sender();
        match self.command.unwrap_or(Command::Shell) {
            Command::Shell => shell::run(&sender, io::stdin().lock(), io::stdout()),
            Command::Send { line } => send(&sender, &line.join(" ")),
            Command::Completion { shell } => {
                clap_complete::generate(
                    shell,
                    &mut Self::command(),
                    "scenelink",
                    &mut io::stdout(),
                );
                Ok(())
            }
        }
    }
}

impl ConnArgs {
    fn sender(&self) -> Sender {
        Sender::new(&self.host, self.port)
            .timeout(Duration::from_millis(self.timeout_ms))
            .user(&self.user)
    }
}

fn send(sender: &Sender, line: &str) -> Result<()> {
    match shell::parse_line(line)? {
        Line::Call(call) => match call.invoke(sender)? {
            Some(value) => println!("{value}"),
            None => println!("ok"),
        },
        Line::Help => print!("{}", shell::HELP),
        Line::Empty | Line::Exit => bail!("nothing to send"),
    }
    Ok(())
}
