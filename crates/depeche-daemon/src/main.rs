//! `depeched`: the depeche node-to-node protocol engine, run as a
//! standalone process.
//!
//! This binary subsumes the "send a message" and "show/mint an address
//! pad" affordances the original exposes through curses and wx front
//! ends, without building a UI of its own — see `commands::send` and
//! `commands::pad`. `commands::start` is the long-running node: an
//! optional one-shot rendezvous followed by the exchange server and
//! dialer loop (Section 4.5, Section 4.6).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use depeche_daemon::commands;
use depeche_daemon::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "depeched", version, about = "depeche store-and-forward messaging node")]
struct Cli {
    /// Override the data directory (default: $DEPECHE_DATA_DIR or ~/.depeche).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the node: optionally pair with a peer, then serve exchanges.
    Start {
        /// Path to a file containing the pre-shared rendezvous secret. If
        /// given, one rendezvous attempt runs before the exchange loop
        /// starts.
        #[arg(long)]
        secret_file: Option<PathBuf>,
    },
    /// Queue a message to a known contact for the next exchange.
    Send {
        /// The contact's nickname, as given at rendezvous or in `pad`.
        to: String,
        /// Message text.
        text: String,
    },
    /// Mint a fresh address pad for a contact and print it for
    /// out-of-band delivery.
    Pad {
        /// The contact's nickname.
        to: String,
        /// How many addresses to mint.
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("depeche=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut config = DaemonConfig::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir.to_string_lossy().into_owned();
    }

    match cli.command {
        Command::Start { secret_file } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::start::run(config, secret_file))?;
        }
        Command::Send { to, text } => commands::send::run(config, &to, &text)?,
        Command::Pad { to, size } => commands::pad::run(config, &to, size)?,
    }

    Ok(())
}
