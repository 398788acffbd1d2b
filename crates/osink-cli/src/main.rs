//! 🚀 osink-cli: the front door for poking at the write path by hand.
//!
//! 🎬 *[narrator voice]* "It all started with a simple question: which index is this going to?"
//! 📦 Thin wrapper: parse args, set up logging, load config, ask the library, print the answer.
//! Like a manager. 🦆
//!
//! ```text
//! osink --config osink.toml resolve                  # configured alias, today's index
//! osink --config osink.toml resolve 'logs-%{yyyy}'   # any alias you like
//! osink check audit                                  # is it a rollover alias yet?
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use osink::AliasState;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🧭 Resolve and provision index aliases against a search cluster.
#[derive(Debug, Parser)]
#[command(name = "osink", version, about)]
struct Cli {
    /// 🔧 TOML config file. Env vars (`OSINK_*`) are read either way.
    #[arg(short, long, default_value = "osink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 📅 Provision the alias and print the concrete index name.
    Resolve {
        /// Alias expression. Defaults to `[index].index` from the config.
        alias: Option<String>,
    },
    /// 🔍 Provision the alias and print whether it is a cluster alias.
    Check {
        /// Alias expression. Defaults to `[index].index` from the config.
        alias: Option<String>,
    },
}

/// 🚀 main(): the "I pressed enter and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Run the subcommand
/// 5. Handle errors (cry, but with hints)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing, because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 🔒 A missing file is fine, env vars might be carrying the whole config
    let config_file = cli.config.as_path();
    let config_file = match config_file.try_exists().context(format!(
        "💀 Could not even check whether the config file exists. Permissions, maybe? \
         Was checking here: '{}'",
        config_file.display()
    ))? {
        true => Some(config_file),
        false => None,
    };

    let app_config = osink::load_config(config_file).context(
        "💀 In osink-cli, main, we couldn't load the configuration. Check the TOML and any \
         OSINK_* variables for typos, and that section names match ([cluster], [index], [dedup])",
    )?;

    // 🚀 SEND IT
    let result = match &cli.command {
        Command::Resolve { alias } => osink::resolve(&app_config, alias.as_deref())
            .await
            .map(|name| println!("{name}")),
        Command::Check { alias } => {
            osink::check(&app_config, alias.as_deref())
                .await
                .map(|(name, state)| match state {
                    AliasState::Known(true) => println!("{name}: alias"),
                    AliasState::Known(false) => println!("{name}: not an alias"),
                    AliasState::Unknown => println!("{name}: unknown (alias probe failed)"),
                })
        }
    };

    // 💀 Error handling: the part where we find out what went wrong
    // and print it in a way that's helpful at 3am
    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: the cluster isn't answering. Check `[cluster].url` (or \
                OSINK_CLUSTER__URL) and that OpenSearch is actually up. If it lives in \
                Docker, `docker ps` is a good first stop. ☕"
            );
        }

        // 🗑️ Exit with prejudice.
        std::process::exit(1);
    }

    Ok(())
}
