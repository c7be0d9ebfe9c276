// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{collections::HashSet, process, str::FromStr, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use tokenlists_core::{
    block_on,
    collectors::providers,
    config::parse_url_list,
    db::ConnectionPool,
    export::export_list,
    image_store::ImageModeSetting,
    protocols::eth::ChainId,
    CoreResources, CoreResourcesI, Orchestrator, Settings,
};

/// Token list collector
///
/// Collects token metadata and images from the built-in providers into a SQLite database.
/// Settings are read from the environment and `.env`, flags take precedence.
#[derive(Debug, Parser)]
#[command(name = "tokenlists", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the collectors
    Collect(CollectArgs),
    /// Apply pending database migrations
    Migrate,
    /// Insert the built-in providers and the default list order
    Seed,
    /// Print the stored tokens of a chain as a token list
    Export {
        #[arg(long)]
        chain_id: u64,
        /// Only export this token address
        #[arg(long)]
        token: Option<String>,
    },
}

#[derive(Debug, Args)]
struct CollectArgs {
    /// Provider keys to collect, all providers if omitted
    #[arg(long, value_delimiter = ',')]
    providers: Vec<String>,
    /// Image mode: save, link or mixed
    #[arg(long)]
    mode: Option<String>,
    /// IPFS gateways, comma separated
    #[arg(long)]
    ipfs: Option<String>,
    /// Ethereum RPC urls, comma separated
    #[arg(long)]
    rpc1: Option<String>,
    /// PulseChain RPC urls, comma separated
    #[arg(long)]
    rpc369: Option<String>,
    /// BNB Smart Chain RPC urls, comma separated
    #[arg(long)]
    rpc56: Option<String>,
}

impl CollectArgs {
    fn apply(&self, settings: &mut Settings) -> Result<()> {
        if let Some(mode) = self.mode.as_deref() {
            settings.image_mode = ImageModeSetting::from_str(mode)
                .with_context(|| format!("Invalid image mode '{mode}'"))?;
        }
        if let Some(ipfs) = self.ipfs.as_deref() {
            settings.ipfs_gateways = parse_url_list(ipfs)?;
        }
        let rpcs = [
            (ChainId::ETH_MAINNET, &self.rpc1),
            (ChainId::PULSECHAIN, &self.rpc369),
            (ChainId::BSC, &self.rpc56),
        ];
        for (chain_id, urls) in rpcs {
            if let Some(urls) = urls.as_deref() {
                settings
                    .rpc_overrides
                    .insert(chain_id, parse_url_list(urls)?);
            }
        }
        Ok(())
    }
}

fn main() {
    dotenv().ok();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env()?;
    match cli.command {
        Command::Collect(args) => {
            args.apply(&mut settings)?;
            let keys: HashSet<String> = args.providers.into_iter().collect();
            collect(settings, keys)
        }
        Command::Migrate => {
            let pool = ConnectionPool::new(&settings.database_url)?;
            pool.run_migrations()?;
            log::info!("Migrated {}", settings.database_url);
            Ok(())
        }
        Command::Seed => {
            let pool = ConnectionPool::new(&settings.database_url)?;
            pool.run_migrations()?;
            providers::seed(&pool)?;
            Ok(())
        }
        Command::Export { chain_id, token } => {
            let pool = ConnectionPool::new(&settings.database_url)?;
            let list = export_list(
                &pool,
                &settings.root_uri,
                ChainId::new(chain_id),
                token.as_deref(),
            )?;
            println!("{}", serde_json::to_string_pretty(&list)?);
            Ok(())
        }
    }
}

fn collect(settings: Settings, keys: HashSet<String>) -> Result<()> {
    let resources = CoreResources::from_settings(settings)?;
    resources.connection_pool().run_migrations()?;
    let orchestrator = Orchestrator::builtin(Arc::new(resources));

    let report = block_on(orchestrator.collect(&keys))?;
    for summary in report.summaries.iter() {
        log::info!(
            "{}: {} lists, {} tokens stored, {} skipped, {} failed",
            summary.provider_key,
            summary.lists,
            summary.stored,
            summary.skipped,
            summary.failed
        );
    }
    if !report.is_success() {
        log::warn!(
            "Collectors failed: {}",
            report.failed_collectors.join(", ")
        );
    }
    Ok(())
}
