//! Ledger command-line tool
//!
//! ```text
//! ledger recover
//! ledger provision <account> <balance>
//! ledger transfer <source> <destination> <amount> [id]
//! ledger balances
//! ```
//!
//! Reads configuration from the TOML file named by `LEDGER_CONFIG`, or from
//! `LEDGER_*` environment variables otherwise.

use anyhow::{bail, Context};
use durable_ledger::{
    spawn_ledger_actor, AccountId, CheckpointStore, Config, Ledger, LedgerEntry, SnapshotStore,
};
use uuid::Uuid;

const USAGE: &str = "usage: ledger <recover | provision <account> <balance> | \
transfer <source> <destination> <amount> [id] | balances>";

fn load_config() -> anyhow::Result<Config> {
    match std::env::var("LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {path}")),
        Err(_) => Ok(Config::from_env()?),
    }
}

fn parse_amount(raw: &str) -> anyhow::Result<u64> {
    raw.parse()
        .with_context(|| format!("invalid amount {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config()?;

    // Provisioning happens before bootstrap so a fresh ledger can be seeded.
    if let [command, account, balance] = args.as_slice() {
        if command == "provision" {
            let snapshots = SnapshotStore::new(&config.storage.snapshot_dir);
            let checkpoint = CheckpointStore::new(&config.storage.checkpoint_path).read()?;
            snapshots.provision(&AccountId::new(account.as_str()), parse_amount(balance)?, checkpoint)?;
            println!("provisioned {account} with {balance}");
            return Ok(());
        }
    }

    let ledger = Ledger::open(config).context("opening ledger")?;
    tracing::info!(checkpoint = ledger.checkpoint(), "Ledger opened");
    let handle = spawn_ledger_actor(ledger)?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["recover"] => {
            let cycle = handle.recover().await?;
            println!("checkpoint {}", cycle.committed_lsn);
        }
        ["transfer", source, destination, amount, rest @ ..] => {
            let id = match rest {
                [] => Uuid::now_v7().to_string(),
                [id] => id.to_string(),
                _ => bail!(USAGE),
            };
            let entry = LedgerEntry::new(id.clone(), *source, *destination, parse_amount(amount)?);
            let receipt = handle.submit(entry).await?;
            println!("{id}: {:?}, checkpoint {}", receipt.outcome, receipt.lsn);
        }
        ["balances"] => {
            for (account, balance) in handle.balances().await?.iter() {
                println!("{account}\t{balance}");
            }
        }
        _ => bail!(USAGE),
    }

    handle.shutdown().await?;
    Ok(())
}
