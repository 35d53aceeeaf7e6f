mod cli;

use crate::cli::{Command, CLI};
use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use snip_core::OwnerId;
use snip_shortener::{BatchShortenRequest, DrainOutcome, Shortener, ShortenerService};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    snip_telemetry::init(config.log_format.into())?;

    let storage = config.storage();
    info!(
        storage = %storage,
        base_url = %config.base_url,
        log_format = %config.log_format,
        "starting snip"
    );

    let store = snip_storage::open(&storage).await?;
    let service = ShortenerService::new(store, config.shortener());

    let result = run(&service, config.owner.as_ref(), config.command.clone()).await;

    if let DrainOutcome::TimedOut { aborted } = service.shutdown(config.shutdown_grace()).await {
        warn!(aborted, "exited before every deletion was applied");
    }
    result
}

async fn run(
    shortener: &dyn Shortener,
    owner: Option<&OwnerId>,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Shorten { url } => {
            let shortened = shortener.shorten(&url, owner).await?;
            print_json(&shortened)
        }
        Command::ShortenBatch { input } => {
            let raw = read_input(input.as_deref()).await?;
            let requests: Vec<BatchShortenRequest> =
                serde_json::from_str(&raw).context("batch input is not a valid JSON array")?;
            let responses = shortener.shorten_batch(requests, owner).await?;
            print_json(&responses)
        }
        Command::Decode { key } => match shortener.decode(&key).await? {
            Some(value) => {
                println!("{value}");
                Ok(())
            }
            None => bail!("nothing is stored under {key}"),
        },
        Command::List => {
            let urls = shortener.user_urls(owner).await?;
            print_json(&urls)
        }
        Command::Delete { codes } => {
            let count = codes.len();
            shortener.delete_urls(owner, codes)?;
            info!(codes = count, "deletion accepted");
            Ok(())
        }
        Command::Ping => {
            shortener.ping().await?;
            println!("ok");
            Ok(())
        }
        Command::Stats => {
            let stats = shortener.stats().await?;
            print_json(&stats)
        }
    }
}

async fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            Ok(raw)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
