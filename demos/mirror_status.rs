// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! `drl-mirror-status`: a small operational tool that opens a local DRL
//! mirror, runs one refresh against an upstream server, and reports
//! whether a given identifier is revoked. Not part of the library's
//! public contract.

use std::path::PathBuf;

use clap::Parser;
use drl_blacklist_sync::{BlacklistOptions, CancellationToken, DefaultProvider};

#[derive(Parser)]
#[command(name = "drl-mirror-status", about = "Inspect an Italian DRL mirror")]
struct Args {
    /// Base URL of the upstream DRL service (e.g. https://get.dgc.gov.it/v1/dgc/signercertificate/).
    #[arg(long)]
    base_url: reqwest::Url,

    /// Directory the local mirror file is kept under. Defaults to the
    /// platform user-data directory.
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// UCVI to check after refreshing.
    ucvi: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut options = BlacklistOptions::default();
    if let Some(base_path) = args.base_path {
        options.base_path = base_path;
    }

    let provider = DefaultProvider::open(args.base_url, options)?;
    provider.on_download_progress(|progress| {
        println!(
            "chunk {}/{} ({:.0}%) completed={}",
            progress.last_chunk_saved,
            progress.target_chunks_count,
            progress.total_progress_percent * 100.0,
            progress.is_completed
        );
    });

    let cancel = CancellationToken::new();
    provider.refresh(&cancel).await?;

    let revoked = provider.is_revoked(&args.ucvi, &cancel).await?;
    println!("{}: revoked={}", args.ucvi, revoked);

    Ok(())
}
