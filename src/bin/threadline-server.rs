// ABOUTME: Threadline server binary: loads configuration, initializes logging and serves HTTP
// ABOUTME: Command-line flags override the port and database location from the environment
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Threadline Authors

//! # Threadline Server Binary

use anyhow::Result;
use clap::Parser;
use threadline::{
    config::{DatabaseUrl, ServerConfig},
    logging,
    server::Server,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "threadline-server")]
#[command(about = "Threadline - streaming chat conversations with shareable read-only links")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override database URL (`sqlite:path` or `sqlite::memory:`)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if let Some(ref database_url) = args.database_url {
        config.database.url = DatabaseUrl::parse_url(database_url);
    }

    info!("Starting Threadline server");
    info!("{}", config.summary());

    Server::new(config).run().await
}
