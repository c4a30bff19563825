use std::path::PathBuf;

use ::tracing::{error, info_span};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use remote_reader::UrlSigner;
use service::Service;

mod config;
mod http_objects;
mod routes;
mod service;
mod tracing;
mod transform;
mod upload;
mod warmup;
use tracing::setup_tracing;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the remote reader path for an upstream URL
    Sign {
        #[arg(help = "Upstream URL, e.g. https://images.example.com/a.png")]
        url: String,
    },
}

fn sign(config: &config::ServerConfig, url: &str) -> Result<String> {
    let remote_reader = config
        .remote_reader
        .as_ref()
        .ok_or_else(|| anyhow!("remote_reader is not configured"))?;
    let signer = UrlSigner::new(&remote_reader.signing_keys, remote_reader.signature_bytes)?;
    Ok(format!(
        "{}{}",
        remote_reader.normalized_prefix()?,
        signer.sign(url)?
    ))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match config::ServerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading config: {:?}", err);
            std::process::exit(1);
        }
    };

    if let Some(Command::Sign { url }) = cli.command {
        match sign(&config, &url) {
            Ok(path) => println!("{}", path),
            Err(err) => {
                eprintln!("Error signing url: {:?}", err);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(err) = setup_tracing(&config) {
        eprintln!("Error setting up tracing: {:?}", err);
        std::process::exit(1);
    }

    let root_span = info_span!("imagestore", listen_addr = %config.listen_addr);
    let _guard = root_span.enter();

    let service = match Service::new(config) {
        Ok(service) => service,
        Err(err) => {
            error!("Error creating service: {:?}", err);
            return;
        }
    };
    if let Err(err) = service.start().await {
        error!("Error starting service: {:?}", err);
    }
}
