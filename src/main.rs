//! blob-uploader - upload a file to Azure Blob Storage in concurrent blocks

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use blob_uploader::config::{ConfigOptions, StorageConfig, UploadConfig, MIB};
use blob_uploader::storage::AzureBlobClient;
use blob_uploader::upload::{
    FileSource, ProgressEvent, UploadCoordinator, UploadObject, UploadStatus,
};
use blob_uploader::utils::content_type::guess_content_type;
use blob_uploader::utils::format::{format_duration, format_file_size};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "blob-uploader")]
#[command(about = "Upload a file to Azure Blob Storage in concurrent blocks")]
struct Args {
    /// Storage account name
    #[arg(long, required_unless_present = "endpoint")]
    account: Option<String>,

    /// Blob service endpoint URL, overrides --account (e.g. a local emulator)
    #[arg(long)]
    endpoint: Option<String>,

    /// Target container
    #[arg(long)]
    container: String,

    /// Shared access signature with write permission
    #[arg(long, env = "BLOB_UPLOADER_SAS_TOKEN", hide_env_values = true)]
    sas_token: String,

    /// Initial block size in MiB (2 to 16)
    #[arg(long)]
    block_size_mib: Option<u64>,

    /// Files larger than this (MiB) are uploaded in blocks
    #[arg(long)]
    chunking_threshold_mib: Option<u64>,

    /// Blocks uploaded in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Attempts per request before giving up
    #[arg(long)]
    retry_attempts: Option<u32>,

    /// Content type stored with the blob (guessed from the extension by default)
    #[arg(long)]
    content_type: Option<String>,

    /// Print progress events as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// File to upload
    file: PathBuf,
}

fn print_event(event: &ProgressEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize progress event: {}", e),
        }
        return;
    }

    match event.status {
        UploadStatus::Uploading => println!(
            "{:>3}%  {}  {} remaining",
            event.percentage,
            event.speed.as_deref().unwrap_or("-"),
            event.time_remaining.as_deref().unwrap_or("-")
        ),
        UploadStatus::Completed => println!("100%  completed"),
        UploadStatus::Failed | UploadStatus::Cancelled => println!(
            "{:>3}%  {}",
            event.percentage,
            event.error.as_deref().unwrap_or("upload did not complete")
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Progress goes to stdout, diagnostics to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let endpoint = args
        .endpoint
        .as_deref()
        .or(args.account.as_deref())
        .ok_or_else(|| anyhow!("either --account or --endpoint is required"))?;
    let storage = StorageConfig::new(endpoint, &args.container, &args.sas_token)?;
    let upload_config = UploadConfig::new(ConfigOptions {
        block_size: args.block_size_mib.map(|m| m * MIB),
        chunking_threshold: args.chunking_threshold_mib.map(|m| m * MIB),
        max_concurrent_blocks: args.concurrency,
        retry_attempts: args.retry_attempts,
        ..ConfigOptions::default()
    })?;

    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no file name", args.file.display()))?;
    let content_type = args
        .content_type
        .clone()
        .unwrap_or_else(|| guess_content_type(&args.file).to_string());
    let source = FileSource::open(&args.file).await?;
    let object = UploadObject::new(file_name, content_type, source);

    let client = Arc::new(AzureBlobClient::new(storage)?);
    let coordinator = Arc::new(UploadCoordinator::new(client, upload_config));

    let interrupt = coordinator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event, json);
        }
    });

    let result = coordinator.start(object, tx).await;
    printer.await?;

    match result {
        Ok(summary) => {
            info!(
                "Uploaded {} ({}) in {}",
                summary.blob_name,
                format_file_size(summary.object_size),
                format_duration(summary.elapsed)
            );
            Ok(())
        }
        Err(e) => {
            error!("Upload failed: {}", e);
            std::process::exit(1);
        }
    }
}
