//! Generate a manga from the command line and write it to a directory
//! Run with: cargo run --release --bin generate_manga -- "a premise" --pages 2

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use manga_studio::{
    core::{Config, GenerationRequest, MangaDocument, MangaStyle},
    orchestration::{ChannelSink, GenerationEvent, GenerationOrchestrator},
    services::{gemini::random_premise, ApiClient},
    utils::{sanitize_file_stem, save_payload_as_png_async, Metrics},
};

#[derive(Parser, Debug)]
#[command(name = "generate_manga", version)]
struct Cli {
    /// Story premise.
    premise: Option<String>,

    /// Use a random built-in premise instead.
    #[arg(long, conflicts_with = "premise")]
    surprise: bool,

    /// Art style (shonen, shojo, seinen, chibi).
    #[arg(long, default_value_t = MangaStyle::Shonen)]
    style: MangaStyle,

    /// Number of pages, clamped to 1..=5.
    #[arg(long)]
    pages: Option<u32>,

    /// Output directory.
    #[arg(long, default_value = "manga_out")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter()))
        .with_target(false)
        .init();

    let premise = if cli.surprise {
        random_premise().to_string()
    } else {
        cli.premise
            .clone()
            .filter(|p| !p.trim().is_empty())
            .context("Provide a premise or pass --surprise")?
    };
    let request = GenerationRequest::new(
        premise,
        cli.style,
        cli.pages.unwrap_or_else(|| config.default_page_count()),
    );
    info!("Premise: {}", request.premise);
    info!("Style: {} | Pages: {}", request.style, request.page_count);

    let metrics = Metrics::new();
    let api_client = Arc::new(ApiClient::new(config.clone(), None, Some(metrics.clone()))?);
    let orchestrator =
        GenerationOrchestrator::new(api_client, config.call_timeout(), Some(metrics.clone()));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    // Progress printer; hands back the last snapshot it saw
    let (sink, mut rx) = ChannelSink::new();
    let printer = tokio::spawn(async move {
        let mut latest: Option<MangaDocument> = None;
        while let Some(event) = rx.recv().await {
            match event {
                GenerationEvent::Progress { label } => info!("{}", label),
                GenerationEvent::Document { document } => latest = Some(document),
                GenerationEvent::Error { stage, message } => warn!("[{}] {}", stage, message),
                GenerationEvent::Complete { document } => latest = Some(document),
            }
        }
        latest
    });

    let result = orchestrator.generate(&request, &sink, &cancel).await;
    drop(sink);
    let latest = printer.await.context("Progress printer task failed")?;

    let snapshot = metrics.snapshot();
    info!(
        "API calls: {} ({} failed), tokens in/out: {}/{}",
        snapshot.api_calls_total,
        snapshot.api_calls_failed,
        snapshot.api_tokens_input,
        snapshot.api_tokens_output
    );

    match result {
        Ok(document) => {
            write_output(&document, &cli.out).await?;
            info!("✓ Wrote \"{}\" to {}", document.title, cli.out.display());
            Ok(())
        }
        Err(e) => {
            if let Some(partial) = latest {
                write_output(&partial, &cli.out).await?;
                warn!(
                    "Saved partial result ({} of {} panels) to {}",
                    partial.illustrated_panels(),
                    partial.total_panels(),
                    cli.out.display()
                );
            }
            Err(e.into())
        }
    }
}

async fn write_output(document: &MangaDocument, out: &Path) -> Result<()> {
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("create output dir '{}'", out.display()))?;

    let json = serde_json::to_string_pretty(document)?;
    tokio::fs::write(out.join("manga.json"), json)
        .await
        .context("write manga.json")?;

    for (i, character) in document.characters.iter().enumerate() {
        if let Some(ref image) = character.reference_image {
            save_payload_as_png_async(image, &out.join(format!("character_{}.png", i + 1))).await?;
        }
    }

    for (page, panel) in document.panels_in_order() {
        if let Some(ref image) = panel.image_url {
            let name = format!(
                "page_{}_panel_{}.png",
                page.page_number,
                sanitize_file_stem(&panel.id)
            );
            save_payload_as_png_async(image, &out.join(name)).await?;
        }
    }

    Ok(())
}
