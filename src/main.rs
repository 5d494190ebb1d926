use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use smartlens::config::{self, PipelineLimits};
use smartlens::extraction::{DocumentTextExtractor, ImageTextExtractor};
use smartlens::ingestion::validate::{DocumentKind, classify_media_type};
use smartlens::ingestion::{Collaborators, IngestionService};
use smartlens::llm::{GeminiClient, TextGenerator, VisionExtractor};
use smartlens::ocr::{OcrEngine, TesseractEngine};
use smartlens::store::SupabaseClient;
use smartlens::{api, logging};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "smartlens",
    about = "Turn photographed or scanned documents into analyzed notes"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Port to bind; overrides SERVER_PORT.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Extract text from a local image or PDF and print it.
    Extract {
        /// File to read.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing();
    config::init_config().context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(port).await,
        Command::Extract { path } => extract(&path).await,
    }
}

async fn serve(port_override: Option<u16>) -> Result<()> {
    let config = config::get_config();
    let gemini = GeminiClient::from_config(config)?.map(Arc::new);
    if gemini.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; vision fallback and analysis are disabled");
    }
    let (supabase_url, service_key) = config.supabase_credentials()?;
    let supabase = Arc::new(SupabaseClient::new(
        supabase_url,
        service_key,
        config.storage_bucket.clone(),
    )?);

    let collaborators = Collaborators {
        ocr: Arc::new(TesseractEngine::from_config(config)),
        vision: gemini
            .clone()
            .map(|client| client as Arc<dyn VisionExtractor>),
        generator: gemini.map(|client| client as Arc<dyn TextGenerator>),
        notes: supabase.clone(),
        assets: supabase,
    };
    let service = IngestionService::new(collaborators, PipelineLimits::default());
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener(port_override.or(config.server_port))
        .await
        .context("Failed to bind listener")?;
    tracing::info!(port, "Listening on http://0.0.0.0:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn extract(path: &Path) -> Result<()> {
    let config = config::get_config();
    let media_type = media_type_for(path)?;
    let kind = classify_media_type(media_type)
        .with_context(|| format!("Unsupported file type: {}", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let vision = GeminiClient::from_config(config)?
        .map(|client| Arc::new(client) as Arc<dyn VisionExtractor>);
    let result = match kind {
        DocumentKind::Image => {
            let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractEngine::from_config(config));
            ImageTextExtractor::new(ocr, vision)
                .extract(&bytes, media_type)
                .await?
        }
        DocumentKind::Pdf => DocumentTextExtractor::new(vision).extract(&bytes).await?,
    };

    tracing::info!(
        source = result.source.as_str(),
        confidence = ?result.confidence,
        chars = result.char_len(),
        "Extraction finished"
    );
    println!("{}", result.text);
    Ok(())
}

fn media_type_for(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "pdf" => Ok("application/pdf"),
        other => bail!("Unsupported file extension: {other:?}"),
    }
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
