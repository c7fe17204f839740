//! Retro Reader CLI
//!
//! Opens local `.txt` / `.epub` files, remembering where each one was left.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retro_reader::config::Config;
use retro_reader::ingest::{
    encoding, DocumentId, EncodingChoice, FileSource, IngestPipeline, LoadGeneration, LoadOutcome,
    LocalFile,
};
use retro_reader::progress::{KeyValueStore, MemoryStore, PositionManager, SqliteStore};
use retro_reader::reader::{ReaderController, ReaderEvent, ReaderUpdate};
use retro_reader::structured::{EpubRenderer, RenderTarget, RenderedSection};

#[derive(Parser)]
#[command(name = "retro-reader", version, about = "Local plain-text and EPUB reader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a file at its saved position and print the current chapter.
    Open {
        path: PathBuf,

        /// Encoding label (`auto`, `utf-8`, `gbk`, ...); overrides READER_ENCODING.
        #[arg(long)]
        encoding: Option<String>,

        /// Jump to this chapter (1-based) and remember it.
        #[arg(long)]
        chapter: Option<usize>,
    },

    /// Print the chapter list.
    Toc {
        path: PathBuf,

        #[arg(long)]
        encoding: Option<String>,
    },

    /// Print the encoding auto-detection picks for a file.
    Detect { path: PathBuf },
}

/// Prints rendered sections to stdout
struct Stdout;

impl RenderTarget for Stdout {
    fn present(&mut self, section: RenderedSection) {
        if let Some(title) = &section.title {
            println!("== {} ==", title);
        }
        if let Some(locator) = &section.locator {
            println!("[{}]", locator);
        }
        println!("{}", section.html);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retro_reader=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    let cli = Cli::parse();
    match cli.command {
        Commands::Open {
            path,
            encoding,
            chapter,
        } => open(&config, &path, encoding.as_deref(), chapter).await,
        Commands::Toc { path, encoding } => toc(&config, &path, encoding.as_deref()).await,
        Commands::Detect { path } => detect(&config, &path).await,
    }
}

fn encoding_choice(config: &Config, flag: Option<&str>) -> anyhow::Result<EncodingChoice> {
    let label = flag.unwrap_or(&config.ingest.encoding);
    label
        .parse()
        .with_context(|| format!("invalid encoding label {:?}", label))
}

fn pipeline(config: &Config) -> IngestPipeline {
    IngestPipeline::new(LoadGeneration::new(), &config.ingest)
        .with_renderer(Arc::new(EpubRenderer::new()))
}

async fn open_store(config: &Config) -> Arc<dyn KeyValueStore> {
    let Some(url) = &config.progress.database_url else {
        tracing::info!("No database configured, positions are kept in memory");
        return Arc::new(MemoryStore::new());
    };

    match SqliteStore::connect(url).await {
        Ok(store) => {
            tracing::info!(database_url = %url, "Position store ready");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Position store unavailable, keeping positions in memory");
            Arc::new(MemoryStore::new())
        }
    }
}

async fn open_file(path: &Path) -> anyhow::Result<Arc<dyn FileSource>> {
    let file = LocalFile::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    Ok(Arc::new(file))
}

async fn open(
    config: &Config,
    path: &Path,
    encoding: Option<&str>,
    chapter: Option<usize>,
) -> anyhow::Result<()> {
    let choice = encoding_choice(config, encoding)?;
    let positions = PositionManager::new(open_store(config).await, &config.progress);
    let controller = ReaderController::new(pipeline(config), positions, choice).await;

    let source = open_file(path).await?;
    let id = DocumentId::from_name_and_size(source.name(), source.len());
    if controller
        .dispatch(ReaderEvent::AddFiles(vec![source]))
        .await?
        == ReaderUpdate::Ignored
    {
        bail!("{} is not a .txt or .epub file", path.display());
    }
    controller.dispatch(ReaderEvent::Open(id)).await?;

    if let Some(number) = chapter {
        let update = controller
            .dispatch(ReaderEvent::SelectChapter(number.saturating_sub(1)))
            .await?;
        if update == ReaderUpdate::Ignored {
            tracing::warn!(chapter = number, "No such chapter, staying put");
        }
    }

    if let Some(current) = controller.snapshot().await.current {
        let index = current.position.chapter_index;
        println!(
            "{} ({} of {}, {})",
            current.name,
            index + 1,
            current.chapters.len(),
            current.encoding.unwrap_or("EPUB")
        );
    }

    controller.render_current(&mut Stdout).await?;
    controller.dispatch(ReaderEvent::Flush).await?;
    Ok(())
}

async fn toc(config: &Config, path: &Path, encoding: Option<&str>) -> anyhow::Result<()> {
    let choice = encoding_choice(config, encoding)?;
    let source = open_file(path).await?;

    let loaded = match pipeline(config).load(source, choice).await? {
        LoadOutcome::Ready(loaded) => loaded,
        LoadOutcome::Stale => bail!("load was superseded"),
    };

    for (i, chapter) in loaded.document.chapters.iter().enumerate() {
        match chapter.locator() {
            Some(locator) if !locator.is_empty() => {
                println!("{}  -> {}", chapter.label(i), locator)
            }
            _ => println!("{}", chapter.label(i)),
        }
    }
    Ok(())
}

async fn detect(config: &Config, path: &Path) -> anyhow::Result<()> {
    let source = open_file(path).await?;
    let len = source.len().min(config.ingest.chunk_size as u64) as usize;
    let sample = source.read_range(0, len).await?;

    let resolved = encoding::resolve_encoding(&sample, EncodingChoice::Auto);
    println!("{}", resolved.name());
    Ok(())
}
