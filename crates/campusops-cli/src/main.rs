//! CLI entry point for the CampusOps retrieval core (for ops and testing).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use campusops_rag::{
    app_data_dir, chunk_documents, load_config, load_config_from, load_documents, render_context,
    set_docs_folder, watch_docs, BuildReport, Config, RagError, RagService,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "campusops")]
#[command(about = "CampusOps: reference-document retrieval for report generation")]
struct Cli {
    /// Config file to use instead of the one in the app data directory.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show resolved settings and whether an index is loaded.
    Status,
    /// Show where config, index and metadata are stored (app data directory).
    DataDir,
    /// Remember a docs folder in the config file.
    SetDocs {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// List the documents a build would read, with their chunk counts.
    Scan {
        /// Folder to scan; defaults to the configured docs folder.
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
    /// Rebuild the index from the docs folder.
    Build,
    /// Retrieve the chunks closest to a query.
    Query {
        #[arg(value_name = "TEXT")]
        text: String,
        #[arg(short = 'k', long, default_value_t = 3)]
        top_k: usize,
        /// Build first if no index exists yet.
        #[arg(long)]
        build_if_missing: bool,
    },
    /// Build, then rebuild whenever the docs folder changes (Ctrl+C to stop).
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config(),
    };

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => status(&config).await?,
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        },
        Commands::SetDocs { path } => {
            let path = set_docs_folder(&path, cli.config.as_deref())?;
            println!("Docs folder set to {}", path.display());
        }
        Commands::Scan { path } => {
            let folder = match path {
                Some(p) => p,
                None => config.docs_folder()?,
            };
            scan(&config, &folder)?;
        }
        Commands::Build => {
            let service = RagService::from_config(&config)?;
            let report = service.build().await?;
            if report.chunks == 0 {
                println!("No chunks found in {} document(s); index left unchanged.", report.documents);
            } else {
                println!("Indexed {} chunk(s) from {} document(s).", report.chunks, report.documents);
            }
        }
        Commands::Query {
            text,
            top_k,
            build_if_missing,
        } => {
            let service = RagService::from_config(&config)?;
            if build_if_missing {
                if let Some(report) = service.ensure_built().await? {
                    info!(chunks = report.chunks, "built missing index");
                }
            }
            let hits = service.retrieve(&text, top_k).await?;
            if hits.is_empty() {
                println!("No results.");
            } else {
                print!("{}", render_context(&hits));
            }
        }
        Commands::Watch => watch(&config).await?,
    }
    Ok(())
}

async fn status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let service = RagService::from_config(config)?;
    let settings = service.settings();
    println!("CampusOps retrieval core");
    match &settings.docs_folder {
        Some(p) => println!("  docs folder: {}", p.display()),
        None => println!("  docs folder: (not set)"),
    }
    println!("  index:       {}", settings.index_path.display());
    println!("  metadata:    {}", settings.metadata_path.display());
    println!(
        "  chunking:    {} words, {} overlap",
        settings.chunk_params.chunk_size(),
        settings.chunk_params.overlap()
    );
    println!("  embeddings:  {:?} / {}", config.embedding.provider, service.embedding_model());
    if service.is_built().await {
        println!("  indexed:     {} chunk(s)", service.len().await);
    } else {
        println!("  indexed:     no (run `campusops build`)");
    }
    Ok(())
}

fn scan(config: &Config, folder: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let params = config.chunk_params()?;
    let docs = load_documents(folder, &config.extensions)?;
    println!("Scanned {} document(s) under {}", docs.len(), folder.display());
    for doc in &docs {
        let chunks = chunk_documents(std::slice::from_ref(doc), params).len();
        let preview: String = doc.text.chars().take(60).collect();
        let ellipsis = if doc.text.chars().count() > 60 { "..." } else { "" };
        println!("  {}  [{} chunk(s)]  {}{}", doc.filename, chunks, preview, ellipsis);
    }
    Ok(())
}

async fn watch(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let service = Arc::new(RagService::from_config(config)?);
    let folder = config.docs_folder()?;
    report_build(service.build().await);

    let handle = tokio::runtime::Handle::current();
    let watched = service.clone();
    let _watcher = watch_docs(&folder, &config.extensions, move || {
        report_build(handle.block_on(watched.build()));
    })?;
    println!("Watching {} (Ctrl+C to stop)", folder.display());
    tokio::signal::ctrl_c().await?;
    Ok(())
}

fn report_build(result: Result<BuildReport, RagError>) {
    match result {
        Ok(r) if r.chunks == 0 => warn!(documents = r.documents, "no chunks; index left unchanged"),
        Ok(r) => info!(chunks = r.chunks, documents = r.documents, "index rebuilt"),
        Err(RagError::BuildInProgress) => info!("build already running; skipped"),
        Err(e) => warn!(error = %e, "rebuild failed"),
    }
}
