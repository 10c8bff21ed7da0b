use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use docsift_core::{
    run_pool, DocumentQueue, ExtractionConfig, Extractor, Language, MemoryQueue, ScanTask, User,
};

#[derive(Parser)]
#[command(name = "docsift")]
#[command(about = "Extract canonical, language-tagged document records from files and directory trees")]
struct Args {
    /// Path to custom config file (YAML format)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Route images through OCR (overrides config)
    #[arg(long, global = true)]
    ocr: bool,

    /// OCR language hint: ENGLISH, SPANISH, FRENCH, GERMAN (overrides config)
    #[arg(long, global = true)]
    language: Option<Language>,

    /// Log per-step timings for every document
    #[arg(long, global = true)]
    profile: bool,

    /// Path to JRE directory (for JNI backend), defaults to JAVA_HOME
    #[arg(long, global = true)]
    jre_path: Option<PathBuf>,

    /// Path to Tika helper JAR file (for JNI backend)
    #[arg(long, global = true)]
    jar_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract one file and print its Document as JSON
    Extract {
        file: PathBuf,

        /// Also print the links found in the document
        #[arg(long)]
        links: bool,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Scan a user's directory into their queue and extract every file
    Scan {
        /// Base directory; the scan root is <base>/<user path>
        base: PathBuf,

        /// User id owning the scan and the queue
        #[arg(short, long)]
        user: String,

        /// Directory under the base, defaults to the user id
        #[arg(long)]
        user_path: Option<PathBuf>,

        /// Extraction worker threads (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Write Documents as JSON lines to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let result = match args.command {
        Command::Extract {
            file,
            links,
            pretty,
        } => extract(config, file, links, pretty),
        Command::Scan {
            base,
            user,
            user_path,
            workers,
            output,
        } => {
            let mut user = User::new(&user);
            if let Some(path) = user_path {
                user = user.with_path(path);
            }
            scan(config, base, user, workers, output)
        }
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    };

    // Fast exit - skip JVM shutdown sequence (finalizers, GC)
    #[cfg(feature = "jni-backend")]
    if result.is_ok() {
        std::process::exit(0);
    }

    result
}

fn load_config(args: &Args) -> Result<ExtractionConfig> {
    let mut config = ExtractionConfig::load_with_fallback(args.config.as_deref());
    match &args.config {
        Some(path) => info!("Loaded config from: {}", path),
        None => info!("Using default config"),
    }

    // Apply CLI overrides to config
    if args.ocr {
        config.ocr_enabled = true;
    }
    if let Some(language) = args.language {
        config.language = language;
    }
    if args.profile {
        config.profile = true;
    }
    if let Some(path) = &args.jre_path {
        config.tika.jre_path = Some(path.clone());
    } else if config.tika.jre_path.is_none() {
        config.tika.jre_path = std::env::var_os("JAVA_HOME")
            .filter(|home| !home.is_empty())
            .map(PathBuf::from);
    }
    if let Some(path) = &args.jar_path {
        config.tika.jar_path = Some(path.clone());
    }

    config.validate()?;
    Ok(config)
}

fn extract(config: ExtractionConfig, file: PathBuf, links: bool, pretty: bool) -> Result<()> {
    let extractor = Extractor::new(config)?;
    let extracted = extractor
        .extract_file_with_links(&file)
        .with_context(|| format!("extracting {}", file.display()))?;

    let value = if links {
        serde_json::json!({
            "document": extracted.document,
            "links": extracted.links,
        })
    } else {
        serde_json::to_value(&extracted.document)?
    };

    let json = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    println!("{json}");
    Ok(())
}

fn scan(
    config: ExtractionConfig,
    base: PathBuf,
    user: User,
    workers: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let workers = workers.unwrap_or(config.workers);
    let queue: Arc<dyn DocumentQueue> = Arc::new(MemoryQueue::for_user(&config, &user));
    let task = ScanTask::new(&base, user, &config.scanner, Arc::clone(&queue));
    let extractor = Extractor::new(config)?;

    let sink: Box<dyn Write + Send> = match &output {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("creating output {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout()),
    };
    let sink = Mutex::new(sink);

    let (scanned, extracted) = std::thread::scope(|scope| {
        let scanner = scope.spawn(|| task.call());
        let extracted = run_pool(&extractor, queue.as_ref(), workers, |document| {
            let mut out = sink.lock();
            let written = serde_json::to_writer(&mut *out, &document)
                .map_err(anyhow::Error::from)
                .and_then(|()| writeln!(out).map_err(anyhow::Error::from));
            if let Err(e) = written {
                error!("Failed to write {}: {:#}", document.path().display(), e);
            }
        });
        let scanned = scanner
            .join()
            .map_err(|_| anyhow!("scanner thread panicked"));
        (scanned, extracted)
    });

    sink.lock().flush()?;

    let report = scanned??;
    let totals = extracted?;
    info!(
        "Scan {} of {}: {} files enqueued, {} extracted, {} failed, {} walk errors",
        report.scan_id,
        report.root.display(),
        report.files_enqueued,
        totals.extracted,
        totals.failed,
        report.walk_errors
    );
    if let Some(path) = output {
        info!("Documents written to: {}", path.display());
    }
    Ok(())
}
