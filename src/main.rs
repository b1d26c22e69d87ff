//! news-harvest main entry point
//!
//! This is the command-line interface for the news harvester.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use news_harvest::config::{load_categories, load_settings_or_default, validate, Settings};
use news_harvest::output::{load_statistics, print_outcome, print_statistics};
use news_harvest::storage::StoreLayout;
use news_harvest::{ConfigError, HarvestService, Job, RunContext};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit status for store I/O and other runtime failures
const EXIT_RUNTIME: u8 = 1;

/// Exit status for invalid settings or categories
const EXIT_CONFIG: u8 = 2;

/// Exit status for a run stopped early; its progress is checkpointed
const EXIT_INTERRUPTED: u8 = 3;

/// news-harvest: quota-driven news URL collection and article extraction
///
/// URLs are collected per category from the seed pages listed in the
/// categories file until each category reaches its quota, then article
/// content is extracted from every collected URL. Both phases can be
/// interrupted and resumed.
#[derive(Parser, Debug)]
#[command(name = "news-harvest")]
#[command(version)]
#[command(about = "Quota-driven news URL collection and article extraction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML settings file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the categories JSON file
    #[arg(long, global = true, value_name = "FILE")]
    categories_file: Option<PathBuf>,

    /// Root directory for URL stores, checkpoint and articles
    #[arg(long, global = true, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Restrict the run to this category (repeatable)
    #[arg(long = "category", global = true, value_name = "NAME")]
    categories: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the categories file and create the per-category stores
    Sync,

    /// Collect article URLs for every category
    Crawl(CrawlArgs),

    /// Extract articles from the collected URLs
    Extract(ExtractArgs),

    /// Crawl, then extract
    All {
        #[command(flatten)]
        crawl: CrawlArgs,

        #[command(flatten)]
        extract: ExtractArgs,
    },

    /// Show per-category URL and extraction statistics
    Stats,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Target number of unique URLs per category
    #[arg(long, value_name = "N")]
    urls_per_category: Option<usize>,

    /// Size of the crawl worker pool
    #[arg(long, value_name = "N")]
    max_workers: Option<usize>,

    /// Minimum URLs each source contributes per sweep
    #[arg(long, value_name = "N")]
    min_urls_per_source: Option<usize>,

    /// Count URLs already collected toward the quota
    #[arg(long)]
    resume: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Size of the extraction worker pool
    #[arg(long, value_name = "N")]
    extract_workers: Option<usize>,

    /// Retries allowed for a transiently failing URL
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Forget all extraction progress and reprocess every URL
    #[arg(long)]
    reset_checkpoint: bool,
}

impl CrawlArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(n) = self.urls_per_category {
            settings.crawler.urls_per_category = n;
        }
        if let Some(n) = self.max_workers {
            settings.crawler.max_workers = n;
        }
        if let Some(n) = self.min_urls_per_source {
            settings.crawler.min_urls_per_source = n;
        }
    }
}

impl ExtractArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(n) = self.extract_workers {
            settings.extractor.workers = n;
        }
        if let Some(n) = self.max_retries {
            settings.extractor.max_retries = n;
        }
    }
}

impl Command {
    fn apply(&self, settings: &mut Settings) {
        match self {
            Command::Crawl(crawl) => crawl.apply(settings),
            Command::Extract(extract) => extract.apply(settings),
            Command::All { crawl, extract } => {
                crawl.apply(settings);
                extract.apply(settings);
            }
            Command::Sync | Command::Stats => {}
        }
    }

    fn job(&self) -> Option<Job> {
        match self {
            Command::Sync => Some(Job::Sync),
            Command::Crawl(crawl) => Some(Job::Crawl {
                resume: crawl.resume,
            }),
            Command::Extract(extract) => Some(Job::Extract {
                reset_checkpoint: extract.reset_checkpoint,
            }),
            Command::All { crawl, extract } => Some(Job::All {
                resume: crawl.resume,
                reset_checkpoint: extract.reset_checkpoint,
            }),
            Command::Stats => None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            if is_config_error(&e) {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::from(EXIT_RUNTIME)
            }
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG`, when set, takes precedence over the flags.
fn setup_logging(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "news_harvest=info,warn",
            1 => "news_harvest=debug,info",
            2 => "news_harvest=trace,debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn is_config_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<ConfigError>())
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings = load_settings_or_default(cli.config.as_deref()).with_context(|| {
        format!(
            "Failed to load settings from {}",
            cli.config
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "defaults".to_string())
        )
    })?;
    cli.command.apply(&mut settings);
    validate(&settings).context("Invalid settings")?;

    let categories_file = cli
        .categories_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.output.categories_file));
    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.output.directory));

    let categories = load_categories(&categories_file, &settings)
        .with_context(|| format!("Failed to load categories from {}", categories_file.display()))?
        .select(&cli.categories)
        .context("Invalid --category filter")?;

    tracing::info!(
        file = %categories_file.display(),
        categories = categories.categories.len(),
        hash = %categories.hash,
        "Categories loaded"
    );

    let context = RunContext::open(settings, categories, StoreLayout::new(&output_dir))
        .with_context(|| format!("Failed to open stores under {}", output_dir.display()))?;

    let Some(job) = cli.command.job() else {
        let stats = load_statistics(
            context.urls.as_ref(),
            context.checkpoint.as_ref(),
            context.articles.as_ref(),
            &context.category_names(),
        )
        .context("Failed to read statistics")?;
        print_statistics(&stats);
        return Ok(ExitCode::SUCCESS);
    };

    let service = Arc::new(HarvestService::new(context));
    service.start(job)?;

    let interrupt = Arc::clone(&service);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight work before exiting");
            interrupt.stop();
        }
    });

    let outcome = service
        .wait()
        .await
        .with_context(|| format!("{} failed", job.name()))?;
    print_outcome(&outcome);

    if outcome.interrupted {
        Ok(ExitCode::from(EXIT_INTERRUPTED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
