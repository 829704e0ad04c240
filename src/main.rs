use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Context;
use bocm_watch::bulletin::{parse_ymd, ymd};
use bocm_watch::config::Settings;
use bocm_watch::detector::ChangeDetector;
use bocm_watch::documents::{DocumentDownloader, ExportRecord};
use bocm_watch::knowledge::{open_store, KnowledgeStore};
use bocm_watch::pdf::{PdfTextExtractor, TextExtractor};
use bocm_watch::processor::{truncate, DayOutcome, DayProcessor, DayReport};
use bocm_watch::reconcile::{Reconciler, Verdict};
use bocm_watch::resolver::SummaryLocator;
use bocm_watch::transport::{HttpTransport, Transport};
use bocm_watch::{ingest, BocmError};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "bocm_watch", about = "Collective agreement change watcher for the BOCM")]
struct Cli {
    /// Also append plain log lines to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Knowledge base file (.json, .sqlite or .db), overrides settings
    #[arg(long, global = true)]
    knowledge: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct DayOpts {
    /// Download flagged documents, verify them and print the export JSON
    #[arg(long)]
    download: bool,
    /// Print the day report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process today's bulletin
    Today {
        #[command(flatten)]
        opts: DayOpts,
    },
    /// Process the bulletin of one date (YYYYMMDD)
    Date {
        date: String,
        #[command(flatten)]
        opts: DayOpts,
    },
    /// Process every date in a range, oldest first
    Range {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[command(flatten)]
        opts: DayOpts,
    },
    /// Only find the summary URL for a date
    Resolve { date: String },
    /// Build or refresh the knowledge base from a folder of reference PDFs
    Ingest { dir: PathBuf },
    /// Show the knowledge base
    Kb {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let t0 = Instant::now();
    let mut settings = Settings::load().context("loading settings")?;
    if let Some(path) = cli.knowledge {
        settings.knowledge_path = path;
    }

    let result = match cli.command {
        Commands::Today { opts } => {
            let today = chrono::Local::now().date_naive();
            run_days(&settings, &[today], opts).await
        }
        Commands::Date { date, opts } => {
            let date = parse_ymd(&date)?;
            run_days(&settings, &[date], opts).await
        }
        Commands::Range { from, to, opts } => {
            let (from, to) = (parse_ymd(&from)?, parse_ymd(&to)?);
            if from > to {
                anyhow::bail!("--from {} is after --to {}", ymd(from), ymd(to));
            }
            let dates: Vec<NaiveDate> = from.iter_days().take_while(|d| *d <= to).collect();
            run_days(&settings, &dates, opts).await
        }
        Commands::Resolve { date } => {
            let date = parse_ymd(&date)?;
            let pipeline = Pipeline::new(&settings)?;
            match pipeline.locator.locate(date).await {
                Ok(url) => println!("{url}"),
                Err(BocmError::NotFound { .. }) => println!("No bulletin published for {}", ymd(date)),
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        Commands::Ingest { dir } => {
            let mut store = open_store(&settings.knowledge_path)
                .with_context(|| format!("opening {}", settings.knowledge_path.display()))?;
            let stats = ingest::ingest_dir(&dir, &PdfTextExtractor, store.as_mut(), true)?;
            if stats.files == 0 {
                println!("No reference PDFs in {}.", dir.display());
            } else {
                println!(
                    "Ingested {} of {} files ({} without code, {} without entity, {} unreadable).",
                    stats.stored, stats.files, stats.no_code, stats.no_entity, stats.unreadable
                );
            }
            Ok(())
        }
        Commands::Kb { limit } => {
            let store = open_store(&settings.knowledge_path)
                .with_context(|| format!("opening {}", settings.knowledge_path.display()))?;
            print_knowledge(store.as_ref(), limit)
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

/// Everything a day run needs, built once per invocation.
struct Pipeline {
    transport: Arc<dyn Transport>,
    locator: SummaryLocator,
    processor: DayProcessor,
    downloader: DocumentDownloader,
    download_timeout: std::time::Duration,
}

impl Pipeline {
    fn new(settings: &Settings) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(
            HttpTransport::new(&settings.user_agent, settings.max_workers)
                .context("building HTTP client")?,
        );
        let extractor: Arc<dyn TextExtractor> = Arc::new(PdfTextExtractor);
        let reconciler = Reconciler::new(settings.stale_after_days);

        Ok(Self {
            locator: SummaryLocator::new(
                Box::new(settings.conventions()),
                Arc::clone(&transport),
                settings.resolver_options(),
            ),
            processor: DayProcessor::new(
                ChangeDetector::new(&settings.base_url),
                reconciler.clone(),
                Arc::clone(&extractor),
            ),
            downloader: DocumentDownloader::new(
                Arc::clone(&transport),
                extractor,
                reconciler,
                &settings.documents_dir,
                settings.download_timeout(),
            )
            .with_source_id(settings.source_id),
            download_timeout: settings.download_timeout(),
            transport,
        })
    }

    async fn run_day(
        &self,
        date: NaiveDate,
        store: &mut dyn KnowledgeStore,
        download: bool,
    ) -> anyhow::Result<(DayOutcome, Vec<ExportRecord>)> {
        let outcome = self
            .processor
            .run_date(&self.locator, self.transport.as_ref(), self.download_timeout, date, store)
            .await?;

        let mut exports = Vec::new();
        if download && outcome.eligible().next().is_some() {
            let results = self.downloader.process_day(&outcome, store).await?;
            exports.extend(results.into_iter().map(|r| r.export));
        }
        Ok((outcome, exports))
    }
}

async fn run_days(settings: &Settings, dates: &[NaiveDate], opts: DayOpts) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(settings)?;
    let mut store = open_store(&settings.knowledge_path)
        .with_context(|| format!("opening {}", settings.knowledge_path.display()))?;

    let pb = if dates.len() > 1 {
        let pb = ProgressBar::new(dates.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut reports: Vec<DayReport> = Vec::new();
    let mut exports: Vec<ExportRecord> = Vec::new();
    let mut failed = 0usize;

    for &date in dates {
        pb.set_message(ymd(date));
        match pipeline.run_day(date, store.as_mut(), opts.download).await {
            Ok((outcome, day_exports)) => {
                if !opts.json {
                    pb.suspend(|| print_report(&outcome.report));
                }
                reports.push(outcome.report);
                exports.extend(day_exports);
            }
            // One bad date must not stop a range.
            Err(e) if dates.len() > 1 => {
                error!(date = %date, error = %e, "day failed");
                failed += 1;
            }
            Err(e) => return Err(e),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if opts.json {
        if reports.len() == 1 {
            println!("{}", serde_json::to_string_pretty(&reports[0])?);
        } else {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }
    if opts.download {
        println!("\n=== JSON ===");
        println!("{}", serde_json::to_string(&exports)?);
        println!("{} agreements exported.", exports.len());
    }
    if dates.len() > 1 {
        let changed: usize = reports.iter().map(|r| r.convenios_con_cambios).sum();
        info!(days = dates.len(), failed, changed, "range finished");
        if !opts.json {
            println!(
                "\n{} days, {} with a bulletin, {} agreements with changes, {} failed.",
                dates.len(),
                reports.iter().filter(|r| r.sumario.is_some()).count(),
                changed,
                failed
            );
        }
    }
    Ok(())
}

fn print_report(report: &DayReport) {
    if report.sumario.is_none() {
        println!("{}: no bulletin.", report.fecha);
        return;
    }
    println!(
        "{}: {} agreements in summary, {} with changes",
        report.fecha, report.convenios_detectados, report.convenios_con_cambios
    );
    for (i, d) in report.detalles.iter().enumerate() {
        let estado = match d.estado {
            Verdict::New => "NEW".to_string(),
            Verdict::Changed => format!(
                "CHANGED from {}",
                d.codigo_anterior.as_deref().unwrap_or("-")
            ),
            Verdict::Unchanged { suspect: true } => "unchanged (review)".to_string(),
            Verdict::Unchanged { suspect: false } => "unchanged".to_string(),
        };
        let doc = d.documento.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:>3} | doc {:>4} | {} | {:<24} | {:<22} | {}{}",
            i + 1,
            doc,
            d.codigo,
            truncate(d.empresa.as_deref().unwrap_or("-"), 24),
            d.tipo_cambio,
            estado,
            if d.revisar { " *" } else { "" }
        );
        println!("      {}", d.descripcion);
    }
}

fn print_knowledge(store: &dyn KnowledgeStore, limit: usize) -> anyhow::Result<()> {
    let entries = store.entries()?;
    if entries.is_empty() {
        println!("Knowledge base is empty. Run 'ingest' or process some dates first.");
        return Ok(());
    }

    println!(
        "{:>4} | {:<40} | {:<14} | {:<8} | {:<22}",
        "#", "Entity", "Code", "Seen", "File"
    );
    println!("{}", "-".repeat(100));
    for (i, (entity, rec)) in entries.iter().take(limit).enumerate() {
        println!(
            "{:>4} | {:<40} | {:<14} | {:<8} | {:<22}",
            i + 1,
            truncate(entity, 40),
            rec.code,
            ymd(rec.last_seen),
            truncate(&rec.source_file, 22)
        );
    }
    println!("\n{} of {} entities", entries.len().min(limit), entries.len());
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
