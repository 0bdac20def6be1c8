use anyhow::{Context, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use sitemapper_core::generate::IndexReport;
use sitemapper_core::{Catalog, Generator, GeneratorConfig};
use sitemapper_validator::log::parse_rows;
use sitemapper_validator::{JobState, JobStore, ValidationService, Validator};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::server::{self, AppState};

/// Paths and flags shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Settings {
    pub catalog: PathBuf,
    pub output_dir: PathBuf,
    pub results_dir: PathBuf,
    pub quiet: bool,
}

impl Settings {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let path = |name: &str| {
            matches
                .get_one::<String>(name)
                .map(|p| expand_path(p))
                .unwrap_or_default()
        };
        Self {
            catalog: path("catalog"),
            output_dir: path("output-dir"),
            results_dir: path("results-dir"),
            quiet: matches.get_flag("quiet"),
        }
    }

    pub fn open_catalog(&self) -> anyhow::Result<Catalog> {
        if !Catalog::exists(&self.catalog) {
            bail!(
                "No catalog at {}. Run `sitemapper init` first",
                self.catalog.display()
            );
        }
        Catalog::open(&self.catalog)
            .with_context(|| format!("Failed to open catalog {}", self.catalog.display()))
    }

    pub fn generator(&self, catalog: Arc<Catalog>) -> Generator {
        Generator::new(
            catalog,
            GeneratorConfig {
                output_dir: self.output_dir.clone(),
                ..GeneratorConfig::default()
            },
        )
    }

    pub fn validation_service(&self) -> anyhow::Result<ValidationService> {
        let validator = Validator::new().context("Failed to build HTTP clients")?;
        Ok(ValidationService::new(
            validator,
            JobStore::new(&self.results_dir),
        ))
    }
}

/// Expand a leading `~` so paths from flags and env vars behave like shell paths.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Accept a sitemap URL, adding `https://` when no http(s) scheme is given.
pub fn parse_root_url(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(input)
        && matches!(url.scheme(), "http" | "https")
        && url.has_host()
    {
        return Some(input.to_string());
    }

    let with_scheme = format!("https://{}", input);
    match Url::parse(&with_scheme) {
        Ok(url) if url.has_host() => Some(with_scheme),
        _ => None,
    }
}

/// One line describing where a validation job ended up.
pub fn format_summary(state: &JobState) -> String {
    let mut line = format!(
        "{} {}: {} rows, {} ok, {} errors",
        state.job_id,
        state.status.as_str(),
        state.summary.rows,
        state.summary.ok,
        state.summary.errors
    );
    if let Some(error) = &state.error {
        line.push_str(&format!(" ({})", error));
    }
    line
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_heading(title: &str) {
    print_divider();
    println!("{}", format!("  {}", title).bright_white().bold());
    print_divider();
    println!();
}

fn spinner(settings: &Settings, msg: &str) -> ProgressBar {
    if settings.quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(msg.to_string());
    spinner
}

fn remove_catalog_files(path: &Path) -> anyhow::Result<()> {
    std::fs::remove_file(path)
        .with_context(|| format!("Failed to remove existing catalog {}", path.display()))?;
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar)
                .with_context(|| format!("Failed to remove {}", sidecar.display()))?;
        }
    }
    Ok(())
}

pub fn handle_init(settings: &Settings, args: &ArgMatches) -> anyhow::Result<()> {
    let force = args.get_flag("force");
    let path = &settings.catalog;

    if Catalog::exists(path) {
        if !force {
            bail!(
                "Catalog already exists at {}. Use --force to recreate it",
                path.display()
            );
        }
        remove_catalog_files(path)?;
        tracing::info!(path = %path.display(), "Removed existing catalog");
    }

    Catalog::open(path).with_context(|| format!("Failed to create catalog {}", path.display()))?;

    if !settings.quiet {
        print_heading("CATALOG READY");
        println!(
            "{} Catalog: {}",
            "✓".green().bold(),
            path.display().to_string().bright_white()
        );
    }
    Ok(())
}

fn print_report(report: &IndexReport) {
    println!(
        "{} {} ({} files, {} urls)",
        "✓".green().bold(),
        report.index_file.bright_white(),
        report.file_count(),
        report.sitemaps.iter().map(|s| s.url_count).sum::<usize>()
    );
    for sitemap in &report.sitemaps {
        println!("    {} {}", "•".cyan(), sitemap.files.join(", "));
    }
    for skipped in &report.skipped {
        println!(
            "    {} {}: {}",
            "✗".red().bold(),
            skipped.name.yellow(),
            skipped.error
        );
    }
}

pub async fn handle_generate(settings: &Settings, args: &ArgMatches) -> anyhow::Result<()> {
    let generator = settings.generator(Arc::new(settings.open_catalog()?));

    let progress = spinner(settings, "Generating sitemaps...");
    let reports = match args.get_one::<i64>("index") {
        Some(&id) => vec![generator.generate_index(id).await?],
        None => generator.generate_all().await?,
    };
    progress.finish_and_clear();

    if !settings.quiet {
        print_heading("GENERATION COMPLETE");
        if reports.is_empty() {
            println!("{}", "No sitemap indexes configured".yellow());
        }
        reports.iter().for_each(print_report);
    }
    Ok(())
}

pub async fn handle_validate(settings: &Settings, args: &ArgMatches) -> anyhow::Result<()> {
    let raw = args.get_one::<String>("url").map(String::as_str).unwrap_or_default();
    let Some(root_url) = parse_root_url(raw) else {
        bail!("Invalid sitemap URL '{}'", raw);
    };

    let service = settings.validation_service()?;
    let progress = spinner(settings, &format!("Validating {}", root_url));
    let state = service.validate(&root_url).await?;
    progress.finish_and_clear();

    let results = service.jobs().results_path(&state.job_id)?;
    if settings.quiet {
        println!("{}", state.job_id);
    } else {
        print_heading("VALIDATION COMPLETE");
        let marker = if state.summary.errors == 0 {
            "✓".green().bold()
        } else {
            "!".yellow().bold()
        };
        println!("{} {}", marker, format_summary(&state));
        println!(
            "{} Results: {}",
            "→".cyan(),
            results.display().to_string().bright_white()
        );
    }
    Ok(())
}

pub async fn handle_results(settings: &Settings, args: &ArgMatches) -> anyhow::Result<()> {
    let job_id = args.get_one::<String>("job").map(String::as_str).unwrap_or_default();
    let jobs = JobStore::new(&settings.results_dir);
    let bytes = jobs.read_results(job_id).await?;

    if settings.quiet {
        print!("{}", String::from_utf8_lossy(&bytes));
        return Ok(());
    }

    match jobs.status(job_id).await {
        Ok(state) => println!("{}\n", format_summary(&state).bright_white()),
        Err(e) => tracing::debug!(job_id, "No status for job: {}", e),
    }
    for row in parse_rows(&bytes)? {
        let outcome = if row.is_ok() {
            row.outcome.as_str().green().bold()
        } else {
            row.outcome.as_str().red().bold()
        };
        println!("{:>5} {:>3} {} {}", outcome, row.status_code, row.url, row.error.dimmed());
    }
    Ok(())
}

pub async fn handle_serve(settings: &Settings, args: &ArgMatches) -> anyhow::Result<()> {
    let bind = args
        .get_one::<SocketAddr>("bind")
        .copied()
        .context("No bind address given")?;

    let catalog = Arc::new(settings.open_catalog()?);
    let generator = settings.generator(catalog.clone());
    let state = AppState::new(catalog, generator, settings.validation_service()?);

    if !settings.quiet {
        println!(
            "{} Listening on {}",
            "→".cyan(),
            format!("http://{}", bind).bright_white()
        );
    }
    server::serve(bind, state).await?;
    Ok(())
}
