//! CLI binary for redmine2gitlab.
//!
//! A thin shim over the library crate: reads `config.json`, applies flag and
//! environment overrides, runs one migration command and prints its report.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use redmine2gitlab::{
    convert_file, convert_to_file, migrate, MigrationConfig, MigrationProgressCallback,
    MigrationReport, ProgressCallback,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders one bar per command and a log line per created or failed item.
/// Failed items stay pending, so the bar only advances on success.
struct CliProgressCallback {
    bar: ProgressBar,
    attempts_failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Connecting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            attempts_failed: AtomicUsize::new(0),
        })
    }
}

impl MigrationProgressCallback for CliProgressCallback {
    fn on_start(&self, resource: &str, total: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>4}/{len} {msg}  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_prefix("Migrating");
        self.bar.set_message(resource.to_string());
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Migrating {total} {resource}…"))
        ));
    }

    fn on_round_start(&self, resource: &str, round: u32, pending: usize) {
        if round > 1 {
            self.bar.println(format!(
                "{} round {round}: retrying {pending} {resource}",
                cyan("↻")
            ));
        }
    }

    fn on_item_complete(&self, resource: &str, redmine_id: u64, gitlab_id: u64) {
        let target = if gitlab_id == 0 {
            String::new()
        } else {
            dim(&format!("→ {gitlab_id}"))
        };
        self.bar
            .println(format!("  {} {resource} {redmine_id:>6}  {target}", green("✓")));
        self.bar.inc(1);
    }

    fn on_item_error(&self, resource: &str, redmine_id: u64, error: &str) {
        self.attempts_failed.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {resource} {redmine_id:>6}  {}", red("✗"), red(&msg)));
    }

    fn on_complete(&self, resource: &str, _total: usize, _created: usize) {
        self.bar.finish_and_clear();
        let retried = self.attempts_failed.swap(0, Ordering::SeqCst);
        if retried > 0 {
            eprintln!("{}", dim(&format!("   {retried} failed attempt(s) on {resource}")));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Copy the Redmine project into ./redmine
  redmine2gitlab init

  # Dry run: check preconditions and log what would be created
  redmine2gitlab --check roadmap

  # Full migration
  redmine2gitlab roadmap
  redmine2gitlab attachments
  redmine2gitlab issues
  redmine2gitlab link-roadmap
  redmine2gitlab link-issues
  redmine2gitlab wiki

  # Convert one textile file, list its links
  redmine2gitlab convert page.textile -o page.md --links

CONFIG FILE (config.json):
  {
    "redmine": { "host": "https://redmine.example.org", "path": "projects/tool", "key": "…" },
    "gitlab":  { "host": "https://gitlab.example.org",  "path": "team/tool",     "key": "…" }
  }

ENVIRONMENT VARIABLES:
  REDMINE_API_KEY   Overrides redmine.key
  GITLAB_API_KEY    Overrides gitlab.key
  RUST_LOG          Log filter (overrides -v / -q)
"#;

/// Migrate a Redmine project to GitLab.
#[derive(Parser, Debug)]
#[command(
    name = "redmine2gitlab",
    version,
    about = "Migrate a Redmine project (roadmap, issues, attachments, wiki) to GitLab",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, global = true, env = "REDMINE2GITLAB_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Check preconditions and log what would be done, without writing.
    #[arg(long, global = true)]
    check: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, visible_alias = "debug", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true)]
    no_progress: bool,

    /// Redmine API key.
    #[arg(long, env = "REDMINE_API_KEY", hide_env_values = true)]
    redmine_key: Option<String>,

    /// GitLab private token.
    #[arg(long, env = "GITLAB_API_KEY", hide_env_values = true)]
    gitlab_key: Option<String>,

    /// Rounds per command before an item is reported as failed.
    #[arg(long, env = "REDMINE2GITLAB_MAX_ROUNDS")]
    max_rounds: Option<u32>,

    /// Convert issue descriptions and notes from textile to Markdown.
    #[arg(long)]
    convert_markup: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy the Redmine project into the local cache.
    Init,
    /// Create GitLab milestones from Redmine versions.
    Roadmap,
    /// Upload cached attachments to GitLab.
    Attachments,
    /// Create GitLab issues from cached Redmine issues.
    Issues,
    /// Like `issues`, with the Redmine id in each title.
    IssuesWithId,
    /// Delete every issue of the GitLab project.
    DeleteIssues,
    /// Point Redmine versions to their GitLab milestones.
    LinkRoadmap,
    /// Point Redmine issues to their GitLab issues.
    LinkIssues,
    /// Convert and copy the Redmine wiki to GitLab.
    Wiki,
    /// Convert a local textile file to Markdown.
    Convert {
        /// Textile file to read.
        input: PathBuf,
        /// Write Markdown to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// List the links found in the input on stderr.
        #[arg(long)]
        links: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // Built on demand: `convert` needs neither a config file nor a bar.
    let config = || {
        let progress: Option<ProgressCallback> = if show_progress {
            Some(CliProgressCallback::new() as Arc<dyn MigrationProgressCallback>)
        } else {
            None
        };
        build_config(&cli, progress)
    };

    let report = match &cli.command {
        Command::Convert {
            input,
            output,
            links,
        } => return run_convert(input, output.as_ref(), *links, cli.quiet).await,
        Command::Init => {
            let summary = migrate::init(&config()?).await.context("init failed")?;
            if !cli.quiet {
                eprintln!(
                    "{} cached {} version(s), {} issue(s), {} user(s), {} attachment(s)",
                    green("✔"),
                    summary.versions,
                    summary.issues,
                    summary.users,
                    summary.attachments
                );
            }
            return Ok(());
        }
        Command::Roadmap => migrate::roadmap(&config()?)
            .await
            .context("roadmap failed")?,
        Command::Attachments => migrate::attachments(&config()?)
            .await
            .context("attachments failed")?,
        Command::Issues | Command::IssuesWithId => migrate::issues(&config()?)
            .await
            .context("issues failed")?,
        Command::DeleteIssues => migrate::delete_issues(&config()?)
            .await
            .context("delete-issues failed")?,
        Command::LinkRoadmap => migrate::link_roadmap(&config()?)
            .await
            .context("link-roadmap failed")?,
        Command::LinkIssues => migrate::link_issues(&config()?)
            .await
            .context("link-issues failed")?,
        Command::Wiki => migrate::wiki(&config()?).await.context("wiki failed")?,
    };

    if !cli.quiet {
        print_report(&report, cli.check);
    }
    if !report.is_complete() {
        std::process::exit(2);
    }
    Ok(())
}

/// Map the config file and CLI args to `MigrationConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<MigrationConfig> {
    let mut builder = MigrationConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?
        .check_only(cli.check)
        .title_with_redmine_id(matches!(cli.command, Command::IssuesWithId));

    if let Some(ref key) = cli.redmine_key {
        builder = builder.redmine_key(key.clone());
    }
    if let Some(ref key) = cli.gitlab_key {
        builder = builder.gitlab_key(key.clone());
    }
    if let Some(n) = cli.max_rounds {
        builder = builder.max_rounds(n);
    }
    if cli.convert_markup {
        builder = builder.convert_issue_markup(true);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

async fn run_convert(
    input: &Path,
    output: Option<&PathBuf>,
    links: bool,
    quiet: bool,
) -> Result<()> {
    let converted = match output {
        Some(path) => convert_to_file(input, path)
            .await
            .context("Conversion failed")?,
        None => {
            let converted = convert_file(input).await.context("Conversion failed")?;
            io::stdout()
                .lock()
                .write_all(converted.markdown.as_bytes())
                .context("Failed to write to stdout")?;
            converted
        }
    };

    if links {
        for link in &converted.links {
            eprintln!("{}  {}", bold(&link.label), dim(&link.url));
        }
    }
    if !quiet {
        if let Some(path) = output {
            eprintln!(
                "{}  {} link(s)  →  {}",
                green("✔"),
                converted.links.len(),
                bold(&path.display().to_string())
            );
        }
    }
    Ok(())
}

fn print_report(report: &MigrationReport, check: bool) {
    let verb = if check { "would migrate" } else { "migrated" };
    let todo = report.total.saturating_sub(report.skipped);
    if report.failed.is_empty() {
        eprintln!(
            "{} {} {}/{} {}  {}",
            green("✔"),
            verb,
            if check { todo } else { report.created },
            todo,
            report.resource,
            dim(&format!("({} skipped, {} round(s))", report.skipped, report.rounds)),
        );
    } else {
        eprintln!(
            "{} {} {}/{} {}  ({} failed)",
            if report.created == 0 { red("✘") } else { cyan("⚠") },
            verb,
            report.created,
            todo,
            report.resource,
            red(&report.failed.len().to_string()),
        );
        for failure in &report.failed {
            eprintln!("   {}", red(&failure.to_string()));
        }
    }
}
