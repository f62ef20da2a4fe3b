//! CLI binary for edgequake-income.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` / `StoreConfig` and prints results.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use edgequake_income::schema::create_table_sql;
use edgequake_income::{
    generate_batch_id, AnalysisStrategy, BatchPolicy, ComplianceStatus, PdfiumTextExtractor,
    Pipeline, PipelineConfig, PipelineProgressCallback, ProgressCallback, Record, RecordStore, RowId,
    StoreConfig, StoredRecord, TextExtractor, UploadError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch, one log line per
/// document with its compliance verdict.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Analysing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
    }

    fn on_document_start(&self, index: usize, total: usize, file_name: &str) {
        if self.bar.length().unwrap_or(0) == 0 {
            self.bar.set_length(total as u64);
        }
        self.bar.set_message(format!("{index}: {file_name}"));
    }

    fn on_document_complete(&self, file_name: &str, status: &ComplianceStatus) {
        let verdict = match status {
            ComplianceStatus::Compliant => green(&status.to_string()),
            ComplianceStatus::NeedsReview => yellow(&status.to_string()),
            ComplianceStatus::Error(_) => red(&status.to_string()),
        };
        self.bar
            .println(format!("  {} {:<32}  {}", green("✓"), file_name, verdict));
        self.bar.inc(1);
    }

    fn on_document_error(&self, file_name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };

        self.bar
            .println(format!("  {} {:<32}  {}", red("✗"), file_name, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, uploaded: usize) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        eprintln!(
            "{} {}/{} records stored  {}",
            if uploaded == total { green("✔") } else { red("✘") },
            bold(&uploaded.to_string()),
            total,
            dim(&format!("({errors} skipped)")),
        );
    }
}

// ── Dry-run store ────────────────────────────────────────────────────────────

/// Prints records as JSON instead of inserting them, and echoes them back
/// with sequential ids so the flows report what would have been stored.
struct DryRunStore {
    next_id: AtomicI64,
}

impl DryRunStore {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
        }
    }

    fn echo(&self, record: &Record) -> Result<StoredRecord, UploadError> {
        let json =
            serde_json::to_string_pretty(record).map_err(|e| UploadError::Decode(e.to_string()))?;
        println!("{json}");
        Ok(StoredRecord {
            id: Some(RowId::Int(self.next_id.fetch_add(1, Ordering::SeqCst))),
            created_at: None,
            record: record.clone(),
        })
    }
}

#[async_trait]
impl RecordStore for DryRunStore {
    async fn insert_one(&self, record: &Record) -> Result<StoredRecord, UploadError> {
        self.echo(record)
    }

    async fn insert_many(&self, records: &[Record]) -> Result<Vec<StoredRecord>, UploadError> {
        records.iter().map(|r| self.echo(r)).collect()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One document, tagged with an applicant id
  incomecheck payslip.pdf --applicant-id APPL_12345

  # Several documents uploaded as one batch
  incomecheck --batch-id BATCH_001 stub1.pdf stub2.pdf w2.pdf

  # Let the LLM write the income summary too
  incomecheck --strategy structured --model gpt-4.1-mini payslip.pdf

  # See what would be stored without touching the database
  incomecheck --dry-run payslip.pdf

  # Print the extracted text only (no API keys needed)
  incomecheck --extract-only payslip.pdf

  # Print the table DDL for the Supabase SQL editor
  incomecheck --print-schema --table income_data

ENVIRONMENT VARIABLES (also read from .env):
  SUPABASE_URL               Supabase project URL
  SUPABASE_KEY               Service-role key (falls back to SUPABASE_SERVICE_ROLE_KEY,
                             then SUPABASE_ANON_KEY)
  OPENAI_API_KEY             OpenAI API key
  ANTHROPIC_API_KEY          Anthropic API key
  EDGEQUAKE_LLM_PROVIDER     Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL            Override model ID
  PDFIUM_DYNAMIC_LIB_PATH    Path to libpdfium if it is not installed system-wide
"#;

/// Analyse PDF mortgage documents for income compliance and store the results.
#[derive(Parser, Debug)]
#[command(
    name = "incomecheck",
    version,
    about = "Analyse PDF mortgage documents for income compliance and store the results in Supabase",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files to process. More than one file implies --batch.
    #[arg(required_unless_present = "print_schema")]
    files: Vec<PathBuf>,

    /// Applicant id attached to the record. Single-document mode only.
    #[arg(long, env = "INCOMECHECK_APPLICANT_ID")]
    applicant_id: Option<String>,

    /// Upload all files in one batch insert, even if only one is given.
    #[arg(long)]
    batch: bool,

    /// Batch id attached to every record. Generated when omitted.
    #[arg(long, env = "INCOMECHECK_BATCH_ID")]
    batch_id: Option<String>,

    /// Analysis strategy: heuristic or structured.
    #[arg(long, env = "INCOMECHECK_STRATEGY", value_enum, default_value = "heuristic")]
    strategy: StrategyArg,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "INCOMECHECK_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens. Default depends on the strategy.
    #[arg(long, env = "INCOMECHECK_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Per LLM call timeout in seconds.
    #[arg(long, env = "INCOMECHECK_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "INCOMECHECK_PDF_PASSWORD")]
    password: Option<String>,

    /// In batch mode, leave out records whose analysis failed.
    #[arg(long)]
    skip_error_records: bool,

    /// Supabase project URL [env: SUPABASE_URL].
    #[arg(long)]
    supabase_url: Option<String>,

    /// Supabase API key [env: SUPABASE_KEY, SUPABASE_SERVICE_ROLE_KEY, SUPABASE_ANON_KEY].
    #[arg(long)]
    supabase_key: Option<String>,

    /// Target table.
    #[arg(long, env = "INCOMECHECK_TABLE", default_value = "income_data")]
    table: String,

    /// Print extracted text and exit. No LLM or database access.
    #[arg(long)]
    extract_only: bool,

    /// Print records as JSON instead of uploading them.
    #[arg(long)]
    dry_run: bool,

    /// Print the CREATE TABLE statement for --table and exit.
    #[arg(long)]
    print_schema: bool,

    /// Print the batch report as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "INCOMECHECK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INCOMECHECK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INCOMECHECK_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum StrategyArg {
    Heuristic,
    Structured,
}

impl From<StrategyArg> for AnalysisStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Heuristic => AnalysisStrategy::Heuristic,
            StrategyArg::Structured => AnalysisStrategy::Structured,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env values must be visible before clap reads `env = ...` defaults.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let batch_mode = resolve_mode(&cli)?;

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = batch_mode && !cli.quiet && !cli.no_progress && !cli.json && !cli.dry_run;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Schema-only mode ─────────────────────────────────────────────────
    if cli.print_schema {
        print!("{}", create_table_sql(&cli.table));
        return Ok(());
    }

    // ── Extract-only mode ────────────────────────────────────────────────
    if cli.extract_only {
        let extractor = PdfiumTextExtractor::with_password(cli.password.clone());
        for path in &cli.files {
            let text = extractor
                .extract(path)
                .await
                .with_context(|| format!("Failed to extract text from {}", path.display()))?;
            if cli.files.len() > 1 {
                println!("==> {} <==", path.display());
            }
            println!("{text}");
        }
        return Ok(());
    }

    // ── Build pipeline ───────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    let store: Arc<dyn RecordStore> = if cli.dry_run {
        Arc::new(DryRunStore::new())
    } else {
        let store_config =
            StoreConfig::from_env_or(cli.supabase_url.clone(), cli.supabase_key.clone())
                .context("Supabase is not configured")?
                .with_table(cli.table.clone());
        Arc::new(
            edgequake_income::SupabaseStore::new(&store_config)
                .context("Failed to initialise Supabase client")?,
        )
    };

    let pipeline = Pipeline::with_store(config, store).context("Failed to initialise pipeline")?;

    // ── Single document ──────────────────────────────────────────────────
    if !batch_mode {
        let path = &cli.files[0];
        let ok = pipeline
            .process_document(path, cli.applicant_id.as_deref())
            .await;
        if !ok {
            anyhow::bail!("Failed to process document {}", path.display());
        }
        if !cli.quiet {
            eprintln!("{} Document processed and uploaded successfully", green("✔"));
        }
        return Ok(());
    }

    // ── Batch ────────────────────────────────────────────────────────────
    let batch_id = cli.batch_id.clone().unwrap_or_else(generate_batch_id);
    let report = pipeline.process_batch(&cli.files, Some(&batch_id)).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet && !show_progress {
        eprintln!(
            "Batch {}: {}/{} documents stored",
            batch_id, report.uploaded, report.attempted
        );
        for skipped in &report.skipped {
            eprintln!("  {} {}: {}", red("✗"), skipped.file_name, skipped.reason);
        }
    }

    if !report.is_complete() {
        anyhow::bail!(
            "{} of {} documents were not stored",
            report.attempted - report.uploaded,
            report.attempted
        );
    }
    Ok(())
}

/// Decide between single-document and batch mode.
///
/// Batch records carry a batch id only, so an applicant id there would be
/// silently dropped; reject it instead.
fn resolve_mode(cli: &Cli) -> Result<bool> {
    let batch_mode = cli.batch || cli.files.len() > 1;
    if batch_mode && cli.applicant_id.is_some() {
        anyhow::bail!(
            "--applicant-id only applies to a single document; \
             drop it or process the files one at a time"
        );
    }
    Ok(batch_mode)
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .strategy(cli.strategy.clone().into())
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .batch_policy(if cli.skip_error_records {
            BatchPolicy::SkipErrorRecords
        } else {
            BatchPolicy::IncludeErrorRecords
        });

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(ref password) = cli.password {
        builder = builder.pdf_password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
