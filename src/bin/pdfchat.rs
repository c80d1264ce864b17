//! CLI binary for pdf-chat.
//!
//! Loads the given PDFs into a library, then answers one `--ask` question
//! or runs an interactive chat loop.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_chat::{
    export, inspect, upload, ChatConfig, ChatSession, DocumentLibrary, DocumentStatus,
    PageSelection, PreviewFormat, ProcessingConfig, ProcessingProgressCallback, ProgressCallback,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

/// One progress bar per document; starts as a spinner until the page count
/// is known.
struct CliProgressCallback {
    bar: ProgressBar,
    name: String,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    fn new(name: &str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Loading");
        bar.set_message(format!("{name}…"));
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            name: name.to_string(),
            fallbacks: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Reading");
        self.bar.set_message(self.name.clone());
    }
}

impl ProcessingProgressCallback for CliProgressCallback {
    fn on_processing_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
    }

    fn on_page_complete(&self, _page_num: usize, _total: usize, _text_len: usize) {
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_processing_complete(&self, total_pages: usize, clean_pages: usize) {
        self.bar.finish_and_clear();
        let fallbacks = total_pages.saturating_sub(clean_pages);
        if fallbacks == 0 {
            eprintln!(
                "{} {}  {}",
                green("✔"),
                bold(&self.name),
                dim(&format!("{total_pages} pages"))
            );
        } else {
            eprintln!(
                "{} {}  {}",
                cyan("⚠"),
                bold(&self.name),
                dim(&format!("{total_pages} pages, {fallbacks} with placeholders"))
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Chat with two documents
  pdfchat report-2023.pdf report-2024.pdf

  # One question, answer on stdout
  pdfchat --ask "What changed between @report-2023 and @report-2024?" report-*.pdf

  # From a URL, first ten pages only, text only
  pdfchat --pages 1-10 --no-images https://arxiv.org/pdf/1706.03762

  # Use another provider through edgequake-llm
  pdfchat --provider openai --model gpt-4.1-mini paper.pdf

  # Inspect PDF metadata (no API key needed)
  pdfchat --inspect-only document.pdf

  # Dump the processed pages, or write the page previews
  pdfchat --json document.pdf > document.json
  pdfchat --export-previews previews/ document.pdf

MENTIONS:
  @name or @"name with spaces" restricts a question to matching documents.
  Matching ignores case and the .pdf extension; a prefix is enough.

CHAT COMMANDS:
  /docs              list loaded documents
  /add <path|url>    load another document
  /remove <name>     unload a document
  /history           show the conversation so far
  /clear             forget the conversation
  /help              show this list
  /quit              exit (also Ctrl-D)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (GOOGLE_API_KEY also accepted)
  EDGEQUAKE_LLM_PROVIDER  Provider when not Gemini (openai, anthropic, ollama, ...)
  EDGEQUAKE_MODEL         Model ID
  PDFIUM_LIB_PATH         Directory or file of the pdfium shared library
"#;

const REPL_HELP: &str = "\
/docs              list loaded documents
/add <path|url>    load another document
/remove <name>     unload a document
/history           show the conversation so far
/clear             forget the conversation
/help              show this list
/quit              exit";

/// Chat with PDF documents using a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "pdfchat",
    version,
    about = "Chat with PDF documents using a vision LLM",
    long_about = "Load PDF documents (local files or URLs), extract the text of every page and a \
rendered preview, and ask questions about them. Every page goes to the model as text plus image, \
so tables, charts and scanned pages are understood too.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    inputs: Vec<String>,

    /// Ask one question, print the answer and exit.
    #[arg(short, long, env = "PDFCHAT_ASK")]
    ask: Option<String>,

    /// Model ID (e.g. gemini-2.0-flash, gemini-2.5-pro, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Provider: gemini (native streaming) or any edgequake-llm provider.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFCHAT_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFCHAT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Longest edge of page previews in pixels.
    #[arg(long, env = "PDFCHAT_MAX_PIXELS", default_value_t = 1280,
          value_parser = clap::value_parser!(u32).range(100..=8000))]
    max_pixels: u32,

    /// Encode previews as JPEG instead of PNG (smaller requests).
    #[arg(long, env = "PDFCHAT_JPEG")]
    jpeg: bool,

    /// Send page text only, no preview images.
    #[arg(long, env = "PDFCHAT_NO_IMAGES")]
    no_images: bool,

    /// Path to a text file containing a custom system instruction.
    #[arg(long, env = "PDFCHAT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PDFCHAT_TEMPERATURE", default_value_t = 0.4)]
    temperature: f32,

    /// Max tokens per reply.
    #[arg(long, env = "PDFCHAT_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Prior messages replayed with each question.
    #[arg(long, env = "PDFCHAT_HISTORY", default_value_t = 20)]
    history_limit: usize,

    /// Retries when a request fails transiently.
    #[arg(long, env = "PDFCHAT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Print the processed documents as JSON and exit.
    #[arg(long, env = "PDFCHAT_JSON")]
    json: bool,

    /// Print PDF metadata only, no processing.
    #[arg(long)]
    inspect_only: bool,

    /// Write page previews of every document to this directory and exit.
    #[arg(long, value_name = "DIR")]
    export_previews: Option<PathBuf>,

    /// Disable progress bars.
    #[arg(long, env = "PDFCHAT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFCHAT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and answers.
    #[arg(short, long, env = "PDFCHAT_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFCHAT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Seconds to wait for the model to start answering.
    #[arg(long, env = "PDFCHAT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs would tear through the progress bars.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let processing = build_processing_config(&cli)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        if cli.inputs.is_empty() {
            anyhow::bail!("--inspect-only needs at least one input");
        }
        for input in &cli.inputs {
            let meta = inspect(input, &processing)
                .await
                .with_context(|| format!("Failed to inspect {input}"))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
                );
                continue;
            }
            println!("File:         {input}");
            if let Some(ref t) = meta.title {
                println!("Title:        {t}");
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {a}");
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {s}");
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {p}");
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {c}");
            }
            println!();
        }
        return Ok(());
    }

    // ── Load documents ───────────────────────────────────────────────────
    let mut library = DocumentLibrary::new();
    let mut failures = 0;
    for input in &cli.inputs {
        if let Err(e) = load(&mut library, input, &processing, show_progress).await {
            eprintln!("{} {}: {}", red("✘"), bold(input), e);
            failures += 1;
        }
    }

    if cli.json || cli.export_previews.is_some() {
        let ready = library.ready();
        if let Some(ref dir) = cli.export_previews {
            for doc in &ready {
                let written = export::write_previews(doc, dir)
                    .await
                    .with_context(|| format!("Failed to export previews of {}", doc.name))?;
                if !cli.quiet {
                    eprintln!(
                        "{} {}  {} previews  →  {}",
                        green("✔"),
                        doc.name,
                        written.len(),
                        bold(&dir.display().to_string())
                    );
                }
            }
        }
        if cli.json {
            // Preview payloads are blanked; --export-previews writes them out.
            let docs = ready
                .iter()
                .map(|d| export::to_json(d, false))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to serialise documents")?;
            println!("[{}]", docs.join(",\n"));
        }
        if failures > 0 {
            anyhow::bail!("{failures} of {} inputs failed to load", cli.inputs.len());
        }
        return Ok(());
    }

    // ── Chat ─────────────────────────────────────────────────────────────
    let chat_config = build_chat_config(&cli).await?;
    let mut session = ChatSession::new(chat_config).context("No chat backend available")?;

    if let Some(ref question) = cli.ask {
        answer(&mut session, &library, question).await?;
        return Ok(());
    }

    if !cli.quiet {
        eprintln!(
            "{} {} via {}  {}",
            cyan("◆"),
            bold(session.backend().model()),
            session.backend().name(),
            dim("(/help for commands, /quit to exit)")
        );
    }
    repl(&mut session, &mut library, &processing, show_progress).await
}

/// Load one input into the library, with a progress bar when enabled.
async fn load(
    library: &mut DocumentLibrary,
    input: &str,
    base: &ProcessingConfig,
    show_progress: bool,
) -> Result<()> {
    let mut config = base.clone();
    if show_progress {
        let cb = CliProgressCallback::new(input);
        config.progress_callback = Some(cb.clone() as ProgressCallback);
        let result = upload(library, input, &config).await;
        if result.is_err() {
            cb.bar.finish_and_clear();
        }
        result?;
    } else {
        upload(library, input, &config).await?;
    }
    Ok(())
}

/// Ask one question and stream the answer to stdout.
async fn answer(
    session: &mut ChatSession,
    library: &DocumentLibrary,
    question: &str,
) -> Result<()> {
    let stdout = io::stdout();
    let reply = session
        .ask_with(library, question, |chunk| {
            let mut handle = stdout.lock();
            let _ = handle.write_all(chunk.as_bytes());
            let _ = handle.flush();
        })
        .await?;

    println!();
    if !reply.unmatched_mentions.is_empty() {
        eprintln!(
            "{} no document matches {}",
            cyan("⚠"),
            reply
                .unmatched_mentions
                .iter()
                .map(|m| format!("@{m}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    eprintln!(
        "{}",
        dim(&format!(
            "{} document(s), {:.1}s",
            reply.documents_used.len(),
            reply.duration_ms as f64 / 1000.0
        ))
    );
    Ok(())
}

async fn repl(
    session: &mut ChatSession,
    library: &mut DocumentLibrary,
    processing: &ProcessingConfig,
    show_progress: bool,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("{} ", bold("›"));
        io::stderr().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            eprintln!();
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" | "/q" => return Ok(()),
            "/help" => eprintln!("{REPL_HELP}"),
            "/docs" => print_docs(library),
            "/add" if !arg.is_empty() => {
                if let Err(e) = load(library, arg, processing, show_progress).await {
                    eprintln!("{} {}", red("✘"), e);
                }
            }
            "/remove" if !arg.is_empty() => match library.remove_by_name(arg) {
                Ok(doc) => eprintln!("{} removed {}", green("✔"), doc.name),
                Err(e) => eprintln!("{} {}", red("✘"), e),
            },
            "/add" | "/remove" => eprintln!("{} {command} needs an argument", red("✘")),
            "/history" => {
                for turn in session.history() {
                    let who = match turn.role {
                        pdf_chat::ChatRole::User => cyan("you"),
                        pdf_chat::ChatRole::Assistant => green("ai "),
                    };
                    eprintln!("{who}  {}", turn.text);
                }
            }
            "/clear" => {
                session.clear_history();
                eprintln!("{} conversation cleared", green("✔"));
            }
            c if c.starts_with('/') => eprintln!("{} unknown command {c}; try /help", red("✘")),
            _ => {
                if let Err(e) = answer(session, library, line).await {
                    eprintln!("\n{} {}", red("✘"), e);
                }
            }
        }
    }
}

fn print_docs(library: &DocumentLibrary) {
    if library.is_empty() {
        eprintln!("{}", dim("no documents loaded; use /add <path|url>"));
        return;
    }
    for doc in library.iter() {
        let status = match &doc.status {
            DocumentStatus::Ready => green("ready"),
            DocumentStatus::Processing => cyan("processing"),
            DocumentStatus::Failed { reason } => red(&format!("failed: {reason}")),
        };
        eprintln!(
            "  {}  {}  {}",
            bold(&doc.name),
            dim(&format!("{} pages", doc.pages.len())),
            status
        );
    }
}

/// Map CLI args to `ProcessingConfig`.
fn build_processing_config(cli: &Cli) -> Result<ProcessingConfig> {
    let pages = PageSelection::parse(&cli.pages).context("Invalid --pages")?;
    let mut builder = ProcessingConfig::builder()
        .max_rendered_pixels(cli.max_pixels)
        .pages(pages)
        .render_previews(!cli.no_images)
        .download_timeout_secs(cli.download_timeout);
    if cli.jpeg {
        builder = builder.preview_format(PreviewFormat::Jpeg);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    builder.build().context("Invalid configuration")
}

/// Map CLI args to `ChatConfig`.
async fn build_chat_config(cli: &Cli) -> Result<ChatConfig> {
    let mut builder = ChatConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .include_images(!cli.no_images)
        .history_limit(cli.history_limit)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.system_prompt {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {path:?}"))?;
        builder = builder.system_instruction(text);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_images_turns_off_rendering() {
        let cli = Cli::parse_from(["pdfchat", "--no-images", "a.pdf"]);
        let config = build_processing_config(&cli).unwrap();
        assert!(!config.render_previews);

        let cli = Cli::parse_from(["pdfchat", "a.pdf"]);
        assert!(build_processing_config(&cli).unwrap().render_previews);
    }

    #[test]
    fn password_and_timeout_reach_processing_config() {
        let cli = Cli::parse_from([
            "pdfchat",
            "--inspect-only",
            "--password",
            "secret",
            "--download-timeout",
            "7",
            "locked.pdf",
        ]);
        let config = build_processing_config(&cli).unwrap();
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.download_timeout_secs, 7);
    }
}
