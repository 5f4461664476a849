use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use atty::Stream;
use clap::{Args, Parser, Subcommand};
use hybrid_search_rs::{
    Motion, ProductRecord, RevealFrame, RevealPhase, RevealSink, RevealTiming, SUGGESTION_CHIPS,
    SearchSession, StarRow, Submission, detect, format_markdown_lite, resolve_mode, run_reveal,
};
use serde_json::json;
use termimad::crossterm::{
    cursor::{MoveToColumn, MoveToPreviousLine},
    queue,
    terminal::{Clear, ClearType},
};
use termimad::{FmtText, MadSkin, terminal_size};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "hybrid-search-rs",
    about = "Classify queries and play mocked search / AI answers",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether each query reads as a product search or a question.
    Classify {
        /// One or more queries to classify.
        #[arg(required = true)]
        queries: Vec<String>,
        /// Pretend AI mode is pinned.
        #[arg(long)]
        ai: bool,
    },
    /// Run a query through the whole pipeline and show the result card.
    Submit {
        /// Query text; multiple words are joined with spaces.
        #[arg(required = true)]
        query: Vec<String>,
        /// Pin AI mode, answering even plain product names.
        #[arg(long)]
        ai: bool,
        /// Skip the typing effect and print the final answer at once.
        #[arg(long)]
        reduced_motion: bool,
        /// Print the card markup instead of terminal text.
        #[arg(long)]
        html: bool,
        #[command(flatten)]
        timing: TimingArgs,
    },
    /// List the suggestion chips offered in AI mode.
    Suggestions,
    /// Serve the homepage search box over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// Socket address to bind.
        #[arg(long, env = "HYBRID_SEARCH_ADDR", default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        /// Public base URL used in links; defaults to http://<addr>.
        #[arg(long, env = "HYBRID_SEARCH_BASE_URL")]
        base_url: Option<String>,
        #[command(flatten)]
        timing: TimingArgs,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct TimingArgs {
    /// Simulated thinking delay before an answer starts, in milliseconds.
    #[arg(long, env = "HYBRID_SEARCH_THINKING_MS", default_value_t = 900)]
    thinking_ms: u64,
    /// Delay between revealed characters, in milliseconds.
    #[arg(long, env = "HYBRID_SEARCH_TICK_MS", default_value_t = 16)]
    tick_ms: u64,
}

impl TimingArgs {
    fn to_timing(self, motion: Motion) -> RevealTiming {
        RevealTiming {
            thinking_delay: Duration::from_millis(self.thinking_ms),
            tick: Duration::from_millis(self.tick_ms.max(1)),
            motion,
        }
    }
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Classify { queries, ai } => {
            init_tracing("warn");
            handle_classify(queries, ai, cli.json)
        }
        Command::Submit {
            query,
            ai,
            reduced_motion,
            html,
            timing,
        } => {
            init_tracing("warn");
            let motion = if reduced_motion || !stdout_is_tty() {
                Motion::Reduced
            } else {
                Motion::Full
            };
            handle_submit(query.join(" "), ai, html, timing.to_timing(motion), cli.json).await
        }
        Command::Suggestions => handle_suggestions(cli.json),
        #[cfg(feature = "web")]
        Command::Serve {
            addr,
            base_url,
            timing,
        } => {
            init_tracing("info");
            let config = hybrid_search_rs::web::WebConfig {
                addr,
                base_url: base_url.unwrap_or_else(|| format!("http://{addr}")),
                timing: timing.to_timing(Motion::Full),
                ..Default::default()
            };
            hybrid_search_rs::web::serve(config).await?;
            Ok(())
        }
    }
}

fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn handle_classify(queries: Vec<String>, ai: bool, as_json: bool) -> Result<(), Box<dyn Error>> {
    let rows: Vec<_> = queries
        .into_iter()
        .map(|query| {
            let detection = detect(&query);
            let mode = resolve_mode(&query, ai);
            (query, mode, detection.trigger)
        })
        .collect();

    if as_json {
        let payload: Vec<_> = rows
            .iter()
            .map(|(query, mode, trigger)| {
                json!({ "query": query, "mode": mode, "trigger": trigger, "pinned": ai })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let width = rows
        .iter()
        .map(|(query, _, _)| query.chars().count())
        .max()
        .unwrap_or(5)
        .max("QUERY".len());
    println!("{:<width$}  {:<6}  {}", "QUERY", "MODE", "TRIGGER", width = width);
    println!("{:-<width$}  {:-<6}  {}", "", "", "-------", width = width);
    for (query, mode, trigger) in &rows {
        let trigger = match (ai, trigger) {
            (true, _) => "<pinned>".to_string(),
            (false, Some(trigger)) => trigger.clone(),
            (false, None) => "—".to_string(),
        };
        println!("{:<width$}  {:<6}  {}", query, mode.as_str(), trigger, width = width);
    }
    Ok(())
}

async fn handle_submit(
    raw: String,
    ai: bool,
    html: bool,
    timing: RevealTiming,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let mut session = SearchSession::new();
    session.set_ai_pinned(ai);
    let submission = session.submit(&raw)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&submission_json(&submission))?);
        return Ok(());
    }

    match &submission {
        Submission::Product {
            record, card_html, ..
        } => {
            if html {
                println!("{card_html}");
            } else {
                print_product(record);
            }
        }
        Submission::Answer {
            text,
            shell_html,
            ticket,
            ..
        } => {
            if html {
                println!("{shell_html}");
            }
            let sink = TerminalSink::new(*text, html);
            run_reveal(ticket, text, timing, sink).await;
        }
    }
    if let Some(hint) = submission.hint() {
        println!("\n{}", hint.plain_text());
    }
    Ok(())
}

fn submission_json(submission: &Submission) -> serde_json::Value {
    let hint = submission.hint().map(|hint| hint.plain_text());
    match submission {
        Submission::Product { query, record, .. } => json!({
            "query": query,
            "mode": submission.mode(),
            "product": record,
            "hint": hint,
        }),
        Submission::Answer {
            query, topic, text, ..
        } => json!({
            "query": query,
            "mode": submission.mode(),
            "topic": topic,
            "text": text,
            "html": format_markdown_lite(text),
            "hint": hint,
        }),
    }
}

fn handle_suggestions(as_json: bool) -> Result<(), Box<dyn Error>> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(SUGGESTION_CHIPS)?);
    } else {
        for chip in SUGGESTION_CHIPS {
            println!("- {chip}");
        }
    }
    Ok(())
}

fn print_product(record: &ProductRecord) {
    println!("{}", record.category.to_uppercase());
    println!("{}", record.name);
    println!(
        "{} {} · {} reviews",
        star_glyphs(record.rating),
        hybrid_search_rs::render::format_rating(record.rating),
        hybrid_search_rs::render::format_review_count(record.review_count)
    );
    if let Some(badge) = &record.badge {
        println!("🏆 {badge}");
    }
    println!("\n{}", record.description);
    println!("\nCompare alternatives → · See pricing → · Read top reviews →");
}

fn star_glyphs(rating: f32) -> String {
    let row = StarRow::from_rating(rating);
    let mut out = "★".repeat(row.full);
    if row.half {
        out.push('⯪');
    }
    out.push_str(&"☆".repeat(row.empty));
    out
}

/// Types raw frames straight to stdout. On the final frame the typed text is
/// replaced: by the markup with `--html`, otherwise by the rendered markdown.
struct TerminalSink {
    text: &'static str,
    html: bool,
    typed_chars: usize,
}

impl TerminalSink {
    fn new(text: &'static str, html: bool) -> Self {
        Self {
            text,
            html,
            typed_chars: 0,
        }
    }
}

impl TerminalSink {
    /// Clears the rows the raw frames were typed into and parks the cursor
    /// where typing started.
    fn erase_typed(&self) {
        let typed: String = self.text.chars().take(self.typed_chars).collect();
        let (width, _) = terminal_size();
        let rows = typed_rows(&typed, width as usize);
        let mut stdout = io::stdout().lock();
        let moved = if rows > 1 {
            queue!(stdout, MoveToPreviousLine(rows - 1))
        } else {
            queue!(stdout, MoveToColumn(0))
        };
        let _ = moved.and_then(|_| queue!(stdout, Clear(ClearType::FromCursorDown)));
        let _ = stdout.flush();
    }
}

/// Terminal rows taken by `text` once wrapped at `width` columns.
fn typed_rows(text: &str, width: usize) -> u16 {
    let width = width.max(1);
    let rows: usize = text
        .split('\n')
        .map(|line| line.chars().count().div_ceil(width).max(1))
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

impl RevealSink for TerminalSink {
    fn phase(&mut self, phase: RevealPhase) {
        if phase == RevealPhase::Thinking && !self.html {
            println!("G2 AI");
        }
    }

    fn frame(&mut self, frame: RevealFrame) {
        match frame {
            RevealFrame::Raw(prefix) => {
                let delta: String = prefix.chars().skip(self.typed_chars).collect();
                self.typed_chars += delta.chars().count();
                let mut stdout = io::stdout().lock();
                let _ = stdout.write_all(delta.as_bytes());
                let _ = stdout.flush();
            }
            RevealFrame::Formatted(markup) => {
                if self.html {
                    if self.typed_chars > 0 {
                        println!();
                    }
                    println!("{markup}");
                } else {
                    if self.typed_chars > 0 {
                        self.erase_typed();
                    }
                    render_markdown_block(self.text);
                }
            }
        }
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_rows_follow_wrapping_and_newlines() {
        assert_eq!(typed_rows("", 80), 1);
        assert_eq!(typed_rows("hello", 80), 1);
        assert_eq!(typed_rows(&"x".repeat(80), 80), 1);
        assert_eq!(typed_rows(&"x".repeat(81), 80), 2);
        assert_eq!(typed_rows("a\n\nb", 80), 3);
        assert_eq!(typed_rows("★★★", 2), 2);
    }

    #[test]
    fn star_glyphs_cover_five_slots() {
        assert_eq!(star_glyphs(4.5), "★★★★⯪");
        assert_eq!(star_glyphs(4.4), "★★★★☆");
        assert_eq!(star_glyphs(0.0), "☆☆☆☆☆");
    }

    #[test]
    fn timing_args_never_tick_at_zero() {
        let timing = TimingArgs {
            thinking_ms: 0,
            tick_ms: 0,
        }
        .to_timing(Motion::Full);
        assert_eq!(timing.tick, Duration::from_millis(1));
        assert_eq!(timing.thinking_delay, Duration::ZERO);
    }
}
