use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use exam_core::Clock;
use exam_core::model::{Question, QuestionBank, SourceTag, TestNumber};
use services::remote::remote_from_env;
use services::{AppServices, Notifier, SessionState};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingEmail,
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingEmail => {
                write!(f, "an email is required (--email or EXAMPREP_EMAIL)")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

/// Prints outcome messages where a browser build would raise a toast.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str) {
        println!("{message}");
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- dashboard [--db <sqlite_url>] [--email <email>] [--name <name>] [--questions <bank.json>]");
    eprintln!("  cargo run -p app -- reset     [--db <sqlite_url>] [--email <email>] --confirm DELETE");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:examprep.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAMPREP_DB_URL, EXAMPREP_EMAIL, EXAMPREP_QUESTIONS");
    eprintln!("  EXAMPREP_SYNC_URL, EXAMPREP_SYNC_TOKEN  (remote sync; optional)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Dashboard,
    Reset,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "dashboard" => Some(Self::Dashboard),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    email: String,
    name: String,
    questions_path: Option<String>,
    confirm: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("EXAMPREP_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://examprep.sqlite3".into(), normalize_sqlite_url);
        let mut email = std::env::var("EXAMPREP_EMAIL").ok();
        let mut name = String::new();
        let mut questions_path = std::env::var("EXAMPREP_QUESTIONS").ok();
        let mut confirm = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--email" => email = Some(require_value(args, "--email")?),
                "--name" => name = require_value(args, "--name")?,
                "--questions" => questions_path = Some(require_value(args, "--questions")?),
                "--confirm" => confirm = Some(require_value(args, "--confirm")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let email = email.ok_or(ArgsError::MissingEmail)?;
        Ok(Self {
            db_url,
            email,
            name,
            questions_path,
            confirm,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[derive(Deserialize)]
struct BankFile {
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    tests: Vec<BankTest>,
}

#[derive(Deserialize)]
struct BankTest {
    number: u32,
    #[serde(default)]
    source: String,
    questions: Vec<Question>,
}

/// The question bank is external content; the binary just deserializes
/// whatever file it is pointed at. Without one the app still runs, with
/// empty attempts.
fn load_bank(path: Option<&str>) -> Result<QuestionBank, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        warn!("no question bank supplied; attempts will be empty");
        return Ok(QuestionBank::new(Vec::new()));
    };

    let raw = std::fs::read_to_string(path)?;
    let file: BankFile = serde_json::from_str(&raw)?;
    let mut bank = QuestionBank::new(file.domains);
    for test in file.tests {
        bank.insert_test(
            TestNumber::new(test.number),
            SourceTag::new(test.source),
            test.questions,
        );
    }
    Ok(bank)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Dashboard,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Dashboard,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&parsed.db_url)?;
    let bank = Arc::new(load_bank(parsed.questions_path.as_deref())?);
    let services = AppServices::new_sqlite(
        &parsed.db_url,
        Clock::system(),
        bank,
        remote_from_env(),
        Arc::new(ConsoleNotifier),
    )
    .await?;

    let mut session = SessionState::new();
    services
        .profiles()
        .sign_in(&mut session, &parsed.email, &parsed.name)
        .await?;

    match cmd {
        Command::Dashboard => {
            run_dashboard(&services, &mut session).await?;
        }
        Command::Reset => {
            if parsed.confirm.as_deref() != Some("DELETE") {
                println!("Reset aborted: pass --confirm DELETE to wipe all progress.");
            } else {
                services.profiles().perform_reset(&mut session).await?;
            }
        }
    }

    // Push whatever is still queued before the process exits.
    services.shutdown().await;
    Ok(())
}

async fn run_dashboard(
    services: &AppServices,
    session: &mut SessionState,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = session.user_name().unwrap_or("Student").to_string();
    println!("Signed in as {name}");
    println!();

    if let Some(record) = services.resume().last_progress_point(session).await? {
        let details = services.resume().progress_details(&record);
        println!("Continue where you left off:");
        println!(
            "  {} - question {} of {} ({}%)",
            details.display_name,
            details.current_question,
            details.total_questions,
            details.progress_percent
        );
        println!("  Last accessed: {}", details.last_accessed);
        println!();
    }

    services.stats().recalculate_user_stats(session, false).await?;
    if let Some(profile) = session.profile() {
        println!(
            "Answered {} questions, {} correct ({}% accuracy), {} tests completed",
            profile.stats.total_questions_answered,
            profile.stats.total_correct_answers,
            profile.stats.accuracy(),
            profile.stats.tests_completed
        );
    }

    if let Some(insights) = services.stats().calculate_insights(session).await? {
        if insights.total_answered > 0 {
            println!();
            println!("Performance by domain:");
            for (domain, stats) in &insights.domain_stats {
                println!(
                    "  {domain}: {}/{} answered, {}% accuracy",
                    stats.answered, stats.total, stats.accuracy
                );
            }
            if let Some(strongest) = &insights.strongest_domain {
                println!("  Strongest: {strongest}");
            }
            if let Some(weakest) = &insights.weakest_domain {
                println!("  Needs practice: {weakest}");
            }
        }
    }

    let history = services.results().submitted_tests(session).await?;
    if !history.is_empty() {
        println!();
        println!("Recent submitted tests:");
        for entry in history.iter().take(10) {
            println!(
                "  Test {} - {}% ({} correct, {} incorrect, {} unanswered) at {}",
                entry.test,
                entry.accuracy,
                entry.correct,
                entry.incorrect,
                entry.unanswered,
                entry.submitted_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
