use core::time::Duration;
use std::{
    env::current_dir,
    io::{self, Write},
    process::exit,
};

use clap::{Parser, Subcommand};
use color_eyre::{
    Section,
    config::HookBuilder,
    eyre::{self},
};
use indicatif::{ProgressBar, ProgressStyle};
use pwndex::{
    corpus::Corpus,
    gate::{self, View},
    index::QueryFilter,
    ingest::DocumentReport,
    permalink::Permalink,
    record::{Difficulty, WriteupRecord},
};
use serde_json::json;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(about = "Ingest, index, and gate pentest writeups", long_about = None)]
#[command(version, author)]
struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // create a new corpus
    Create {
        title: Option<String>,
    },

    /// Ingest every document under the corpus tree.
    Ingest {
        /// Report without committing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List indexed writeups, newest first.
    List {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        difficulty: Option<Difficulty>,
        #[arg(long)]
        tag: Option<String>,
        /// Only writeups whose target is already pwned/retired
        #[arg(long)]
        pwned_only: bool,
    },

    /// Print the content a writeup currently discloses.
    Show {
        permalink: String,
        /// Request the full body instead of the teaser
        #[arg(long)]
        full: bool,
    },

    /// Remove a writeup from the index.
    Remove {
        permalink: String,
    },

    /// Emit the permalink → writeup route map for the site generator.
    Routes,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    HookBuilder::default()
        .display_env_section(true)
        .panic_section("It looks like pwndex encountered a bug")
        .install()
        .expect("Failed to install color-eyre hook");

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false);
    let filter_layer = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    if let Err(err) = entry(cli).await {
        error!("{:#}", err);
        exit(1);
    }
}

async fn entry(cli: Cli) -> eyre::Result<()> {
    let current_dir = current_dir()?;
    let command = cli.command;

    match command {
        Commands::Create { title } => {
            let title = match title {
                Some(title) => title,
                None => prompt_corpus_title()?,
            };
            Corpus::create(current_dir, title).await?;
            info!("Corpus created successfully");
            Ok(())
        }
        command => {
            let corpus = Corpus::open(&current_dir).await.note("Can't open corpus")?;
            match command {
                Commands::Ingest { dry_run } => {
                    let reports = long_task(
                        "Ingesting writeups...",
                        corpus.ingest(dry_run),
                        "Ingestion finished",
                    )
                    .await
                    .note("Failed to ingest corpus")?;
                    print_reports(&reports, cli.json);
                    Ok(())
                }
                Commands::List {
                    platform,
                    category,
                    difficulty,
                    tag,
                    pwned_only,
                } => {
                    let filter = QueryFilter {
                        platform,
                        category,
                        difficulty,
                        tag,
                        pwned_only,
                    };
                    print_listing(&corpus, &filter, cli.json);
                    Ok(())
                }
                Commands::Show { permalink, full } => {
                    let permalink: Permalink = permalink.parse().note("Not a valid permalink")?;
                    let record = corpus.index().get(&permalink)?;
                    let view = if full { View::Full } else { View::Teaser };
                    let content = gate::resolve(&record, view)?;
                    println!("{content}");
                    Ok(())
                }
                Commands::Remove { permalink } => {
                    let permalink: Permalink = permalink.parse().note("Not a valid permalink")?;
                    let record = corpus.remove(&permalink).await?;
                    info!("Removed {}", record.permalink());
                    Ok(())
                }
                Commands::Routes => {
                    print_routes(&corpus);
                    Ok(())
                }
                Commands::Create { .. } => unreachable!(),
            }
        }
    }
}

pub async fn long_task<T, E>(
    loading_msg: &'static str,
    f: impl Future<Output = Result<T, E>>,
    complete_msg: &'static str,
) -> Result<T, E> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(loading_msg);

    let result = f.await?;

    pb.finish_with_message(complete_msg);
    Ok(result)
}

fn prompt_corpus_title() -> eyre::Result<String> {
    loop {
        print!("Corpus title: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let title = input.trim().to_string();

        if !title.is_empty() {
            return Ok(title);
        }

        println!("Corpus title cannot be empty. Please enter a title.");
    }
}

fn print_reports(reports: &[DocumentReport], emit_json: bool) {
    if emit_json {
        let rows: Vec<_> = reports
            .iter()
            .map(|report| {
                json!({
                    "source": report.source,
                    "permalink": report.outcome.permalink().map(Permalink::as_str),
                    "status": report.outcome.status(),
                    "errors": report.outcome.errors(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
        return;
    }

    let admitted = reports
        .iter()
        .filter(|report| report.outcome.is_success())
        .count();
    for report in reports {
        match report.outcome.permalink() {
            Some(permalink) => println!("[ok] {} -> {}", report.source, permalink),
            None => {
                println!("[{}] {}", report.outcome.status(), report.source);
                for message in report.outcome.errors() {
                    println!("     {message}");
                }
            }
        }
    }
    println!("Admitted {admitted} of {} document(s)", reports.len());
}

// The listing never leaks restricted content: the summary column goes
// through the teaser view regardless of output format.
fn print_listing(corpus: &Corpus, filter: &QueryFilter, emit_json: bool) {
    let results = corpus.index().query(filter);

    if emit_json {
        let rows: Vec<_> = results.iter().map(|record| card(record.as_ref())).collect();
        println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
        return;
    }

    if results.is_empty() {
        println!("No writeups match the given filters");
        return;
    }

    println!("Found {} writeup(s):", results.len());
    for record in &results {
        println!(
            "• {} [{} · {} · {}] {} -> {}",
            record.name(),
            record.platform(),
            record.difficulty(),
            record.date(),
            if record.pwned() { "pwned" } else { "active" },
            record.permalink(),
        );
    }
}

fn card(record: &WriteupRecord) -> serde_json::Value {
    json!({
        "name": record.name(),
        "platform": record.platform(),
        "category": record.category(),
        "difficulty": record.difficulty().label(),
        "os": record.os(),
        "tags": record.tags(),
        "date": record.date().to_string(),
        "permalink": record.permalink().as_str(),
        "pwned": record.pwned(),
        "summary": record.body().teaser(),
    })
}

fn print_routes(corpus: &Corpus) {
    let routes: serde_json::Map<String, serde_json::Value> = corpus
        .index()
        .routes()
        .into_iter()
        .map(|(permalink, record)| {
            (
                permalink.into_string(),
                json!({
                    "name": record.name(),
                    "category": record.category(),
                    "date": record.date().to_string(),
                    "pwned": record.pwned(),
                }),
            )
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::Value::Object(routes)).unwrap_or_default()
    );
}
