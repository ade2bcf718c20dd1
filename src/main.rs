use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;

use sitewatch::db::Repository;
use sitewatch::fetch::HttpFetcher;
use sitewatch::models::{ComparisonConfig, DiffAlgorithm, NewItem, TextGate};
use sitewatch::notify::LogNotifier;
use sitewatch::schedule::next_item_due_at;
use sitewatch::{AppError, CheckOrchestrator, Config, Result};

const USAGE: &str = "Usage: sitewatch [--add <url> [--name <name>] [--selector <css>] [--exclude <css>] [--text] [--threshold <percent>]
                 [--diff <line|word|character>]]
                 [--list] [--check] [--check-item <id>] [--enable <id>] [--disable <id>] [--delete <id>]

Without arguments, monitors all enabled items until Ctrl-C.";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Load configuration
    let config = Config::load()?;

    let repo = Arc::new(Repository::new(&config.db_path).await?);
    let orchestrator = CheckOrchestrator::new(
        repo.clone(),
        Arc::new(HttpFetcher::new(&config)?),
        Arc::new(LogNotifier),
        config.engine_settings(),
    );

    match args.get(1).map(String::as_str) {
        Some("--add") => add_item(&repo, &args[2..]).await,
        Some("--list") => list_items(&repo).await,
        Some("--check") => {
            let report = orchestrator.tick(Local::now()).await?;
            let mut checked = 0;
            for (id, outcome) in report.checked() {
                println!("{:>4}  {}", id, outcome);
                checked += 1;
            }
            println!("Checked {} items, {} failed", checked, report.failures());
            Ok(())
        }
        Some("--check-item") => {
            let id = parse_id(&args)?;
            let outcome = orchestrator.check_item(id).await?;
            println!("{:>4}  {}", id, outcome);
            Ok(())
        }
        Some("--enable") => {
            let id = parse_id(&args)?;
            report_found(id, orchestrator.enable_item(id).await?, "enabled")
        }
        Some("--disable") => {
            let id = parse_id(&args)?;
            report_found(id, orchestrator.disable_item(id).await?, "disabled")
        }
        Some("--delete") => {
            let id = parse_id(&args)?;
            report_found(id, orchestrator.delete_item(id).await?, "deleted")
        }
        Some("--help") | Some("-h") => {
            println!("{}", USAGE);
            Ok(())
        }
        Some(other) => {
            eprintln!("{}", USAGE);
            Err(AppError::Config(format!("Unknown argument: {}", other)))
        }
        None => run_until_interrupted(&orchestrator).await,
    }
}

async fn run_until_interrupted(orchestrator: &CheckOrchestrator) -> Result<()> {
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    match orchestrator.next_wakeup(Local::now()).await? {
        Some(next) => println!("Next check at {}", next.format("%Y-%m-%d %H:%M:%S")),
        None => println!("No enabled item is scheduled; waiting for changes"),
    }

    orchestrator.run(shutdown).await
}

async fn add_item(repo: &Repository, args: &[String]) -> Result<()> {
    let url = args
        .first()
        .ok_or_else(|| AppError::Config("--add needs a URL".to_string()))?;
    url::Url::parse(url).map_err(|e| AppError::Config(format!("Invalid URL {}: {}", url, e)))?;

    let mut new = NewItem::new(url.as_str());
    let mut selector = None;
    let mut exclude = None;
    let mut text_only = false;
    let mut threshold = None;
    let mut diff_algorithm = None;

    let mut rest = args[1..].iter();
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--text" => text_only = true,
            "--name" => new.name = flag_value(&mut rest, flag)?,
            "--selector" => selector = Some(flag_value(&mut rest, flag)?),
            "--exclude" => exclude = Some(flag_value(&mut rest, flag)?),
            "--threshold" => {
                let value = flag_value(&mut rest, flag)?;
                let percent = value
                    .parse::<u8>()
                    .map_err(|_| AppError::Config(format!("Invalid threshold: {}", value)))?;
                threshold = Some(percent);
            }
            "--diff" => {
                let value = flag_value(&mut rest, flag)?;
                let algorithm = DiffAlgorithm::parse(&value)
                    .ok_or_else(|| AppError::Config(format!("Invalid diff algorithm: {}", value)))?;
                diff_algorithm = Some(algorithm);
            }
            other => return Err(AppError::Config(format!("Unknown option for --add: {}", other))),
        }
    }

    let mut comparison = if text_only {
        ComparisonConfig::text_only(TextGate::default())
    } else if selector.is_some() || exclude.is_some() {
        ComparisonConfig::css_selector(selector, exclude)
    } else {
        ComparisonConfig::full_html()
    };
    if let Some(percent) = threshold {
        comparison = comparison.with_threshold(percent);
    }
    if let Some(algorithm) = diff_algorithm {
        comparison = comparison.with_diff_algorithm(algorithm);
    }
    new = new.with_comparison(comparison);

    let id = repo.insert_item(new).await?;
    println!("Added item {} ({})", id, url);
    Ok(())
}

async fn list_items(repo: &Repository) -> Result<()> {
    let items = repo.load_all_items().await?;
    if items.is_empty() {
        println!("No monitored items. Add one with --add <url>");
        return Ok(());
    }

    let now = Local::now();
    for item in items {
        let next = match next_item_due_at(&item, &now) {
            Some(at) if at <= now => "due now".to_string(),
            Some(at) => at.format("%Y-%m-%d %H:%M").to_string(),
            None => "never".to_string(),
        };
        let status = match (&item.last_error, item.last_check) {
            (Some(error), _) => format!("error: {}", error),
            (None, Some(_)) => format!("last change {}%", item.last_change_percent),
            (None, None) => "never checked".to_string(),
        };
        println!(
            "{:>4}  {}  {}  [{}]  next: {}  {}",
            item.id,
            if item.enabled { "on " } else { "off" },
            item.name,
            item.url,
            next,
            status
        );
        for schedule in &item.schedules {
            println!("        {} / {}", schedule.label(), schedule.summary());
        }
    }
    Ok(())
}

fn flag_value<'a>(rest: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String> {
    rest.next()
        .cloned()
        .ok_or_else(|| AppError::Config(format!("{} needs a value", flag)))
}

fn parse_id(args: &[String]) -> Result<i64> {
    let flag = args.get(1).map(String::as_str).unwrap_or_default();
    let value = args
        .get(2)
        .ok_or_else(|| AppError::Config(format!("{} needs an item id", flag)))?;
    value
        .parse()
        .map_err(|_| AppError::Config(format!("Invalid item id: {}", value)))
}

fn report_found(id: i64, found: bool, action: &str) -> Result<()> {
    if !found {
        return Err(AppError::NotFound(format!("item {}", id)));
    }
    println!("Item {} {}", id, action);
    Ok(())
}
