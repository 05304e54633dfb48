use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use fraudscore::core::tx::decode_request;
use fraudscore::notifications::Notifier;
use fraudscore::report::EntityQuery;
use fraudscore::{Config, EntityStore, PipelineOutput, Processor, ScoringEngine, report, run_pipeline};

const USAGE: &str = "usage: fraudscore [config.toml] [--report-entity type:value[:days]]...";

/// Command line: an optional config path plus any number of entity summaries
/// to print after the fraud report.
#[derive(Debug, PartialEq)]
struct CliArgs {
    config_path: String,
    entity_queries: Vec<EntityQuery>,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut config_path = None;
        let mut entity_queries = Vec::new();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let query = if arg == "--report-entity" {
                args.next().ok_or("--report-entity needs a type:value[:days] argument")?
            } else if let Some(query) = arg.strip_prefix("--report-entity=") {
                query.to_string()
            } else if arg.starts_with("--") || config_path.is_some() {
                return Err(format!("unexpected argument '{arg}'"));
            } else {
                config_path = Some(arg);
                continue;
            };
            let parsed = query
                .parse::<EntityQuery>()
                .map_err(|e| format!("invalid --report-entity '{query}': {e}"))?;
            entity_queries.push(parsed);
        }
        Ok(Self {
            config_path: config_path.unwrap_or_else(|| "config.toml".to_string()),
            entity_queries,
        })
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fraudscore=info".parse().unwrap()),
        )
        .init();

    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    tracing::info!("fraudscore starting...");

    // Load configuration
    let config = Config::load(&args.config_path);
    tracing::debug!("Config: {:?}", config);

    let store = Arc::new(EntityStore::new());
    register_admin_entries(&config, &store);

    let engine = ScoringEngine::new(Arc::clone(&store), config.scoring.clone());
    let notifier = Notifier::new(&config.notifications, Arc::clone(&store));
    let processor = Arc::new(Processor::new(engine, notifier));

    // Seed history is optional: the scorer works fine from an empty store.
    if let Some(seed) = config.seed.path.as_deref() {
        if Path::new(seed).exists() {
            if let Err(e) = processor.load_seed_file(seed) {
                tracing::warn!("Seed data not loaded from {seed}: {e}");
            }
        } else {
            tracing::info!("Seed file {seed} not found, starting empty");
        }
    }

    // stdin → pipeline → stdout
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<PipelineOutput>();
    let pipeline = tokio::spawn(run_pipeline(req_rx, out_tx, Arc::clone(&processor)));

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                // Field validation happens in the pipeline so rejections reach stdout.
                Ok(Some(line)) => match decode_request(&line) {
                    Ok(req) => {
                        if req_tx.send(req).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring malformed input line: {e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {e}");
                    break;
                }
            }
        }
    });

    while let Some(output) = out_rx.recv().await {
        let line = match &output {
            PipelineOutput::Scored(tx) => serde_json::to_string(tx.as_ref()),
            PipelineOutput::Rejected { transaction_id, reason } => serde_json::to_string(
                &serde_json::json!({ "transaction_id": transaction_id, "error": reason }),
            ),
        };
        match line {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("Failed to encode output: {e}"),
        }
    }

    if let Err(e) = reader.await {
        tracing::warn!("Input task failed: {e}");
    }
    if let Err(e) = pipeline.await {
        tracing::warn!("Pipeline task failed: {e}");
    }

    let report = report::fraud_report(processor.store(), Utc::now());
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!("Failed to encode fraud report: {e}"),
    }

    for query in &args.entity_queries {
        let summary = report::entity_summary(processor.store(), query.entity, &query.value, query.days, Utc::now());
        let json = match summary {
            Ok(summary) => serde_json::to_string_pretty(&summary),
            Err(e) => {
                tracing::warn!("Entity summary for {}:{} failed: {e}", query.entity, query.value);
                continue;
            }
        };
        match json {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!("Failed to encode entity summary: {e}"),
        }
    }
}

/// Register block/allow entries and webhook targets listed in the config.
fn register_admin_entries(config: &Config, store: &EntityStore) {
    let now = Utc::now();
    for entry in config.blocklist.iter().cloned() {
        let value = entry.value.clone();
        match entry.into_entry(now) {
            Ok(entry) => store.upsert_blocklist_entry(entry),
            Err(e) => tracing::warn!("Skipping blocklist entry '{value}': {e}"),
        }
    }
    for target in config.notifications.targets.iter().cloned() {
        let url = target.url.clone();
        match target.into_target(now) {
            Ok(target) => store.upsert_delivery_target(target),
            Err(e) => tracing::warn!("Skipping webhook target '{url}': {e}"),
        }
    }
    tracing::info!(
        "Registered {} blocklist entries, {} webhook targets",
        store.list_active_blocklist_entries().len(),
        store.list_active_delivery_targets().len()
    );
}
