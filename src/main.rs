use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Table};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use research_fanout::config::{find_config_file, OrchestratorConfigFile};
use research_fanout::models::{RecordBuilder, SearchResponse};
use research_fanout::orchestrator::ExecutionStrategy;
use research_fanout::providers::{MockProvider, ProviderError, ProviderProfile};
use research_fanout::utils::near_duplicate_pairs;
use research_fanout::{
    Orchestrator, OrchestratorConfig, ParallelSearchConfig, ProviderRegistry, SearchQuery,
};

/// Research Fanout - fan a query out to simulated research providers and
/// report how the orchestration behaved
#[derive(Parser, Debug)]
#[command(name = "research-fanout")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parallel search orchestration demo harness", long_about = None)]
struct Cli {
    /// Query to fan out
    #[arg(default_value = "deep learning for cancer diagnosis")]
    query: String,

    /// Concurrency strategy
    #[arg(long, short, value_enum, default_value_t = Strategy::SmartParallel)]
    strategy: Strategy,

    /// Upper bound on concurrent provider calls
    #[arg(long, default_value_t = 5)]
    max_concurrency: usize,

    /// Group size for the batch-parallel strategy
    #[arg(long, default_value_t = 3)]
    batch_size: usize,

    /// Per-task timeout in milliseconds (0 disables)
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Disable result deduplication
    #[arg(long)]
    no_dedup: bool,

    /// Pin specific providers (comma-separated), skipping selection
    #[arg(long, value_delimiter = ',')]
    providers: Vec<String>,

    /// Maximum results per provider
    #[arg(long, default_value_t = 10)]
    max_results: usize,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v, -vv, -vvv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Concurrency strategy argument
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    FullParallel,
    BatchParallel,
    SmartParallel,
    Sequential,
}

impl From<Strategy> for ExecutionStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::FullParallel => ExecutionStrategy::FullParallel,
            Strategy::BatchParallel => ExecutionStrategy::BatchParallel,
            Strategy::SmartParallel => ExecutionStrategy::SmartParallel,
            Strategy::Sequential => ExecutionStrategy::Sequential,
        }
    }
}

/// Build a registry of simulated providers with overlapping catalogs so
/// deduplication and retries have something to chew on.
fn build_demo_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    let preprints = MockProvider::new("preprint-sim")
        .with_delay(Duration::from_millis(80))
        .with_profile(
            ProviderProfile::new(&["computer-science", "physics"])
                .keywords(&["deep learning", "neural network", "quantum"])
                .open_access(true),
        );
    preprints.set_response(SearchResponse::new(
        vec![
            RecordBuilder::new("2101.00001", "Deep Learning for Tumor Segmentation", "http://preprints.example/2101.00001", "preprint-sim")
                .authors("A. Ruiz; M. Chen")
                .doi("10.1000/dl-tumor")
                .full_text(true)
                .build(),
            RecordBuilder::new("2102.00412", "Attention Models in Pathology", "http://preprints.example/2102.00412", "preprint-sim")
                .authors("S. Okafor")
                .build(),
        ],
        "preprint-sim",
        "",
    ));
    registry.register(Arc::new(preprints));

    let index = MockProvider::new("index-sim")
        .with_delay(Duration::from_millis(120))
        .with_profile(
            ProviderProfile::new(&["computer-science", "biomedicine", "physics", "economics"])
                .open_access(true),
        );
    index.set_response(SearchResponse::new(
        vec![
            // Same DOI as the preprint copy, but richer metadata.
            RecordBuilder::new("W100", "Deep Learning for Tumor Segmentation", "http://index.example/W100", "index-sim")
                .authors("A. Ruiz; M. Chen; L. Novak")
                .doi("10.1000/dl-tumor")
                .abstract_text("We study convolutional approaches to tumor segmentation.")
                .citations(54)
                .build(),
            RecordBuilder::new("W101", "A Survey of Diagnostic Imaging Models", "http://index.example/W101", "index-sim")
                .authors("L. Novak")
                .citations(12)
                .build(),
        ],
        "index-sim",
        "",
    ));
    registry.register(Arc::new(index));

    let clinical = MockProvider::new("clinical-sim")
        .with_delay(Duration::from_millis(200))
        .with_profile(
            ProviderProfile::new(&["biomedicine"]).keywords(&["cancer", "diagnosis", "clinical"]),
        );
    clinical.set_response(SearchResponse::new(
        vec![RecordBuilder::new(
            "PM900",
            "Clinical Validation of Automated Cancer Diagnosis",
            "http://clinical.example/PM900",
            "clinical-sim",
        )
        .authors("R. Devi; P. Hall")
        .abstract_text("Prospective validation across three hospitals.")
        .citations(8)
        .build()],
        "clinical-sim",
        "",
    ));
    registry.register(Arc::new(clinical));

    // Fails twice before answering, to show retry behavior in the summary.
    let flaky = MockProvider::new("flaky-sim")
        .with_delay(Duration::from_millis(50))
        .with_profile(ProviderProfile::new(&["computer-science"]));
    flaky.fail_times(2, ProviderError::Server("bad gateway".into()));
    flaky.set_response(SearchResponse::new(
        vec![RecordBuilder::new("F1", "Benchmarks for Medical Imaging", "http://flaky.example/F1", "flaky-sim")
            .authors("J. Meyer")
            .build()],
        "flaky-sim",
        "",
    ));
    registry.register(Arc::new(flaky));

    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match cli.config.clone().or_else(find_config_file) {
        Some(path) => OrchestratorConfigFile::load(&path)?,
        None => OrchestratorConfig::default(),
    };
    // Speed the demo up: simulated failures should not back off for seconds.
    config.retry.initial_delay_ms = config.retry.initial_delay_ms.min(100);

    let search_config = ParallelSearchConfig {
        strategy: cli.strategy.into(),
        max_concurrency: cli.max_concurrency,
        batch_size: cli.batch_size,
        timeout_ms: cli.timeout_ms,
        enable_deduplication: !cli.no_dedup,
        ..config.search.clone()
    };

    let orchestrator = Orchestrator::new(build_demo_registry(), config);
    let query = SearchQuery::new(&cli.query).max_results(cli.max_results);
    let pinned = (!cli.providers.is_empty()).then_some(cli.providers.as_slice());

    println!(
        "{} {}",
        "Fanning out:".bold(),
        cli.query.as_str().cyan()
    );

    let run = orchestrator.run(&query, pinned, &search_config).await?;

    if let Some(selection) = &run.selection {
        println!(
            "\n{} (confidence {:.2})",
            "Selected providers".bold(),
            selection.confidence
        );
        for reason in &selection.reasons {
            println!("  {}", reason);
        }
        if !selection.fallback_providers.is_empty() {
            println!("  fallbacks: {}", selection.fallback_providers.join(", "));
        }
    }

    if let Some(metrics) = &run.metrics {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec!["Provider", "Latency", "Records", "Status"]);
        for row in &metrics.providers {
            let status = if row.success {
                "ok".green().to_string()
            } else {
                row.error.as_deref().unwrap_or("failed").red().to_string()
            };
            table.add_row(vec![
                Cell::new(&row.provider_id),
                Cell::new(format!("{} ms", row.latency_ms)),
                Cell::new(row.record_count),
                Cell::new(status),
            ]);
        }
        println!("\n{table}");

        println!(
            "{} {} providers in {} ms (efficiency {:.1}x), {} records, {} duplicates removed",
            "Summary:".bold(),
            metrics.provider_count,
            metrics.total_duration_ms,
            metrics.parallel_efficiency,
            metrics.unique_records,
            metrics.duplicate_records,
        );
    }

    for warning in &run.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }

    let near = near_duplicate_pairs(&run.merged.records, 0.95);
    for (a, b) in near {
        println!(
            "{} '{}' ({}) resembles '{}' ({})",
            "near-duplicate:".yellow(),
            run.merged.records[a].title,
            run.merged.records[a].provider,
            run.merged.records[b].title,
            run.merged.records[b].provider,
        );
    }

    println!("\n{}", "Results".bold());
    for record in &run.merged.records {
        let mut line = format!("  {} [{}]", record.title, record.provider);
        if let Some(doi) = &record.doi {
            line.push_str(&format!(" doi:{}", doi));
        }
        if let Some(citations) = record.citations {
            line.push_str(&format!(" ({} citations)", citations));
        }
        println!("{line}");
    }

    println!("\n{}", "Provider health".bold());
    for health in orchestrator.health().snapshot() {
        println!(
            "  {}: {}/{} ok, avg {:.0} ms{}",
            health.provider_id,
            health.success_count,
            health.total_requests,
            health.average_latency_ms,
            if health.is_healthy { String::new() } else { " (unhealthy)".red().to_string() },
        );
    }

    Ok(())
}
