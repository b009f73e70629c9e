//! study-runner: headless runner for the finstudy analysis pipelines.
//!
//! Usage:
//!   study-runner --pipeline process
//!   study-runner --pipeline var --data processed_data/processed_data.csv --output output
//!   study-runner --pipeline lstm --config study.json --seed 7 --db runs.db --json

use anyhow::Result;
use finstudy_core::{
    config::AnalysisConfig,
    engine::{new_run_id, PipelineEngine, PipelineKind},
    stage::PipelineContext,
    store::AnalysisStore,
};
use std::env;
use std::path::{Path, PathBuf};

#[derive(serde::Serialize)]
struct RunSummary {
    run_id:     String,
    pipeline:   String,
    seed:       u64,
    events:     i64,
    artifacts:  Vec<(String, String)>,
    highlights: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let pipeline: PipelineKind = flag_value(&args, "--pipeline").unwrap_or("correlation").parse()?;
    let json = args.iter().any(|a| a == "--json");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");

    let mut config = match flag_value(&args, "--config") {
        Some(path) => AnalysisConfig::load(Path::new(path))?,
        None => AnalysisConfig::default(),
    };
    config.seed = parse_arg(&args, "--seed", config.seed);
    if let Some(data) = flag_value(&args, "--data") {
        config.data.prices_file = PathBuf::from(data);
    }
    if let Some(output) = flag_value(&args, "--output") {
        config.data.output_dir = PathBuf::from(output);
    }

    if !json {
        println!("finstudy study-runner");
        println!("  pipeline:  {}", pipeline.name());
        println!("  seed:      {}", config.seed);
        println!("  data:      {}", config.data.prices_file.display());
        println!("  output:    {}", config.data.output_dir.display());
        println!("  db:        {db}");
        println!();
    }

    let store = AnalysisStore::open(db)?;
    store.migrate()?;

    let run_id = new_run_id(pipeline);
    let today = chrono::Local::now().date_naive();
    let seed = config.seed;
    let mut engine = PipelineEngine::build(run_id.clone(), pipeline, config, store, today)?;
    engine.run()?;

    let summary = RunSummary {
        run_id: run_id.clone(),
        pipeline: pipeline.name().to_string(),
        seed,
        events: engine.store().event_count(&run_id)?,
        artifacts: engine
            .context()
            .artifacts
            .iter()
            .map(|(name, path)| (name.clone(), path.display().to_string()))
            .collect(),
        highlights: highlights(engine.context()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// One line per headline result of whatever the pipeline computed.
fn highlights(ctx: &PipelineContext) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(prices) = &ctx.prices {
        out.push(format!("prices: {} rows x {} assets", prices.len(), prices.width()));
    }
    if let Some((a, b, r)) = ctx.correlation.as_ref().and_then(|m| m.strongest_pair()) {
        out.push(format!("strongest correlation: {a}/{b} = {r:.4}"));
    }
    for report in &ctx.stationarity {
        out.push(format!(
            "ADF {}: stat {:.4}, p {:.4}{}",
            report.series,
            report.adf.statistic,
            report.adf.p_value,
            if report.stationary { "" } else { " (non-stationary)" }
        ));
    }
    if let Some(var) = &ctx.var_results {
        out.push(format!("VAR({}) on {} observations", var.k_ar, var.nobs));
    }
    for test in &ctx.causality {
        out.push(format!(
            "{} -> {}: F {:.4}, p {:.4}",
            test.causing.join(","),
            test.caused.join(","),
            test.statistic,
            test.p_value
        ));
    }
    for report in &ctx.granger {
        out.push(format!(
            "granger {} -> {}: min p {:.4}",
            report.pair.cause,
            report.pair.effect,
            report.min_f_p_value()
        ));
    }
    if let Some(last) = ctx.loss_history.last() {
        out.push(format!("final training loss: {last:.6}"));
    }
    out
}

fn print_summary(summary: &RunSummary) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:    {}", summary.run_id);
    println!("  pipeline:  {}", summary.pipeline);
    println!("  events:    {}", summary.events);
    println!();
    println!("=== RESULTS ===");
    if summary.highlights.is_empty() {
        println!("  (nothing to report)");
    }
    for line in &summary.highlights {
        println!("  {line}");
    }
    println!();
    println!("=== ARTIFACTS ===");
    for (name, path) in &summary.artifacts {
        println!("  {name:<28} {path}");
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
