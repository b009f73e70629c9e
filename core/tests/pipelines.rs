mod common;

use common::{config_in, day, init_logging, store, synthetic_prices, write_prices, FakeSource};
use finstudy_core::{
    config::AnalysisConfig,
    csv_io,
    engine::{MarketSources, PipelineEngine, PipelineKind},
    error::AnalysisError,
    event::AnalysisEvent,
};
use std::path::Path;

fn engine_for(kind: PipelineKind, config: AnalysisConfig, run_id: &str) -> PipelineEngine {
    init_logging();
    PipelineEngine::build(run_id.to_string(), kind, config, store(), day(2023, 1, 2)).unwrap()
}

fn prepared(dir: &Path, rows: usize) -> AnalysisConfig {
    let prices = write_prices(dir, &synthetic_prices(17, rows));
    config_in(dir, &prices)
}

#[test]
fn pipeline_names_round_trip() {
    for kind in PipelineKind::ALL {
        assert_eq!(kind.name().parse::<PipelineKind>().unwrap(), kind);
    }
    assert!("arima".parse::<PipelineKind>().is_err());
}

/// Stages run in the documented order and every event lands in the log.
#[test]
fn correlation_pipeline_writes_matrix_and_rolling() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_for(PipelineKind::Correlation, prepared(dir.path(), 120), "corr-1");
    assert_eq!(engine.stage_names(), vec!["load", "returns", "correlation"]);

    let events = engine.run().unwrap();
    assert!(matches!(events[0], AnalysisEvent::RunInitialized { seed: 42, .. }));

    let ctx = engine.context();
    let matrix = ctx.correlation.as_ref().unwrap();
    assert_eq!(matrix.labels, vec!["BTC", "SPY", "AGG", "GLD"]);
    let rolling = ctx.rolling_correlation.as_ref().unwrap();
    assert_eq!(rolling.columns(), &["BTC_vs_SPY", "BTC_vs_GLD", "BTC_vs_AGG"]);
    assert_eq!(rolling.len(), ctx.returns.as_ref().unwrap().len());

    let matrix_file = ctx.artifact("correlation_matrix").unwrap();
    let text = std::fs::read_to_string(matrix_file).unwrap();
    assert!(text.starts_with(",BTC,SPY,AGG,GLD"));
    assert!(ctx.artifact("rolling_correlation_multi").unwrap().exists());

    let logged = engine.store_events().unwrap();
    assert_eq!(logged.len(), events.len());
    assert_eq!(logged[0].seq, 0);
    assert_eq!(logged[0].stage, "engine");
    assert!(logged.windows(2).all(|w| w[0].seq <= w[1].seq));
    assert_eq!(engine.store().events_of_type("corr-1", "stage_completed").unwrap().len(), 3);
}

#[test]
fn var_pipeline_tests_stationarity_granger_and_forecasts() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_for(PipelineKind::Var, prepared(dir.path(), 260), "var-1");
    assert_eq!(
        engine.stage_names(),
        vec!["load", "returns", "stationarity", "var_fit", "granger", "forecast"]
    );
    engine.run().unwrap();
    let ctx = engine.context();

    assert_eq!(ctx.stationarity.len(), 4);
    assert_eq!(ctx.stationarity[0].series, "BTC Returns");
    assert!(ctx.stationarity.iter().all(|r| r.stationary));

    let var = ctx.var_results.as_ref().unwrap();
    assert_eq!(var.k_ar, 2);

    // Configured pairs are (BTC, SPY) and (SPY, BTC); SPY follows BTC.
    assert_eq!(ctx.granger.len(), 2);
    assert_eq!(ctx.granger[1].pair.effect, "SPY");
    assert!(ctx.granger[1].min_f_p_value() < 1e-3);

    let forecast = ctx.forecast.as_ref().unwrap();
    assert_eq!(forecast.len(), 5);
    let last = ctx.returns.as_ref().unwrap().last_date().unwrap();
    assert_eq!(forecast.first_date(), Some(last + chrono::Duration::days(1)));

    let written = csv_io::read_frame(ctx.artifact("forecast").unwrap()).unwrap();
    assert_eq!(written.columns(), forecast.columns());
    assert!(ctx.artifact("granger_causality").unwrap().exists());
}

#[test]
fn var_select_pipeline_runs_causality_on_normalized_prices() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_for(PipelineKind::VarSelect, prepared(dir.path(), 200), "vs-1");
    engine.run().unwrap();
    let ctx = engine.context();

    let normalized = ctx.normalized.as_ref().unwrap();
    for pos in 0..normalized.width() {
        let max = normalized.column_at(pos).into_iter().fold(f64::MIN, f64::max);
        assert!((max - 1.0).abs() < 1e-12);
    }
    assert!(ctx.artifact("normalized_prices").unwrap().exists());

    let selection = ctx.lag_selection.as_ref().unwrap();
    assert_eq!(selection.maxlags, 4);
    let var = ctx.var_results.as_ref().unwrap();
    assert!(var.k_ar >= 1);

    // Each other asset's lags tested in the BTC equation.
    assert_eq!(ctx.causality.len(), 3);
    assert!(ctx.causality.iter().all(|t| t.caused == vec!["BTC".to_string()]));
    let causing: Vec<&str> = ctx.causality.iter().map(|t| t.causing[0].as_str()).collect();
    assert_eq!(causing, vec!["SPY", "AGG", "GLD"]);

    let report = std::fs::read_to_string(ctx.artifact("causality_results").unwrap()).unwrap();
    let mut lines = report.lines();
    assert_eq!(lines.next(), Some("cause,effect,f_stat,p_value,df_num,df_den,significant"));
    assert!(lines.next().unwrap().starts_with("BTC,SPY,"));

    let weak = engine.store().events_of_type("vs-1", "weak_correlation_found").unwrap();
    assert_eq!(weak.len(), 1);
}

#[test]
fn lstm_pipeline_records_every_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_for(PipelineKind::Lstm, prepared(dir.path(), 90), "lstm-1");
    engine.run().unwrap();
    let ctx = engine.context();

    assert_eq!(ctx.loss_history.len(), 3);
    assert_eq!(ctx.features.len(), 90 - 5);
    assert_eq!(ctx.feature_correlation.as_ref().unwrap().size(), 4);
    for name in ["lstm_loss_history", "lstm_features", "lstm_correlation"] {
        assert!(ctx.artifact(name).unwrap().exists(), "{name} missing");
    }
    let epochs = engine.store().events_of_type("lstm-1", "training_epoch_completed").unwrap();
    assert_eq!(epochs.len(), 3);
}

/// Same seed, same data: the persisted payloads are identical.
#[test]
fn lstm_runs_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let config = prepared(dir.path(), 70);
    let payloads = |config: AnalysisConfig| -> Vec<String> {
        let mut engine = engine_for(PipelineKind::Lstm, config, "lstm-det");
        engine.run().unwrap();
        engine.store_events().unwrap().into_iter().map(|e| e.payload).collect()
    };
    assert_eq!(payloads(config.clone()), payloads(config));
}

#[test]
fn missing_price_file_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), &dir.path().join("nope.csv"));
    let mut engine = engine_for(PipelineKind::Correlation, config, "corr-missing");
    assert!(matches!(engine.run(), Err(AnalysisError::Csv(_))));
    assert!(engine.context().correlation.is_none());
}

#[test]
fn process_pipeline_merges_fake_sources() {
    let dir = tempfile::tempdir().unwrap();
    let market = synthetic_prices(8, 200);
    let mut config = AnalysisConfig::default_test();
    config.fetch.processed_dir = dir.path().join("processed_data");
    let sources = MarketSources {
        traditional: Box::new(FakeSource::from_frame(&market, &[])),
        crypto:      Box::new(FakeSource::from_frame(&market, &[("BTC", "BTC/USDT")])),
    };
    init_logging();
    let mut engine = PipelineEngine::build_with_sources(
        "proc-1".into(),
        PipelineKind::Process,
        config,
        store(),
        day(2022, 9, 1),
        sources,
    )
    .unwrap();
    engine.run().unwrap();

    let path = dir.path().join("processed_data").join("processed_data.csv");
    let written = csv_io::read_frame(&path).unwrap();
    assert_eq!(written.columns(), &["SPY", "AGG", "GLD", "BTC"]);
    assert!(written.first_date().unwrap() >= day(2022, 5, 4));
    assert!(written.last_date().unwrap() <= day(2022, 9, 1));
    assert_eq!(engine.context().prices.as_ref().unwrap().len(), written.len());
}

#[test]
fn process_pipeline_fails_without_crypto_data() {
    let dir = tempfile::tempdir().unwrap();
    let market = synthetic_prices(8, 200);
    let mut config = AnalysisConfig::default_test();
    config.fetch.processed_dir = dir.path().join("processed_data");
    let sources = MarketSources {
        traditional: Box::new(FakeSource::from_frame(&market, &[])),
        crypto:      Box::new(FakeSource::failing()),
    };
    let mut engine = PipelineEngine::build_with_sources(
        "proc-2".into(),
        PipelineKind::Process,
        config,
        store(),
        day(2022, 9, 1),
        sources,
    )
    .unwrap();
    let err = engine.run().unwrap_err();
    assert!(matches!(err, AnalysisError::InsufficientData(ref m) if m.starts_with("Failed to process data")));
    assert!(!dir.path().join("processed_data").join("processed_data.csv").exists());
}
