use finstudy_core::{config::AnalysisConfig, var::InfoCriterion};
use std::fs;

#[test]
fn defaults_match_the_study_setup() {
    let config = AnalysisConfig::default();
    assert_eq!(config.fetch.tickers, vec!["SPY", "AGG", "GLD"]);
    assert_eq!(config.fetch.crypto_symbol, "BTC/USDT");
    assert_eq!(config.fetch.lookback_days, 1095);
    assert_eq!(config.correlation.window, 30);
    assert_eq!(config.var.lags, 5);
    assert_eq!(config.var.criterion, InfoCriterion::Aic);
    assert_eq!(config.lstm.hidden_size, 64);
    assert!(config.validate().is_ok());
    assert!(AnalysisConfig::default_test().validate().is_ok());
}

/// Missing sections keep their defaults.
#[test]
fn partial_json_overrides_only_given_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.json");
    fs::write(
        &path,
        r#"{ "seed": 7, "var": { "lags": 3, "criterion": "bic" }, "lstm": { "epochs": 2 } }"#,
    )
    .unwrap();

    let config = AnalysisConfig::load(&path).unwrap();
    assert_eq!(config.seed, 7);
    assert_eq!(config.var.lags, 3);
    assert_eq!(config.var.criterion, InfoCriterion::Bic);
    assert_eq!(config.var.forecast_steps, 10);
    assert_eq!(config.lstm.epochs, 2);
    assert_eq!(config.lstm.seq_length, 10);
    assert_eq!(config.correlation.base_asset, "BTC");
}

#[test]
fn invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"{ "correlation": { "window": 1 } }"#).unwrap();
    assert!(AnalysisConfig::load(&path).is_err());

    let mut config = AnalysisConfig::default();
    config.lstm.batch_size = 0;
    assert!(config.validate().is_err());

    assert!(AnalysisConfig::load(&dir.path().join("missing.json")).is_err());
}
