use crate::var::InfoCriterion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Merged price table every analysis pipeline starts from.
    pub prices_file: PathBuf,
    /// Directory receiving CSV artifacts.
    pub output_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            prices_file: PathBuf::from("processed_data/processed_data.csv"),
            output_dir:  PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub tickers:          Vec<String>,
    pub crypto_symbol:    String,
    /// Column name the crypto close is stored under.
    pub crypto_column:    String,
    pub lookback_days:    i64,
    pub processed_dir:    PathBuf,
    pub yahoo_base_url:   String,
    pub binance_base_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            tickers:          vec!["SPY".into(), "AGG".into(), "GLD".into()],
            crypto_symbol:    "BTC/USDT".into(),
            crypto_column:    "BTC".into(),
            lookback_days:    1095,
            processed_dir:    PathBuf::from("processed_data"),
            yahoo_base_url:   "https://query1.finance.yahoo.com".into(),
            binance_base_url: "https://api.binance.com".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub base_asset:     String,
    pub compare_assets: Vec<String>,
    pub window:         usize,
    pub weak_threshold: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            base_asset:     "BTC".into(),
            compare_assets: vec!["SPY".into(), "GLD".into(), "AGG".into()],
            window:         30,
            weak_threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VarConfig {
    /// Lag order of the fixed-lag model.
    pub lags:           usize,
    /// Upper bound of the lag search; `None` uses the sample-size rule.
    pub select_maxlags: Option<usize>,
    pub criterion:      InfoCriterion,
    pub forecast_steps: usize,
    pub granger_maxlag: usize,
    /// (effect, cause) pairs.
    pub granger_pairs:  Vec<(String, String)>,
    /// Asset whose influence on every other column is tested.
    pub base_asset:     String,
    pub adf_alpha:      f64,
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            lags:           5,
            select_maxlags: None,
            criterion:      InfoCriterion::Aic,
            forecast_steps: 10,
            granger_maxlag: 5,
            granger_pairs:  vec![("BTC".into(), "SPY".into()), ("SPY".into(), "BTC".into())],
            base_asset:     "BTC".into(),
            adf_alpha:      0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmSection {
    pub hidden_size:   usize,
    pub num_layers:    usize,
    pub seq_length:    usize,
    pub batch_size:    usize,
    pub epochs:        usize,
    pub learning_rate: f64,
}

impl Default for LstmSection {
    fn default() -> Self {
        Self {
            hidden_size:   64,
            num_layers:    2,
            seq_length:    10,
            batch_size:    32,
            epochs:        10,
            learning_rate: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub seed:        u64,
    pub data:        DataConfig,
    pub fetch:       FetchConfig,
    pub correlation: CorrelationConfig,
    pub var:         VarConfig,
    pub lstm:        LstmSection,
}

impl AnalysisConfig {
    /// Load from a JSON file. Missing sections and fields keep their defaults.
    /// In tests, use AnalysisConfig::default_test().
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.correlation.window < 2 {
            anyhow::bail!("correlation.window must be at least 2");
        }
        if self.lstm.seq_length == 0 || self.lstm.batch_size == 0 || self.lstm.num_layers == 0 {
            anyhow::bail!("lstm.seq_length, lstm.batch_size and lstm.num_layers must be positive");
        }
        if !(0.0..1.0).contains(&self.var.adf_alpha) {
            anyhow::bail!("var.adf_alpha must lie in [0, 1)");
        }
        Ok(())
    }

    /// Small, fast settings for tests.
    pub fn default_test() -> Self {
        Self {
            seed: 42,
            data: DataConfig::default(),
            fetch: FetchConfig { lookback_days: 120, ..FetchConfig::default() },
            correlation: CorrelationConfig { window: 10, ..CorrelationConfig::default() },
            var: VarConfig {
                lags: 2,
                select_maxlags: Some(4),
                forecast_steps: 5,
                granger_maxlag: 3,
                ..VarConfig::default()
            },
            lstm: LstmSection {
                hidden_size: 8,
                num_layers: 2,
                seq_length: 5,
                batch_size: 16,
                epochs: 3,
                learning_rate: 1e-2,
            },
        }
    }
}
