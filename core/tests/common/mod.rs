//! Shared fixtures: seeded synthetic markets and scratch configs.
#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use finstudy_core::{
    config::AnalysisConfig,
    csv_io,
    fetch::MarketDataSource,
    error::{AnalysisError, AnalysisResult},
    frame::PriceFrame,
    rng::StageRng,
    store::AnalysisStore,
    types::Date,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Route `log` output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn day(y: i32, m: u32, d: u32) -> Date {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// `n` consecutive weekdays starting at `start`.
pub fn weekdays(start: Date, n: usize) -> Vec<Date> {
    let mut out = Vec::with_capacity(n);
    let mut d = start;
    while out.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(d);
        }
        d += Duration::days(1);
    }
    out
}

/// Daily returns with a lead-lag link: SPY follows yesterday's BTC.
/// Columns: BTC, SPY, AGG, GLD.
pub fn synthetic_returns(seed: u64, n: usize) -> Vec<[f64; 4]> {
    let mut rng = StageRng::new(seed, 99);
    let mut out: Vec<[f64; 4]> = Vec::with_capacity(n);
    let mut prev_btc = 0.0;
    for _ in 0..n {
        let btc = 0.03 * rng.normal();
        let spy = 0.3 * prev_btc + 0.01 * rng.normal();
        let agg = 0.003 * rng.normal();
        let gld = 0.5 * spy + 0.006 * rng.normal();
        out.push([btc, spy, agg, gld]);
        prev_btc = btc;
    }
    out
}

/// Price table built by compounding `synthetic_returns`.
pub fn synthetic_prices(seed: u64, n: usize) -> PriceFrame {
    let index = weekdays(day(2022, 1, 3), n);
    let mut level = [30_000.0, 450.0, 110.0, 170.0];
    let mut rows = Vec::with_capacity(n);
    for r in synthetic_returns(seed, n) {
        for (l, x) in level.iter_mut().zip(r) {
            *l *= 1.0 + x;
        }
        rows.push(level.to_vec());
    }
    let columns = ["BTC", "SPY", "AGG", "GLD"].iter().map(|s| s.to_string()).collect();
    PriceFrame::new(index, columns, rows).expect("valid synthetic frame")
}

pub fn write_prices(dir: &Path, frame: &PriceFrame) -> PathBuf {
    let path = dir.join("processed_data").join("processed_data.csv");
    csv_io::write_frame(&path, frame).expect("write prices");
    path
}

/// Test config reading `prices` and writing under `dir/output`.
pub fn config_in(dir: &Path, prices: &Path) -> AnalysisConfig {
    let mut config = AnalysisConfig::default_test();
    config.data.prices_file = prices.to_path_buf();
    config.data.output_dir = dir.join("output");
    config.fetch.processed_dir = dir.join("processed_data");
    config
}

pub fn store() -> AnalysisStore {
    let store = AnalysisStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

/// In-memory market data keyed by symbol.
pub struct FakeSource {
    pub series: HashMap<String, Vec<(Date, f64)>>,
    pub fail:   bool,
}

impl FakeSource {
    pub fn from_frame(frame: &PriceFrame, rename: &[(&str, &str)]) -> Self {
        let mut series = HashMap::new();
        for (pos, column) in frame.columns().iter().enumerate() {
            let symbol = rename
                .iter()
                .find(|(from, _)| from == column)
                .map_or(column.clone(), |(_, to)| to.to_string());
            let points = frame.index().iter().copied().zip(frame.column_at(pos)).collect();
            series.insert(symbol, points);
        }
        Self { series, fail: false }
    }

    pub fn failing() -> Self {
        Self { series: HashMap::new(), fail: true }
    }
}

impl MarketDataSource for FakeSource {
    fn name(&self) -> &'static str { "fake" }

    fn daily_closes(&self, symbol: &str, start: Date, end: Date) -> AnalysisResult<Vec<(Date, f64)>> {
        if self.fail {
            return Err(AnalysisError::Fetch {
                symbol: symbol.to_string(),
                reason: "connection refused".into(),
            });
        }
        let points = self.series.get(symbol).ok_or_else(|| AnalysisError::Fetch {
            symbol: symbol.to_string(),
            reason: "unknown symbol".into(),
        })?;
        Ok(points.iter().copied().filter(|(d, _)| *d >= start && *d <= end).collect())
    }
}
