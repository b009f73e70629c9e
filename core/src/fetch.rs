//! Daily close acquisition from public market-data endpoints.
//!
//! RULE: fetch failures never abort a run. They are logged and surface as an
//! empty frame; `process_data` is the single place that turns "nothing came
//! back" into an error.

use crate::{
    config::FetchConfig,
    csv_io,
    error::{AnalysisError, AnalysisResult},
    frame::PriceFrame,
    types::Date,
};
use chrono::{Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Binance returns at most this many candles per request.
const KLINES_PAGE_LIMIT: usize = 1000;

pub const PROCESSED_FILE_NAME: &str = "processed_data.csv";

/// Anything that can produce a daily close series for a symbol.
pub trait MarketDataSource: Send {
    fn name(&self) -> &'static str;

    /// (date, close) points within the requested window, in any order.
    fn daily_closes(&self, symbol: &str, start: Date, end: Date) -> AnalysisResult<Vec<(Date, f64)>>;
}

// ── Yahoo Finance ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct YahooResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooChartData>>,
    error:  Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code:        String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    timestamp:  Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote:    Vec<YahooQuote>,
    #[serde(default)]
    adjclose: Option<Vec<YahooAdjClose>>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Yahoo chart API client. Prefers the adjusted close.
pub struct YahooClient {
    base_url: String,
    client:   reqwest::blocking::Client,
}

impl YahooClient {
    pub fn new(base_url: &str) -> AnalysisResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client:   reqwest::blocking::Client::builder().user_agent("Mozilla/5.0").build()?,
        })
    }
}

impl MarketDataSource for YahooClient {
    fn name(&self) -> &'static str { "yahoo" }

    /// `end` is exclusive, as in the download helpers analysts are used to.
    fn daily_closes(&self, symbol: &str, start: Date, end: Date) -> AnalysisResult<Vec<(Date, f64)>> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&period1={}&period2={}",
            self.base_url,
            symbol,
            epoch_seconds(start),
            epoch_seconds(end)
        );
        log::debug!("Fetching Yahoo data from: {url}");

        let response: YahooResponse = self.client.get(&url).send()?.error_for_status()?.json()?;
        if let Some(err) = response.chart.error {
            return Err(AnalysisError::Fetch {
                symbol: symbol.to_string(),
                reason: format!("{} - {}", err.code, err.description),
            });
        }
        let data = response
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| AnalysisError::Fetch {
                symbol: symbol.to_string(),
                reason: "empty chart result".into(),
            })?;

        let closes: Vec<Option<f64>> = match data.indicators.adjclose.and_then(|a| a.into_iter().next()) {
            Some(adj) => adj.adjclose,
            None => data
                .indicators
                .quote
                .into_iter()
                .next()
                .map(|q| q.close)
                .unwrap_or_default(),
        };

        let mut points = Vec::with_capacity(data.timestamp.len());
        for (ts, close) in data.timestamp.iter().zip(closes) {
            let (Some(close), Some(when)) = (close, Utc.timestamp_opt(*ts, 0).single()) else {
                continue;
            };
            let date = when.date_naive();
            if date >= start && date < end {
                points.push((date, close));
            }
        }
        log::info!("Fetched {} data points for {symbol}", points.len());
        Ok(points)
    }
}

// ── Binance ─────────────────────────────────────────────────────────

/// Binance spot klines client. Symbols may be written `BTC/USDT`.
pub struct BinanceClient {
    base_url: String,
    client:   reqwest::blocking::Client,
}

impl BinanceClient {
    pub fn new(base_url: &str) -> AnalysisResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client:   reqwest::blocking::Client::builder().build()?,
        })
    }

    fn page(&self, symbol: &str, start_ms: i64) -> AnalysisResult<Vec<Vec<Value>>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval=1d&startTime={}&limit={}",
            self.base_url, symbol, start_ms, KLINES_PAGE_LIMIT
        );
        log::debug!("Fetching Binance klines from: {url}");
        Ok(self.client.get(&url).send()?.error_for_status()?.json()?)
    }
}

impl MarketDataSource for BinanceClient {
    fn name(&self) -> &'static str { "binance" }

    /// Both ends inclusive.
    fn daily_closes(&self, symbol: &str, start: Date, end: Date) -> AnalysisResult<Vec<(Date, f64)>> {
        let pair = symbol.replace('/', "");
        let end_ms = epoch_seconds(end + Duration::days(1)) * 1000;
        let mut cursor = epoch_seconds(start) * 1000;
        let mut points = Vec::new();

        while cursor < end_ms {
            let candles = self.page(&pair, cursor)?;
            let count = candles.len();
            let mut last_open = None;
            for candle in candles {
                let (open_ms, close) = parse_kline(symbol, &candle)?;
                last_open = Some(open_ms);
                let Some(when) = Utc.timestamp_millis_opt(open_ms).single() else {
                    continue;
                };
                let date = when.date_naive();
                if date >= start && date <= end {
                    points.push((date, close));
                }
            }
            match last_open {
                Some(open) if count == KLINES_PAGE_LIMIT => cursor = open + 1,
                _ => break,
            }
        }
        log::info!("Fetched {} candles for {symbol}", points.len());
        Ok(points)
    }
}

/// Kline rows are arrays: [open time, open, high, low, close, ...] with
/// prices encoded as strings.
fn parse_kline(symbol: &str, candle: &[Value]) -> AnalysisResult<(i64, f64)> {
    let bad = |what: &str| AnalysisError::Fetch {
        symbol: symbol.to_string(),
        reason: format!("malformed kline: {what}"),
    };
    let open_ms = candle.first().and_then(Value::as_i64).ok_or_else(|| bad("open time"))?;
    let close = match candle.get(4) {
        Some(Value::String(s)) => s.parse::<f64>().map_err(|_| bad("close"))?,
        Some(v) => v.as_f64().ok_or_else(|| bad("close"))?,
        None => return Err(bad("close")),
    };
    Ok((open_ms, close))
}

fn epoch_seconds(date: Date) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt).timestamp())
        .unwrap_or_default()
}

// ── Assembly ────────────────────────────────────────────────────────

/// One column per ticker, joined on common dates. Empty on failure.
pub fn fetch_traditional_assets(
    source: &dyn MarketDataSource,
    tickers: &[String],
    start: Date,
    end: Date,
) -> PriceFrame {
    match try_fetch_traditional(source, tickers, start, end) {
        Ok(frame) => {
            log::info!("Traditional assets fetched successfully.");
            frame
        }
        Err(e) => {
            log::error!("Error fetching traditional assets: {e}");
            PriceFrame::empty(Vec::new())
        }
    }
}

fn try_fetch_traditional(
    source: &dyn MarketDataSource,
    tickers: &[String],
    start: Date,
    end: Date,
) -> AnalysisResult<PriceFrame> {
    let mut merged: Option<PriceFrame> = None;
    for ticker in tickers {
        let points = source.daily_closes(ticker, start, end)?;
        if points.is_empty() {
            return Err(AnalysisError::Fetch {
                symbol: ticker.clone(),
                reason: "no rows returned".into(),
            });
        }
        let frame = PriceFrame::from_series(ticker, &points);
        merged = Some(match merged {
            Some(acc) => acc.inner_join(&frame)?,
            None => frame,
        });
    }
    merged.ok_or_else(|| AnalysisError::InsufficientData("no tickers requested".into()))
}

/// Close series for one crypto pair, stored under `column`. Empty on failure.
pub fn fetch_crypto_closes(
    source: &dyn MarketDataSource,
    symbol: &str,
    column: &str,
    start: Date,
    end: Date,
) -> PriceFrame {
    match source.daily_closes(symbol, start, end) {
        Ok(points) => {
            log::info!("Crypto data fetched successfully.");
            PriceFrame::from_series(column, &points)
        }
        Err(e) => {
            log::error!("Error fetching crypto data: {e}");
            PriceFrame::empty(Vec::new())
        }
    }
}

/// Fetch both sides over the lookback window ending `today`, merge them
/// and write `processed_data.csv` under `config.processed_dir`.
pub fn process_data(
    traditional: &dyn MarketDataSource,
    crypto: &dyn MarketDataSource,
    config: &FetchConfig,
    today: Date,
) -> AnalysisResult<PriceFrame> {
    let start = today - Duration::days(config.lookback_days);
    let traditional_data = fetch_traditional_assets(traditional, &config.tickers, start, today);
    let crypto_data =
        fetch_crypto_closes(crypto, &config.crypto_symbol, &config.crypto_column, start, today);

    if traditional_data.is_empty() || crypto_data.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "Failed to process data: insufficient data available.".into(),
        ));
    }

    let combined = traditional_data.inner_join(&crypto_data)?.drop_na();
    let output = config.processed_dir.join(PROCESSED_FILE_NAME);
    csv_io::write_frame(&output, &combined)?;
    log::info!("Data processing completed successfully. Data saved to {}", output.display());
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kline_close_parses_from_string_or_number() {
        let candle = json!([1_700_000_000_000i64, "1.0", "2.0", "0.5", "36500.25", "10"]);
        let row = candle.as_array().unwrap();
        assert_eq!(parse_kline("BTC/USDT", row).unwrap(), (1_700_000_000_000, 36500.25));

        let candle = json!([1_700_000_000_000i64, 1.0, 2.0, 0.5, 42.5]);
        assert_eq!(parse_kline("BTC/USDT", candle.as_array().unwrap()).unwrap().1, 42.5);
    }

    #[test]
    fn malformed_kline_is_a_fetch_error() {
        let candle = json!(["soon", "1.0"]);
        let err = parse_kline("BTC/USDT", candle.as_array().unwrap()).unwrap_err();
        assert!(matches!(err, AnalysisError::Fetch { ref symbol, .. } if symbol == "BTC/USDT"));
    }

    #[test]
    fn epoch_seconds_is_utc_midnight() {
        let date = chrono::NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(epoch_seconds(date), 86_400);
    }

    #[test]
    fn yahoo_chart_payload_deserializes() {
        let body = json!({
            "chart": {
                "result": [{
                    "timestamp": [1704205800, 1704292200],
                    "indicators": {
                        "quote": [{ "close": [472.65, null] }],
                        "adjclose": [{ "adjclose": [468.79, 467.28] }]
                    }
                }],
                "error": null
            }
        });
        let response: YahooResponse = serde_json::from_value(body).unwrap();
        let data = response.chart.result.unwrap().remove(0);
        assert_eq!(data.timestamp.len(), 2);
        assert_eq!(data.indicators.quote[0].close, vec![Some(472.65), None]);
        assert_eq!(data.indicators.adjclose.unwrap()[0].adjclose[1], Some(467.28));
    }
}
