//! Stages that acquire and shape the price table: fetch, load, clean,
//! returns and normalization.

use crate::{
    csv_io,
    error::AnalysisResult,
    event::AnalysisEvent,
    fetch::{self, MarketDataSource},
    frame::PriceFrame,
    rng::StageRng,
    stage::{date_label, AnalysisStage, PipelineContext, SeriesInput},
};

fn loaded_event(source: String, frame: &PriceFrame) -> AnalysisEvent {
    AnalysisEvent::DataLoaded {
        source,
        rows:       frame.len(),
        columns:    frame.columns().to_vec(),
        first_date: date_label(frame.first_date()),
        last_date:  date_label(frame.last_date()),
    }
}

/// Downloads traditional and crypto closes and writes the merged table.
pub struct FetchStage {
    traditional: Box<dyn MarketDataSource>,
    crypto:      Box<dyn MarketDataSource>,
}

impl FetchStage {
    pub fn new(traditional: Box<dyn MarketDataSource>, crypto: Box<dyn MarketDataSource>) -> Self {
        Self { traditional, crypto }
    }
}

impl AnalysisStage for FetchStage {
    fn name(&self) -> &'static str { "fetch" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let frame = fetch::process_data(
            self.traditional.as_ref(),
            self.crypto.as_ref(),
            &ctx.config.fetch,
            ctx.today,
        )?;
        let source = format!("{}+{}", self.traditional.name(), self.crypto.name());
        let mut events = vec![loaded_event(source, &frame)];
        let path = ctx.config.fetch.processed_dir.join(fetch::PROCESSED_FILE_NAME);
        events.push(ctx.record_artifact("processed_data", &path));
        ctx.prices = Some(frame);
        Ok(events)
    }
}

/// Reads the configured price CSV.
pub struct LoadStage;

impl AnalysisStage for LoadStage {
    fn name(&self) -> &'static str { "load" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let path = ctx.config.data.prices_file.clone();
        let frame = csv_io::read_frame(&path)?;
        log::info!(
            "Loaded {} rows of {} from {}",
            frame.len(),
            frame.columns().join(", "),
            path.display()
        );
        let head = frame.head(5);
        for (date, row) in head.index().iter().zip(head.rows()) {
            log::debug!("  {date} {row:?}");
        }
        let event = loaded_event(path.display().to_string(), &frame);
        ctx.prices = Some(frame);
        Ok(vec![event])
    }
}

/// Reports missing cells, then fills them forward and backward.
pub struct CleanStage;

impl AnalysisStage for CleanStage {
    fn name(&self) -> &'static str { "clean" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let prices = ctx.series(SeriesInput::Prices, self.name())?;
        let counts = prices.missing_counts();
        log::info!("Missing values per column:");
        for (column, count) in &counts {
            log::info!("  {column}: {count}");
        }
        let filled = prices.fill_forward().fill_backward();
        if let (Some(first), Some(last)) = (filled.first_date(), filled.last_date()) {
            log::info!("Data index range: {first} to {last}");
        }
        ctx.prices = Some(filled);
        Ok(vec![AnalysisEvent::MissingValuesReported { counts }])
    }
}

/// Simple daily returns of the price table.
pub struct ReturnsStage;

impl AnalysisStage for ReturnsStage {
    fn name(&self) -> &'static str { "returns" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let returns = ctx.series(SeriesInput::Prices, self.name())?.pct_change();
        if let (Some(first), Some(last)) = (returns.first_date(), returns.last_date()) {
            log::info!("Returns data starts from: {first}");
            log::info!("Returns data ends at: {last}");
        }
        let rows = returns.len();
        ctx.returns = Some(returns);
        Ok(vec![AnalysisEvent::ReturnsComputed { rows }])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Divide by the column maximum.
    ByMax,
    /// Scale to [0, 1].
    MinMax,
}

/// Normalizes prices, optionally writing the result.
pub struct NormalizeStage {
    mode:     NormalizeMode,
    artifact: Option<&'static str>,
}

impl NormalizeStage {
    pub fn new(mode: NormalizeMode) -> Self {
        Self { mode, artifact: None }
    }

    /// Also write the normalized table as `<name>.csv`.
    pub fn writing(mut self, name: &'static str) -> Self {
        self.artifact = Some(name);
        self
    }
}

impl AnalysisStage for NormalizeStage {
    fn name(&self) -> &'static str { "normalize" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let prices = ctx.series(SeriesInput::Prices, self.name())?;
        let normalized = match self.mode {
            NormalizeMode::ByMax => prices.normalize_by_max(),
            NormalizeMode::MinMax => prices.normalize_min_max(),
        };
        let mut events = Vec::new();
        if let Some(name) = self.artifact {
            let path = ctx.output_path(&format!("{name}.csv"));
            csv_io::write_frame(&path, &normalized)?;
            events.push(ctx.record_artifact(name, &path));
        }
        ctx.normalized = Some(normalized);
        Ok(events)
    }
}
