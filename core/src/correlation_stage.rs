//! Correlation stages: the returns correlation matrix with rolling
//! comparisons, and the weak-correlation screen.

use crate::{
    correlation::{correlation_matrix, rolling_correlation_multi, weakly_correlated},
    csv_io,
    error::AnalysisResult,
    event::AnalysisEvent,
    rng::StageRng,
    stage::{AnalysisStage, PipelineContext, SeriesInput},
};

/// Pearson matrix of returns plus rolling correlation of the base asset
/// against each compare asset.
pub struct CorrelationStage;

impl AnalysisStage for CorrelationStage {
    fn name(&self) -> &'static str { "correlation" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let returns = ctx.series(SeriesInput::Returns, self.name())?;
        let matrix = correlation_matrix(returns);
        let cfg = ctx.config.correlation.clone();
        let rolling = if returns.has_column(&cfg.base_asset) {
            rolling_correlation_multi(returns, &cfg.base_asset, &cfg.compare_assets, cfg.window)?
        } else {
            log::warn!("Base asset {} not found in data", cfg.base_asset);
            None
        };

        log::info!("Correlation Matrix:");
        for (label, row) in matrix.labels.iter().zip(&matrix.values) {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:>8.4}")).collect();
            log::info!("  {label:<6} {}", cells.join(" "));
        }

        let mut events = vec![AnalysisEvent::CorrelationComputed {
            labels: matrix.labels.clone(),
            values: matrix.values.clone(),
        }];
        let path = ctx.output_path("correlation_matrix.csv");
        csv_io::write_matrix(&path, &matrix.labels, &matrix.values)?;
        events.push(ctx.record_artifact("correlation_matrix", &path));

        match &rolling {
            Some(frame) => {
                let path = ctx.output_path("rolling_correlation_multi.csv");
                csv_io::write_frame(&path, frame)?;
                events.push(ctx.record_artifact("rolling_correlation_multi", &path));
            }
            None => events.push(AnalysisEvent::StageWarning {
                stage:   self.name().to_string(),
                message: "No valid assets to compare. Skipping rolling correlation.".into(),
            }),
        }

        ctx.correlation = Some(matrix);
        ctx.rolling_correlation = rolling;
        Ok(events)
    }
}

/// Assets whose correlation with the base asset stays under the threshold;
/// their series are written for inspection.
pub struct WeakCorrelationStage {
    input: SeriesInput,
}

impl WeakCorrelationStage {
    pub fn new(input: SeriesInput) -> Self {
        Self { input }
    }
}

impl AnalysisStage for WeakCorrelationStage {
    fn name(&self) -> &'static str { "weak_correlation" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let frame = ctx.series(self.input, self.name())?;
        let base = ctx.config.correlation.base_asset.clone();
        let threshold = ctx.config.correlation.weak_threshold;
        if !frame.has_column(&base) {
            return Ok(vec![AnalysisEvent::StageWarning {
                stage:   self.name().to_string(),
                message: format!("Base asset {base} not found in data"),
            }]);
        }

        let matrix = correlation_matrix(frame);
        let weak = weakly_correlated(&matrix, &base, threshold)?;
        let names: Vec<&str> = weak.iter().map(|(a, _)| a.as_str()).collect();
        let selected = if names.is_empty() { None } else { Some(frame.select(&names)?) };

        let mut events = vec![AnalysisEvent::WeakCorrelationFound {
            base,
            threshold,
            assets: weak,
        }];
        if let Some(series) = selected {
            let path = ctx.output_path("weakly_correlated_assets.csv");
            csv_io::write_frame(&path, &series)?;
            events.push(ctx.record_artifact("weakly_correlated_assets", &path));
        }
        Ok(events)
    }
}
