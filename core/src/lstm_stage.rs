//! Trains the recurrent feature extractor on normalized prices and writes
//! its loss history, features and feature correlation.

use crate::{
    csv_io,
    error::AnalysisResult,
    event::AnalysisEvent,
    lstm::{extract_features, feature_correlation, train, AssetRelationshipModel, LstmConfig, WindowDataset},
    rng::StageRng,
    stage::{AnalysisStage, PipelineContext, SeriesInput},
};

pub struct LstmStage;

impl AnalysisStage for LstmStage {
    fn name(&self) -> &'static str { "lstm" }

    fn run(&mut self, ctx: &mut PipelineContext, rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let normalized = ctx.series(SeriesInput::Normalized, self.name())?;
        let labels = normalized.columns().to_vec();
        let config = LstmConfig::for_width(&ctx.config.lstm, normalized.width());
        let dataset = WindowDataset::from_frame(normalized, config.seq_length)?;
        log::info!(
            "Training LSTM on {} windows of {} steps ({} assets)",
            dataset.len(),
            config.seq_length,
            config.input_size
        );

        let mut model = AssetRelationshipModel::new(&config, rng)?;
        let history = train(&mut model, &dataset, &config, rng)?;
        let features = extract_features(&model, &dataset);
        let corr = feature_correlation(&features, &labels)?;

        let mut events: Vec<AnalysisEvent> = history
            .iter()
            .enumerate()
            .map(|(i, loss)| AnalysisEvent::TrainingEpochCompleted { epoch: i + 1, loss: *loss })
            .collect();
        events.push(AnalysisEvent::FeaturesExtracted {
            rows:    features.len(),
            columns: labels.len(),
        });

        let loss_rows: Vec<Vec<f64>> = history
            .iter()
            .enumerate()
            .map(|(i, loss)| vec![(i + 1) as f64, *loss])
            .collect();
        let path = ctx.output_path("lstm_loss_history.csv");
        csv_io::write_rows(&path, &["epoch".to_string(), "loss".to_string()], &loss_rows)?;
        events.push(ctx.record_artifact("lstm_loss_history", &path));

        let path = ctx.output_path("lstm_features.csv");
        csv_io::write_rows(&path, &labels, &features)?;
        events.push(ctx.record_artifact("lstm_features", &path));

        let path = ctx.output_path("lstm_correlation.csv");
        csv_io::write_matrix(&path, &corr.labels, &corr.values)?;
        events.push(ctx.record_artifact("lstm_correlation", &path));

        ctx.loss_history = history;
        ctx.features = features;
        ctx.feature_correlation = Some(corr);
        Ok(events)
    }
}
