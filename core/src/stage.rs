//! Stage trait and the context stages share.
//!
//! RULE: Every pipeline step implements AnalysisStage.
//! The engine calls run() on each registered stage in registration order.
//! A stage reads what earlier stages left in the PipelineContext and
//! writes its own outputs back; it never calls another stage.

use crate::{
    config::AnalysisConfig,
    correlation::CorrelationMatrix,
    error::{AnalysisError, AnalysisResult},
    event::AnalysisEvent,
    frame::PriceFrame,
    granger::GrangerReport,
    rng::StageRng,
    stationarity::StationarityReport,
    types::Date,
    var::{CausalityTest, LagOrderSelection, VarResults},
};
use std::path::{Path, PathBuf};

/// The contract every stage must fulfill.
pub trait AnalysisStage: Send {
    /// Unique stable name for this stage.
    fn name(&self) -> &'static str;

    /// Called once per run by the engine.
    ///
    /// - `ctx`: outputs of earlier stages; this stage adds its own
    /// - `rng`: this stage's deterministic RNG
    ///
    /// Returns the events to append to the run's event log.
    fn run(&mut self, ctx: &mut PipelineContext, rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>>;
}

/// Which frame a stage operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesInput {
    Prices,
    Returns,
    Normalized,
}

impl SeriesInput {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Prices => "prices",
            Self::Returns => "returns",
            Self::Normalized => "normalized prices",
        }
    }
}

/// Everything stages hand to each other during one run.
pub struct PipelineContext {
    pub config:              AnalysisConfig,
    /// Reference date for fetch windows.
    pub today:               Date,
    pub prices:              Option<PriceFrame>,
    pub returns:             Option<PriceFrame>,
    pub normalized:          Option<PriceFrame>,
    pub correlation:         Option<CorrelationMatrix>,
    pub rolling_correlation: Option<PriceFrame>,
    pub stationarity:        Vec<StationarityReport>,
    pub lag_selection:       Option<LagOrderSelection>,
    pub var_results:         Option<VarResults>,
    pub causality:           Vec<CausalityTest>,
    pub granger:             Vec<GrangerReport>,
    pub forecast:            Option<PriceFrame>,
    pub loss_history:        Vec<f64>,
    pub features:            Vec<Vec<f64>>,
    pub feature_correlation: Option<CorrelationMatrix>,
    /// (artifact name, path) in write order.
    pub artifacts:           Vec<(String, PathBuf)>,
}

impl PipelineContext {
    pub fn new(config: AnalysisConfig, today: Date) -> Self {
        Self {
            config,
            today,
            prices: None,
            returns: None,
            normalized: None,
            correlation: None,
            rolling_correlation: None,
            stationarity: Vec::new(),
            lag_selection: None,
            var_results: None,
            causality: Vec::new(),
            granger: Vec::new(),
            forecast: None,
            loss_history: Vec::new(),
            features: Vec::new(),
            feature_correlation: None,
            artifacts: Vec::new(),
        }
    }

    pub fn series(&self, input: SeriesInput, stage: &'static str) -> AnalysisResult<&PriceFrame> {
        let frame = match input {
            SeriesInput::Prices => self.prices.as_ref(),
            SeriesInput::Returns => self.returns.as_ref(),
            SeriesInput::Normalized => self.normalized.as_ref(),
        };
        frame.ok_or(AnalysisError::MissingInput { name: stage, missing: input.label() })
    }

    pub fn require_var(&self, stage: &'static str) -> AnalysisResult<&VarResults> {
        self.var_results
            .as_ref()
            .ok_or(AnalysisError::MissingInput { name: stage, missing: "a fitted VAR model" })
    }

    /// Path of an output file inside the configured output directory.
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.config.data.output_dir.join(file_name)
    }

    /// Register a written file and return the matching event.
    pub fn record_artifact(&mut self, name: &str, path: &Path) -> AnalysisEvent {
        log::info!("{name} saved to {}", path.display());
        self.artifacts.push((name.to_string(), path.to_path_buf()));
        AnalysisEvent::ArtifactWritten {
            name: name.to_string(),
            path: path.display().to_string(),
        }
    }

    pub fn artifact(&self, name: &str) -> Option<&Path> {
        self.artifacts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.as_path())
    }
}

/// "YYYY-MM-DD" for event payloads.
pub fn date_label(date: Option<Date>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}
