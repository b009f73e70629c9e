//! The event log: the record of everything a run observed and produced.
//!
//! RULE: Stages report ONLY through events and the shared context.
//! A stage may never call another stage directly.

use crate::types::{AssetId, RunId};
use serde::{Deserialize, Serialize};

/// Every event emitted during a run.
/// Variants are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    // ── Engine events ──────────────────────────────
    RunInitialized {
        run_id:   RunId,
        seed:     u64,
        pipeline: String,
    },
    StageStarted {
        stage: String,
    },
    StageCompleted {
        stage: String,
    },
    StageWarning {
        stage:   String,
        message: String,
    },

    // ── Data events ────────────────────────────────
    DataLoaded {
        source:     String,
        rows:       usize,
        columns:    Vec<AssetId>,
        first_date: Option<String>,
        last_date:  Option<String>,
    },
    MissingValuesReported {
        counts: Vec<(AssetId, usize)>,
    },
    ReturnsComputed {
        rows: usize,
    },

    // ── Correlation events ─────────────────────────
    CorrelationComputed {
        labels: Vec<AssetId>,
        values: Vec<Vec<f64>>,
    },
    WeakCorrelationFound {
        base:      AssetId,
        threshold: f64,
        assets:    Vec<(AssetId, f64)>,
    },

    // ── Time-series events ─────────────────────────
    StationarityChecked {
        series:     String,
        statistic:  f64,
        p_value:    f64,
        used_lag:   usize,
        stationary: bool,
    },
    LagOrderSelected {
        criterion: String,
        selected:  usize,
        maxlags:   usize,
    },
    VarFitted {
        k_ar: usize,
        nobs: usize,
        aic:  f64,
        bic:  f64,
    },
    CausalityTested {
        caused:    Vec<AssetId>,
        causing:   Vec<AssetId>,
        statistic: f64,
        p_value:   f64,
        reject:    bool,
    },
    GrangerTested {
        effect:        AssetId,
        cause:         AssetId,
        maxlag:        usize,
        min_f_p_value: f64,
    },
    ForecastProduced {
        steps:      usize,
        start_date: String,
        end_date:   String,
    },

    // ── Model events ───────────────────────────────
    TrainingEpochCompleted {
        epoch: usize,
        loss:  f64,
    },
    FeaturesExtracted {
        rows:    usize,
        columns: usize,
    },

    // ── Output events ──────────────────────────────
    ArtifactWritten {
        name: String,
        path: String,
    },
}

impl AnalysisEvent {
    /// Stable name used for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }         => "run_initialized",
            Self::StageStarted { .. }           => "stage_started",
            Self::StageCompleted { .. }         => "stage_completed",
            Self::StageWarning { .. }           => "stage_warning",
            Self::DataLoaded { .. }             => "data_loaded",
            Self::MissingValuesReported { .. }  => "missing_values_reported",
            Self::ReturnsComputed { .. }        => "returns_computed",
            Self::CorrelationComputed { .. }    => "correlation_computed",
            Self::WeakCorrelationFound { .. }   => "weak_correlation_found",
            Self::StationarityChecked { .. }    => "stationarity_checked",
            Self::LagOrderSelected { .. }       => "lag_order_selected",
            Self::VarFitted { .. }              => "var_fitted",
            Self::CausalityTested { .. }        => "causality_tested",
            Self::GrangerTested { .. }          => "granger_tested",
            Self::ForecastProduced { .. }       => "forecast_produced",
            Self::TrainingEpochCompleted { .. } => "training_epoch_completed",
            Self::FeaturesExtracted { .. }      => "features_extracted",
            Self::ArtifactWritten { .. }        => "artifact_written",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    /// Position of the emitting stage in the pipeline; 0 for the engine.
    pub seq:        u64,
    pub stage:      String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized AnalysisEvent
}
