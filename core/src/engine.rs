//! The pipeline engine: runs the stages of one analysis in a fixed order.
//!
//! EXECUTION ORDER per pipeline (fixed, documented, never reordered):
//!   process      fetch
//!   correlation  load, returns, correlation
//!   var          load, returns, stationarity, var_fit(fixed lags), granger, forecast
//!   var-select   load, clean, normalize(by max), var_fit(selected lags),
//!                causality, weak_correlation
//!   lstm         load, normalize(min-max), lstm
//!
//! RULES:
//!   - Stages execute in registration order, once per run.
//!   - Stages share data only through the PipelineContext.
//!   - All randomness flows through the RngBank.
//!   - Every event is recorded in the event log.
//!   - The first failing stage aborts the run.

use crate::{
    config::{AnalysisConfig, FetchConfig},
    correlation_stage::{CorrelationStage, WeakCorrelationStage},
    data_stage::{CleanStage, FetchStage, LoadStage, NormalizeMode, NormalizeStage, ReturnsStage},
    error::{AnalysisError, AnalysisResult},
    event::{AnalysisEvent, EventLogEntry},
    fetch::{BinanceClient, MarketDataSource, YahooClient},
    lstm_stage::LstmStage,
    rng::{RngBank, StageSlot},
    stage::{AnalysisStage, PipelineContext, SeriesInput},
    store::AnalysisStore,
    types::{Date, RunId},
    var_stage::{CausalityStage, ForecastStage, GrangerStage, LagChoice, StationarityStage, VarFitStage},
};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Process,
    Correlation,
    Var,
    VarSelect,
    Lstm,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 5] =
        [Self::Process, Self::Correlation, Self::Var, Self::VarSelect, Self::Lstm];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Process     => "process",
            Self::Correlation => "correlation",
            Self::Var         => "var",
            Self::VarSelect   => "var-select",
            Self::Lstm        => "lstm",
        }
    }
}

impl FromStr for PipelineKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| AnalysisError::Other(anyhow::anyhow!("unknown pipeline '{s}'")))
    }
}

/// Where the process pipeline gets its prices.
pub struct MarketSources {
    pub traditional: Box<dyn MarketDataSource>,
    pub crypto:      Box<dyn MarketDataSource>,
}

impl MarketSources {
    /// Yahoo for tickers, Binance for the crypto pair.
    pub fn live(config: &FetchConfig) -> AnalysisResult<Self> {
        Ok(Self {
            traditional: Box::new(YahooClient::new(&config.yahoo_base_url)?),
            crypto:      Box::new(BinanceClient::new(&config.binance_base_url)?),
        })
    }
}

/// Fresh run identifier, e.g. `var-5f0c…`.
pub fn new_run_id(kind: PipelineKind) -> RunId {
    format!("{}-{}", kind.name(), uuid::Uuid::new_v4().simple())
}

pub struct PipelineEngine {
    pub run_id:   RunId,
    pub kind:     PipelineKind,
    pub rng_bank: RngBank,
    seed:         u64,
    stages:       Vec<(StageSlot, Box<dyn AnalysisStage>)>,
    context:      PipelineContext,
    store:        AnalysisStore,
}

impl PipelineEngine {
    pub fn new(run_id: RunId, kind: PipelineKind, context: PipelineContext, store: AnalysisStore) -> Self {
        let seed = context.config.seed;
        Self {
            run_id,
            kind,
            rng_bank: RngBank::new(seed),
            seed,
            stages: Vec::new(),
            context,
            store,
        }
    }

    /// Fully wired engine for `kind`. The process pipeline talks to the
    /// live market-data endpoints.
    pub fn build(
        run_id: RunId,
        kind: PipelineKind,
        config: AnalysisConfig,
        store: AnalysisStore,
        today: Date,
    ) -> AnalysisResult<Self> {
        let sources = match kind {
            PipelineKind::Process => Some(MarketSources::live(&config.fetch)?),
            _ => None,
        };
        Self::assemble(run_id, kind, config, store, today, sources)
    }

    /// Same as `build`, with injected market-data sources.
    pub fn build_with_sources(
        run_id: RunId,
        kind: PipelineKind,
        config: AnalysisConfig,
        store: AnalysisStore,
        today: Date,
        sources: MarketSources,
    ) -> AnalysisResult<Self> {
        Self::assemble(run_id, kind, config, store, today, Some(sources))
    }

    fn assemble(
        run_id: RunId,
        kind: PipelineKind,
        config: AnalysisConfig,
        store: AnalysisStore,
        today: Date,
        sources: Option<MarketSources>,
    ) -> AnalysisResult<Self> {
        let fixed_lags = config.var.lags;
        let mut engine = Self::new(run_id, kind, PipelineContext::new(config, today), store);

        // EXECUTION ORDER: fixed, documented, never reordered.
        match kind {
            PipelineKind::Process => {
                let sources = sources.ok_or(AnalysisError::MissingInput {
                    name:    "fetch",
                    missing: "market data sources",
                })?;
                engine.register(StageSlot::Fetch, Box::new(FetchStage::new(sources.traditional, sources.crypto)));
            }
            PipelineKind::Correlation => {
                engine.register(StageSlot::Load, Box::new(LoadStage));
                engine.register(StageSlot::Returns, Box::new(ReturnsStage));
                engine.register(StageSlot::Correlation, Box::new(CorrelationStage));
            }
            PipelineKind::Var => {
                engine.register(StageSlot::Load, Box::new(LoadStage));
                engine.register(StageSlot::Returns, Box::new(ReturnsStage));
                engine.register(StageSlot::Stationarity, Box::new(StationarityStage::new(SeriesInput::Returns)));
                engine.register(
                    StageSlot::Var,
                    Box::new(VarFitStage::new(SeriesInput::Returns, LagChoice::Fixed(fixed_lags))),
                );
                engine.register(StageSlot::Granger, Box::new(GrangerStage::new(SeriesInput::Returns)));
                engine.register(StageSlot::Forecast, Box::new(ForecastStage));
            }
            PipelineKind::VarSelect => {
                engine.register(StageSlot::Load, Box::new(LoadStage));
                engine.register(StageSlot::Clean, Box::new(CleanStage));
                engine.register(
                    StageSlot::Normalize,
                    Box::new(NormalizeStage::new(NormalizeMode::ByMax).writing("normalized_prices")),
                );
                engine.register(
                    StageSlot::Var,
                    Box::new(VarFitStage::new(SeriesInput::Normalized, LagChoice::Selected)),
                );
                engine.register(StageSlot::Var, Box::new(CausalityStage));
                engine.register(
                    StageSlot::Correlation,
                    Box::new(WeakCorrelationStage::new(SeriesInput::Normalized)),
                );
            }
            PipelineKind::Lstm => {
                engine.register(StageSlot::Load, Box::new(LoadStage));
                engine.register(StageSlot::Normalize, Box::new(NormalizeStage::new(NormalizeMode::MinMax)));
                engine.register(StageSlot::Lstm, Box::new(LstmStage));
            }
        }
        Ok(engine)
    }

    /// Register a stage. Call in the documented execution order.
    pub fn register(&mut self, slot: StageSlot, stage: Box<dyn AnalysisStage>) {
        self.stages.push((slot, stage));
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|(_, s)| s.name()).collect()
    }

    /// Execute every stage once. Returns all emitted events in order.
    pub fn run(&mut self) -> AnalysisResult<Vec<AnalysisEvent>> {
        let started_at = chrono::Utc::now().to_rfc3339();
        self.store.insert_run(
            &self.run_id,
            self.seed,
            self.kind.name(),
            env!("CARGO_PKG_VERSION"),
            &started_at,
        )?;
        log::info!("Run {} started: pipeline {} seed {}", self.run_id, self.kind.name(), self.seed);

        let init = AnalysisEvent::RunInitialized {
            run_id:   self.run_id.clone(),
            seed:     self.seed,
            pipeline: self.kind.name().to_string(),
        };
        self.persist(0, "engine", &init)?;
        let mut all_events = vec![init];

        for (position, (slot, stage)) in self.stages.iter_mut().enumerate() {
            let seq = position as u64 + 1;
            let name = stage.name();
            let mut rng = self.rng_bank.for_stage(*slot);

            let mut events = vec![AnalysisEvent::StageStarted { stage: name.to_string() }];
            match stage.run(&mut self.context, &mut rng) {
                Ok(emitted) => events.extend(emitted),
                Err(e) => {
                    log::error!("Stage {name} failed: {e}");
                    return Err(e);
                }
            }
            events.push(AnalysisEvent::StageCompleted { stage: name.to_string() });

            for event in &events {
                persist_event(&self.store, &self.run_id, seq, name, event)?;
            }
            all_events.extend(events);
        }
        Ok(all_events)
    }

    fn persist(&self, seq: u64, stage: &str, event: &AnalysisEvent) -> AnalysisResult<()> {
        persist_event(&self.store, &self.run_id, seq, stage, event)
    }

    pub fn context(&self) -> &PipelineContext { &self.context }

    pub fn store(&self) -> &AnalysisStore { &self.store }

    /// Persisted log of this run, in emission order.
    pub fn store_events(&self) -> AnalysisResult<Vec<EventLogEntry>> {
        self.store.events_for_run(&self.run_id)
    }
}

fn persist_event(
    store: &AnalysisStore,
    run_id: &str,
    seq: u64,
    stage: &str,
    event: &AnalysisEvent,
) -> AnalysisResult<()> {
    let entry = EventLogEntry {
        id:         None,
        run_id:     run_id.to_string(),
        seq,
        stage:      stage.to_string(),
        event_type: event.type_name().to_string(),
        payload:    serde_json::to_string(event)?,
    };
    store.append_event(&entry)
}
