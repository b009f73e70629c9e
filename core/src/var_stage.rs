//! Time-series stages: stationarity checks, VAR estimation, causality
//! tests and forecasting.

use crate::{
    csv_io,
    error::{AnalysisError, AnalysisResult},
    event::AnalysisEvent,
    granger::{granger_causality, GrangerPair},
    rng::StageRng,
    stage::{date_label, AnalysisStage, PipelineContext, SeriesInput},
    stationarity::check_stationarity,
    var::{CausalityKind, VarModel},
};
use chrono::Duration;

/// ADF test on every column of the input.
pub struct StationarityStage {
    input: SeriesInput,
}

impl StationarityStage {
    pub fn new(input: SeriesInput) -> Self {
        Self { input }
    }
}

impl AnalysisStage for StationarityStage {
    fn name(&self) -> &'static str { "stationarity" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let frame = ctx.series(self.input, self.name())?;
        let suffix = match self.input {
            SeriesInput::Returns => " Returns",
            _ => "",
        };
        let alpha = ctx.config.var.adf_alpha;

        let mut events = Vec::new();
        let mut reports = Vec::new();
        for (pos, column) in frame.columns().iter().enumerate() {
            let name = format!("{column}{suffix}");
            match check_stationarity(&frame.column_at(pos), &name, alpha) {
                Ok(report) => {
                    events.push(AnalysisEvent::StationarityChecked {
                        series:     report.series.clone(),
                        statistic:  report.adf.statistic,
                        p_value:    report.adf.p_value,
                        used_lag:   report.adf.used_lag,
                        stationary: report.stationary,
                    });
                    reports.push(report);
                }
                Err(e) => {
                    log::error!("Error checking stationarity for {name}: {e}");
                    events.push(AnalysisEvent::StageWarning {
                        stage:   self.name().to_string(),
                        message: format!("{name}: {e}"),
                    });
                }
            }
        }
        ctx.stationarity = reports;
        Ok(events)
    }
}

/// How the VAR lag order is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagChoice {
    Fixed(usize),
    /// Minimum of the configured information criterion.
    Selected,
}

pub struct VarFitStage {
    input: SeriesInput,
    lags:  LagChoice,
}

impl VarFitStage {
    pub fn new(input: SeriesInput, lags: LagChoice) -> Self {
        Self { input, lags }
    }
}

impl AnalysisStage for VarFitStage {
    fn name(&self) -> &'static str { "var_fit" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let model = VarModel::new(ctx.series(self.input, self.name())?)?;
        let mut events = Vec::new();

        let lags = match self.lags {
            LagChoice::Fixed(p) => p,
            LagChoice::Selected => {
                let criterion = ctx.config.var.criterion;
                let selection = model.select_order(ctx.config.var.select_maxlags)?;
                log::info!("Optimal Lag Order:\n{}", selection.summary());
                let best = selection.selected(criterion);
                log::info!("Best lag order: {best}");
                events.push(AnalysisEvent::LagOrderSelected {
                    criterion: criterion.name().to_string(),
                    selected:  best,
                    maxlags:   selection.maxlags,
                });
                ctx.lag_selection = Some(selection);
                best
            }
        };

        let results = model.fit(lags)?;
        log::info!("\n{}", results.summary());
        let ic = results.info_criteria();
        events.push(AnalysisEvent::VarFitted {
            k_ar: results.k_ar,
            nobs: results.nobs,
            aic:  ic.aic,
            bic:  ic.bic,
        });
        ctx.var_results = Some(results);
        Ok(events)
    }
}

/// F-test of every other asset's lags in the base asset's equation.
/// The report keeps the `cause = base, effect = other` labelling.
pub struct CausalityStage;

impl AnalysisStage for CausalityStage {
    fn name(&self) -> &'static str { "causality" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let results = ctx.require_var(self.name())?;
        let base = ctx.config.var.base_asset.clone();
        if !results.names.contains(&base) {
            return Ok(vec![AnalysisEvent::StageWarning {
                stage:   self.name().to_string(),
                message: format!("Base asset {base} not found in the VAR model"),
            }]);
        }
        if results.k_ar == 0 {
            log::warn!("Selected lag order is 0; no lag coefficients to test");
            return Ok(vec![AnalysisEvent::StageWarning {
                stage:   self.name().to_string(),
                message: "VAR has no lags; causality is untestable".into(),
            }]);
        }

        let mut tests = Vec::new();
        for other in results.names.iter().filter(|n| **n != base) {
            let test = results.test_causality(&[base.as_str()], &[other.as_str()], CausalityKind::F)?;
            log::info!("Causality of {base} on {other}:");
            log::info!("{}", test.summary());
            tests.push(test);
        }

        let mut events: Vec<AnalysisEvent> = tests
            .iter()
            .map(|t| AnalysisEvent::CausalityTested {
                caused:    t.caused.clone(),
                causing:   t.causing.clone(),
                statistic: t.statistic,
                p_value:   t.p_value,
                reject:    t.reject,
            })
            .collect();

        let records: Vec<Vec<String>> = tests
            .iter()
            .map(|t| {
                vec![
                    t.caused.join("+"),
                    t.causing.join("+"),
                    t.statistic.to_string(),
                    t.p_value.to_string(),
                    t.df_num.to_string(),
                    t.df_den.map(|d| d.to_string()).unwrap_or_default(),
                    t.reject.to_string(),
                ]
            })
            .collect();
        let path = ctx.output_path("causality_results.csv");
        csv_io::write_table(
            &path,
            &["cause", "effect", "f_stat", "p_value", "df_num", "df_den", "significant"],
            &records,
        )?;
        events.push(ctx.record_artifact("causality_results", &path));
        ctx.causality = tests;
        Ok(events)
    }
}

/// Pairwise Granger tests for the configured (effect, cause) pairs.
pub struct GrangerStage {
    input: SeriesInput,
}

impl GrangerStage {
    pub fn new(input: SeriesInput) -> Self {
        Self { input }
    }
}

impl AnalysisStage for GrangerStage {
    fn name(&self) -> &'static str { "granger" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let frame = ctx.series(self.input, self.name())?;
        let maxlag = ctx.config.var.granger_maxlag;
        let pairs: Vec<GrangerPair> = ctx
            .config
            .var
            .granger_pairs
            .iter()
            .map(|(effect, cause)| GrangerPair::new(effect, cause))
            .collect();
        let reports = granger_causality(frame, &pairs, maxlag);

        let mut events: Vec<AnalysisEvent> = reports
            .iter()
            .map(|r| AnalysisEvent::GrangerTested {
                effect: r.pair.effect.clone(),
                cause: r.pair.cause.clone(),
                maxlag,
                min_f_p_value: r.min_f_p_value(),
            })
            .collect();
        if reports.len() < pairs.len() {
            events.push(AnalysisEvent::StageWarning {
                stage:   self.name().to_string(),
                message: format!("{} of {} pairs could not be tested", pairs.len() - reports.len(), pairs.len()),
            });
        }

        let mut records = Vec::new();
        for report in &reports {
            for l in &report.lags {
                records.push(vec![
                    report.pair.effect.clone(),
                    report.pair.cause.clone(),
                    l.lag.to_string(),
                    l.ssr_ftest.statistic.to_string(),
                    l.ssr_ftest.p_value.to_string(),
                    l.ssr_chi2test.statistic.to_string(),
                    l.ssr_chi2test.p_value.to_string(),
                    l.lrtest.statistic.to_string(),
                    l.lrtest.p_value.to_string(),
                ]);
            }
        }
        let path = ctx.output_path("granger_causality.csv");
        csv_io::write_table(
            &path,
            &["effect", "cause", "lag", "ssr_f", "ssr_f_p", "ssr_chi2", "ssr_chi2_p", "lr", "lr_p"],
            &records,
        )?;
        events.push(ctx.record_artifact("granger_causality", &path));
        ctx.granger = reports;
        Ok(events)
    }
}

/// Recursive forecast dated from the day after the sample ends.
pub struct ForecastStage;

impl AnalysisStage for ForecastStage {
    fn name(&self) -> &'static str { "forecast" }

    fn run(&mut self, ctx: &mut PipelineContext, _rng: &mut StageRng) -> AnalysisResult<Vec<AnalysisEvent>> {
        let results = ctx.require_var(self.name())?;
        let steps = ctx.config.var.forecast_steps;
        let last_date = results
            .last_date()
            .ok_or_else(|| AnalysisError::InsufficientData("VAR sample has no dates".into()))?;
        let forecast = results.forecast_frame(steps, last_date + Duration::days(1))?;

        let (start_date, end_date) = (
            date_label(forecast.first_date()).unwrap_or_default(),
            date_label(forecast.last_date()).unwrap_or_default(),
        );
        log::info!("Forecast data starts from: {start_date}");
        log::info!("Forecast data ends at: {end_date}");

        let mut events = vec![AnalysisEvent::ForecastProduced { steps, start_date, end_date }];
        let path = ctx.output_path("forecast.csv");
        csv_io::write_frame(&path, &forecast)?;
        events.push(ctx.record_artifact("forecast", &path));
        ctx.forecast = Some(forecast);
        Ok(events)
    }
}
