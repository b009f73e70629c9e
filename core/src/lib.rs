//! finstudy-core: cross-asset correlation and causality analysis.
//!
//! Every analysis is a pipeline of stages driven by `engine::PipelineEngine`.
//! The numeric building blocks (frames, correlation, ADF, VAR, LSTM) are
//! usable on their own.

pub mod config;
pub mod correlation;
pub mod correlation_stage;
pub mod csv_io;
pub mod data_stage;
pub mod engine;
pub mod error;
pub mod event;
pub mod fetch;
pub mod frame;
pub mod granger;
pub mod lstm;
pub mod lstm_stage;
pub mod ols;
pub mod rng;
pub mod stage;
pub mod stationarity;
pub mod store;
pub mod types;
pub mod var;
pub mod var_stage;
