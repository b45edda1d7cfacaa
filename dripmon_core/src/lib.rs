#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core estimation and state engine for a gravity-fed infusion monitor
//! (hardware-agnostic).
//!
//! The engine consumes (raw mass, timestamp) samples and drop-edge
//! timestamps and publishes a per-tick [`Snapshot`] plus discrete
//! [`MonitorEvent`]s. All I/O goes through `dripmon_traits`.
//!
//! ## Architecture
//!
//! - **Weight channel**: three-state Kalman filter (`weight_filter`)
//! - **Drop channel**: edge ingest + two-state Kalman filter
//!   (`drop_ring`, `drip_filter`)
//! - **Coupling**: scalar grams-per-drop estimator (`wpd`)
//! - **Fusion**: two decoupled 1-D estimators (`fusion`)
//! - **Supervision**: state machine, stall/completion detection,
//!   fast convergence (`state`, `monitor`)

pub mod command;
pub mod config;
pub mod conversions;
pub mod drip_filter;
pub mod drop_ring;
pub mod error;
pub mod events;
pub mod fusion;
pub mod hw_error;
pub mod mocks;
pub mod monitor;
pub mod runner;
pub mod snapshot;
pub mod state;
pub mod weight_filter;
pub mod wpd;

pub use command::{ButtonEvent, ButtonKind, Command};
pub use config::{
    DripFilterCfg, FusionCfg, TareCfg, TimingCfg, WeightFilterCfg, WpdCalibrationCfg, WpdCfg,
};
pub use drop_ring::DropEdgeHandle;
pub use events::MonitorEvent;
pub use monitor::{Monitor, MonitorBuilder, TickReport};
pub use snapshot::{Snapshot, CSV_HEADER};
pub use state::SystemState;
