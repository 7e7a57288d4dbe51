//! Attitude-rate PID core for multirotor flight controllers.
//!
//! Converts rate (or angle) setpoints and gyro readings into per-axis P, I and D corrections
//! for a motor mixer, once per control cycle. Everything the loop needs between cycles
//! (integrators, filter history, resolved gains) is owned by a single
//! [`RateController`](flight_ctrls::pid::RateController).
//!
//! [Betaflight Signal flow diagram](https://github.com/betaflight/betaflight/wiki/Signal-Flow-Diagram)

#![cfg_attr(not(test), no_std)]

use cfg_if::cfg_if;

// Logging is only used on configuration paths; never from the per-cycle update.
cfg_if! {
    if #[cfg(feature = "defmt")] {
        macro_rules! info {
            ($($arg:tt)*) => { defmt::info!($($arg)*) };
        }
        macro_rules! warn {
            ($($arg:tt)*) => { defmt::warn!($($arg)*) };
        }
    } else {
        macro_rules! info {
            ($($arg:tt)*) => { log::info!($($arg)*) };
        }
        macro_rules! warn {
            ($($arg:tt)*) => { log::warn!($($arg)*) };
        }
    }
}

pub mod flight_ctrls;
pub mod state;
mod util;

pub use flight_ctrls::{
    common::{
        tpa_factor, Axis, CycleInputs, LevelMode, MixerFeedback, MixerStatus, PerAxis,
        PidAxisData, PidStabilisationState, AXIS_COUNT,
    },
    filters::{DtermFilters, Filter},
    pid::RateController,
    pid_init::{PidCoeffs, ResolvedGains},
};
pub use state::{ConfigError, ControlProfile, DtermFilterType, PidCodes};
