//! This module contains the persistent PID profile: the user-configurable settings the rate
//! loop is built from. Loading and saving it (eg to onboard flash) is the caller's job; this
//! core only reads it when filters or gains are (re)initialized.

use num_enum::TryFromPrimitive; // Enum from integer
use thiserror::Error;

use crate::flight_ctrls::common::PerAxis;

/// Largest D-term setpoint weight code; the code is divided by this to get a 0 - 1 weight.
pub const DTERM_SETPOINT_WEIGHT_MAX: u8 = 127;

/// Maximum level-mode inclination we accept in a profile, in degrees.
const LEVEL_ANGLE_LIMIT_MAX: u8 = 90;

/// Filter topology for the D-term lowpass. Repr u8 is the code used by stored profiles.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DtermFilterType {
    /// First order
    Pt1 = 0,
    /// Second order, Butterworth Q
    Biquad = 1,
    /// Moving-average denoise
    Fir = 2,
}

impl Default for DtermFilterType {
    fn default() -> Self {
        Self::Biquad
    }
}

/// Raw P, I and D codes for one PID, as tuned by the user. Scaled into gains by
/// `pid_init`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidCodes {
    pub p: u8,
    pub i: u8,
    pub d: u8,
}

impl PidCodes {
    pub const fn new(p: u8, i: u8, d: u8) -> Self {
        Self { p, i, d }
    }
}

/// A profile is rejected if any of these hold. These are the preconditions the rate loop
/// relies on; it doesn't re-check them at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("iterm windup point must be below 100%, got {0}%")]
    WindupPoint(u8),
    #[error("horizon transition must be 1 - 100, got {0}")]
    HorizonTransition(u8),
    #[error("dterm setpoint weight must be at most 127, got {0}")]
    DtermSetpointWeight(u8),
    #[error("level angle limit must be at most 90 degrees, got {0}")]
    LevelAngleLimit(u8),
    #[error("rate acceleration limit must be finite and non-negative, got {0}")]
    RateAccelLimit(f32),
}

/// User-configurable settings for the rate loop. Immutable between configuration loads.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlProfile {
    /// Rate PID codes for roll, pitch and yaw.
    pub pid: PerAxis<PidCodes>,
    /// Self-level codes. P is the angle-mode gain, I the horizon gain, and D the horizon
    /// transition; larger D keeps self-level authority further into stick travel.
    pub level: PidCodes,
    /// D-term lowpass cutoff, in Hz. 0 disables it.
    pub dterm_lpf_hz: u16,
    pub dterm_filter_type: DtermFilterType,
    /// D-term notch center, in Hz. 0 disables it.
    pub dterm_notch_hz: u16,
    /// Lower edge of the D-term notch, in Hz.
    pub dterm_notch_cutoff: u16,
    /// Additional lowpass on the yaw P term, when the yaw axis is too noisy. In Hz; 0 disables it.
    pub yaw_lpf_hz: u16,
    /// How much of the setpoint feeds the D term. 0 is pure derivative-on-measurement;
    /// 127 is derivative-on-error.
    pub dterm_setpoint_weight: u8,
    /// Percent. Below 100, the setpoint weight is reduced further with stick deflection.
    pub setpoint_relax_ratio: u8,
    /// Iterm windup threshold, percent of motor mix range.
    pub iterm_windup_point_percent: u8,
    /// Acceleration limit for roll and pitch setpoints, in deg/s per ms. 0 disables it.
    pub rate_accel_limit: f32,
    /// Acceleration limit for the yaw setpoint, in deg/s per ms. 0 disables it.
    pub yaw_rate_accel_limit: f32,
    /// Max angle in level mode, in degrees.
    pub level_angle_limit: u8,
    /// Degrees of commanded inclination at full stick, before `level_angle_limit` applies.
    pub level_sensitivity: f32,
}

impl Default for ControlProfile {
    fn default() -> Self {
        Self {
            pid: PerAxis::new([
                PidCodes::new(44, 40, 30),
                PidCodes::new(58, 50, 35),
                PidCodes::new(70, 45, 20),
            ]),
            level: PidCodes::new(50, 50, 100),
            dterm_lpf_hz: 100,
            dterm_filter_type: DtermFilterType::Biquad,
            dterm_notch_hz: 260,
            dterm_notch_cutoff: 160,
            yaw_lpf_hz: 0,
            dterm_setpoint_weight: 60,
            setpoint_relax_ratio: 100,
            iterm_windup_point_percent: 50,
            rate_accel_limit: 0.,
            yaw_rate_accel_limit: 10.,
            level_angle_limit: 55,
            level_sensitivity: 55.,
        }
    }
}

impl ControlProfile {
    /// Check the preconditions the rate loop assumes. Run this when loading a profile, before
    /// passing it to `RateController::init_config` or `init_filters`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterm_windup_point_percent >= 100 {
            return Err(ConfigError::WindupPoint(self.iterm_windup_point_percent));
        }

        if self.level.d == 0 || self.level.d > 100 {
            return Err(ConfigError::HorizonTransition(self.level.d));
        }

        if self.dterm_setpoint_weight > DTERM_SETPOINT_WEIGHT_MAX {
            return Err(ConfigError::DtermSetpointWeight(self.dterm_setpoint_weight));
        }

        if self.level_angle_limit > LEVEL_ANGLE_LIMIT_MAX {
            return Err(ConfigError::LevelAngleLimit(self.level_angle_limit));
        }

        for limit in [self.rate_accel_limit, self.yaw_rate_accel_limit] {
            if !limit.is_finite() || limit < 0. {
                return Err(ConfigError::RateAccelLimit(limit));
            }
        }

        Ok(())
    }
}
