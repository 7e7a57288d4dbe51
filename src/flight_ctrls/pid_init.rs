//! This module derives the rate loop's scalar constants from a `ControlProfile`. It's run once
//! per configuration change (and after the loop period changes); the result replaces the
//! previous set wholesale.

use crate::{
    flight_ctrls::common::{Axis, MixerFeedback, PerAxis},
    state::{ControlProfile, DTERM_SETPOINT_WEIGHT_MAX},
};

// Scaling factors for PIDs, for a usable tuning range of the integer codes.
const PTERM_SCALE: f32 = 0.032029;
const ITERM_SCALE: f32 = 0.244381;
const DTERM_SCALE: f32 = 0.000529;

/// Gains for a single axis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidCoeffs {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Everything the rate loop needs from the profile, pre-computed.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResolvedGains {
    pub coeffs: PerAxis<PidCoeffs>,
    /// Max setpoint change per cycle, in deg/s. 0 disables acceleration limiting.
    pub max_velocity: PerAxis<f32>,
    /// 0 - 1. Portion of the setpoint fed into the D term.
    pub dterm_setpoint_weight: f32,
    /// Set if the profile's relax ratio is below 100%.
    pub setpoint_relax: bool,
    pub relax_factor: f32,
    /// Angle mode: deg/s of setpoint per degree of angle error.
    pub level_gain: f32,
    /// Horizon mode: as `level_gain`, before scaling by horizon strength.
    pub horizon_gain: f32,
    pub horizon_transition: f32,
    /// Degrees.
    pub level_angle_limit: f32,
    /// Degrees at full stick.
    pub level_sensitivity: f32,
    /// 0 - 1. Fraction of motor mix range above which iterm growth is scaled back.
    pub iterm_windup_point: f32,
    pub iterm_windup_point_inv: f32,
    /// A tricopter yaws with a servo; throttle attenuation doesn't apply to it.
    pub disable_tpa_for_yaw: bool,
}

impl Default for ResolvedGains {
    /// No control authority: all gains 0, no limiting.
    fn default() -> Self {
        Self {
            coeffs: PerAxis::default(),
            max_velocity: PerAxis::default(),
            dterm_setpoint_weight: 0.,
            setpoint_relax: false,
            relax_factor: 1.,
            level_gain: 0.,
            horizon_gain: 0.,
            horizon_transition: 0.,
            level_angle_limit: 0.,
            level_sensitivity: 0.,
            iterm_windup_point: 0.,
            iterm_windup_point_inv: 1.,
            disable_tpa_for_yaw: false,
        }
    }
}

impl ResolvedGains {
    /// `dt` is the loop period, in seconds. The profile must pass `ControlProfile::validate`;
    /// in particular, a windup point of 100% has no inverse.
    pub fn new(profile: &ControlProfile, dt: f32, mixer: &impl MixerFeedback) -> Self {
        let mut coeffs = PerAxis::default();
        for axis in Axis::ALL {
            let codes = profile.pid[axis];
            coeffs[axis] = PidCoeffs {
                kp: PTERM_SCALE * codes.p as f32,
                ki: ITERM_SCALE * codes.i as f32,
                kd: DTERM_SCALE * codes.d as f32,
            };
        }

        // Limits are in deg/s per ms.
        let rate_accel = profile.rate_accel_limit * 1_000. * dt;
        let max_velocity = PerAxis::new([
            rate_accel,
            rate_accel,
            profile.yaw_rate_accel_limit * 1_000. * dt,
        ]);

        let iterm_windup_point = profile.iterm_windup_point_percent as f32 / 100.;

        Self {
            coeffs,
            max_velocity,
            dterm_setpoint_weight: profile.dterm_setpoint_weight as f32
                / DTERM_SETPOINT_WEIGHT_MAX as f32,
            setpoint_relax: profile.setpoint_relax_ratio < 100,
            relax_factor: 1. / (profile.setpoint_relax_ratio as f32 / 100.),
            level_gain: profile.level.p as f32 / 10.,
            horizon_gain: profile.level.i as f32 / 10.,
            // A small code makes this large, keeping full self-level strength further out.
            horizon_transition: 100. / profile.level.d as f32,
            level_angle_limit: profile.level_angle_limit as f32,
            level_sensitivity: profile.level_sensitivity,
            iterm_windup_point,
            iterm_windup_point_inv: 1. / (1. - iterm_windup_point),
            disable_tpa_for_yaw: mixer.tri_mixer_in_use(),
        }
    }
}
