//! Shapes the raw rate setpoint before it reaches the PID: acceleration limiting on all axes,
//! then angle or horizon self-leveling on roll and pitch.

use crate::{
    flight_ctrls::{
        common::{Axis, CycleInputs, LevelMode, PerAxis},
        pid_init::ResolvedGains,
    },
    util::{constrain, max},
};

/// Remembers the last shaped setpoint per axis, so we can limit its rate of change.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetpointShaper {
    previous_setpoint: PerAxis<f32>,
}

impl SetpointShaper {
    /// Limit the setpoint's change since last cycle to `max_velocity`, keeping its direction.
    /// The caller skips this when `max_velocity` is 0.
    pub fn acceleration_limit(&mut self, axis: Axis, setpoint: f32, max_velocity: f32) -> f32 {
        let previous = self.previous_setpoint[axis];
        let velocity = setpoint - previous;

        let result = if velocity > max_velocity {
            previous + max_velocity
        } else if velocity < -max_velocity {
            previous - max_velocity
        } else {
            setpoint
        };

        self.previous_setpoint[axis] = result;
        result
    }

    pub fn previous_setpoint(&self, axis: Axis) -> f32 {
        self.previous_setpoint[axis]
    }
}

/// Strength of horizon-mode self-leveling; 1. at center stick, fading to 0. as the most
/// deflected of roll and pitch approaches full travel. 0. if `horizon_transition` is 0 or
/// less.
pub fn horizon_level_strength(horizon_transition: f32, inputs: &CycleInputs) -> f32 {
    if horizon_transition <= 0. {
        return 0.;
    }

    let most_deflected = max(
        inputs.rc_deflection_abs[Axis::Roll],
        inputs.rc_deflection_abs[Axis::Pitch],
    );

    constrain(1. - most_deflected * horizon_transition, 0., 1.)
}

/// Apply angle or horizon mode to a roll or pitch setpoint. Returns the setpoint unchanged
/// for yaw, or when no level mode is active.
pub fn pid_level(axis: Axis, gains: &ResolvedGains, inputs: &CycleInputs, setpoint: f32) -> f32 {
    if axis == Axis::Yaw || inputs.level_mode == LevelMode::Off {
        return setpoint;
    }

    let i = axis.index();

    // Commanded angle, limited to the max inclination.
    let mut error_angle =
        gains.level_sensitivity * inputs.rc_deflection[axis] + inputs.angle_correction[i];
    error_angle = constrain(error_angle, -gains.level_angle_limit, gains.level_angle_limit);
    error_angle -= inputs.attitude[i] - inputs.angle_trim[i];

    match inputs.level_mode {
        LevelMode::Angle => error_angle * gains.level_gain,
        LevelMode::Horizon => {
            let strength = horizon_level_strength(gains.horizon_transition, inputs);
            setpoint + error_angle * gains.horizon_gain * strength
        }
        LevelMode::Off => setpoint,
    }
}
