//! This module contains the rate PID loop: a 2DOF PID per axis, run once per control cycle.
//!
//! Setpoint weighting applies to the D term only (b = 1, c = `dterm_setpoint_weight`), so D can
//! act on measurement, error, or a blend.
//!
//! [Some info on the PID terms, focused on BF](https://gist.github.com/exocode/90339d7f946ad5f83dd1cf29bf5df0dc)
//! https://oscarliang.com/quadcopter-pid-explained-tuning/

use num_traits::float::Float; // abs on no_std.

use crate::{
    flight_ctrls::{
        common::{
            Axis, CycleInputs, MixerFeedback, PerAxis, PidAxisData, PidStabilisationState,
        },
        filters::DtermFilters,
        pid_init::ResolvedGains,
        setpoint::{self, SetpointShaper},
    },
    state::ControlProfile,
};

/// The rate loop, and all state it carries between cycles. Build it, set the loop period,
/// run `init_filters` and `init_config`, then call `update` once per cycle.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RateController {
    /// Loop period, in µs.
    target_looptime: u32,
    /// Loop period, in seconds.
    dt: f32,
    stabilisation_enabled: bool,
    /// Multiplier on iterm growth, eg for anti-gravity. Normally 1.
    iterm_accelerator: f32,
    /// Bias added to each axis's error, eg for disturbance feed-forward.
    expected_gyro_error: PerAxis<f32>,
    gains: ResolvedGains,
    filters: DtermFilters,
    shaper: SetpointShaper,
    /// Integrator state. Stored separately from `outputs`, so disabling stabilisation
    /// doesn't lose it.
    iterm: PerAxis<f32>,
    /// Setpoint-weighted error from the last cycle, for the D term.
    previous_rate_error: PerAxis<f32>,
    outputs: PerAxis<PidAxisData>,
}

impl RateController {
    /// Gains start at 0 and filters as pass-through until `init_config` and `init_filters`
    /// are run. Stabilisation starts off.
    pub fn new(looptime: u32) -> Self {
        Self {
            target_looptime: looptime,
            dt: looptime as f32 * 0.000_001,
            stabilisation_enabled: false,
            iterm_accelerator: 1.,
            expected_gyro_error: PerAxis::default(),
            gains: ResolvedGains::default(),
            filters: DtermFilters::default(),
            shaper: SetpointShaper::default(),
            iterm: PerAxis::default(),
            previous_rate_error: PerAxis::default(),
            outputs: PerAxis::default(),
        }
    }

    /// Set the loop period, in µs. If it changed, the filters are reset to pass-through:
    /// their history and coefficients belong to the old rate. Run `init_filters` and
    /// `init_config` afterwards.
    pub fn set_target_looptime(&mut self, looptime: u32) {
        if looptime == self.target_looptime {
            return;
        }

        self.target_looptime = looptime;
        self.dt = looptime as f32 * 0.000_001;
        self.filters = DtermFilters::default();

        info!("PID loop time set to {} us", looptime);
    }

    pub fn target_looptime(&self) -> u32 {
        self.target_looptime
    }

    /// Loop period, in seconds.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Rebuild all PID filters from the profile, at the current loop period.
    pub fn init_filters(&mut self, profile: &ControlProfile) {
        self.filters = DtermFilters::new(profile, self.target_looptime);
    }

    /// Re-derive gains from the profile. Reads mixer topology to decide whether yaw gets
    /// throttle attenuation.
    pub fn init_config(&mut self, profile: &ControlProfile, mixer: &impl MixerFeedback) {
        self.gains = ResolvedGains::new(profile, self.dt, mixer);

        info!(
            "PID gains resolved. Windup point: {}, tri yaw: {}",
            self.gains.iterm_windup_point, self.gains.disable_tpa_for_yaw
        );
    }

    pub fn gains(&self) -> &ResolvedGains {
        &self.gains
    }

    pub fn filters(&self) -> &DtermFilters {
        &self.filters
    }

    /// Zero the integrator on all axes, eg on arming.
    pub fn reset_iterm(&mut self) {
        for axis in Axis::ALL {
            self.reset_iterm_axis(axis);
        }
    }

    pub fn reset_iterm_axis(&mut self, axis: Axis) {
        self.iterm[axis] = 0.;
        self.outputs[axis].i = 0.;
    }

    pub fn iterm(&self, axis: Axis) -> f32 {
        self.iterm[axis]
    }

    /// When off, outputs are held at 0, but integrators keep their value.
    pub fn set_stabilisation_state(&mut self, state: PidStabilisationState) {
        self.stabilisation_enabled = state == PidStabilisationState::On;
    }

    pub fn is_stabilisation_enabled(&self) -> bool {
        self.stabilisation_enabled
    }

    pub fn set_iterm_accelerator(&mut self, iterm_accelerator: f32) {
        self.iterm_accelerator = iterm_accelerator;
    }

    pub fn iterm_accelerator(&self) -> f32 {
        self.iterm_accelerator
    }

    pub fn set_expected_gyro_error(&mut self, axis: Axis, error: f32) {
        self.expected_gyro_error[axis] = error;
    }

    /// Outputs from the last `update`.
    pub fn outputs(&self) -> &PerAxis<PidAxisData> {
        &self.outputs
    }

    /// Run one cycle of the rate loop on all axes. Never fails; inputs are assumed to be
    /// in range, and the profile to have passed validation.
    pub fn update(
        &mut self,
        inputs: &CycleInputs,
        mixer: &impl MixerFeedback,
    ) -> &PerAxis<PidAxisData> {
        let tpa = inputs.tpa_factor;

        // Gradually scale back integration when above the windup point.
        let dyn_ki = ((1. - mixer.motor_mix_range()) * self.gains.iterm_windup_point_inv).min(1.);

        for axis in Axis::ALL {
            let mut setpoint = inputs.setpoint_rate[axis];

            let max_velocity = self.gains.max_velocity[axis];
            if max_velocity != 0. {
                setpoint = self.shaper.acceleration_limit(axis, setpoint, max_velocity);
            }

            // Yaw control is gyro based; sticks command yaw rate directly.
            setpoint = setpoint::pid_level(axis, &self.gains, inputs, setpoint);

            let gyro_rate = inputs.gyro_rate[axis];
            let coeffs = self.gains.coeffs[axis];

            let error_rate = setpoint - gyro_rate + self.expected_gyro_error[axis];

            let mut p = coeffs.kp * error_rate;
            if axis == Axis::Yaw {
                if !self.gains.disable_tpa_for_yaw {
                    p *= tpa;
                }
                p = self.filters.p_term_yaw_lpf.apply(p);
            } else {
                p *= tpa;
            }

            // Only grow the iterm if the output isn't saturated. Shrinking is always allowed.
            let i_prev = self.iterm[axis];
            let i_new = i_prev
                + coeffs.ki * error_rate * self.dt * dyn_ki * self.iterm_accelerator;
            if !mixer.is_output_saturated(axis, error_rate) || i_new.abs() < i_prev.abs() {
                self.iterm[axis] = i_new;
            }

            // Yaw has no D term, except on a tricopter.
            let mut d = 0.;
            if axis != Axis::Yaw || mixer.tri_mixer_in_use() {
                let mut dyn_c = self.gains.dterm_setpoint_weight;
                if self.gains.setpoint_relax {
                    dyn_c *= (inputs.rc_deflection_abs[axis] * self.gains.relax_factor).min(1.);
                }
                let rate_error_d = dyn_c * setpoint - gyro_rate;
                let delta = (rate_error_d - self.previous_rate_error[axis]) / self.dt;
                self.previous_rate_error[axis] = rate_error_d;

                d = coeffs.kd * delta * tpa;
                d = self.filters.d_term_notch[axis].apply(d);
                d = self.filters.d_term_lpf[axis].apply(d);
            }

            self.outputs[axis] = if self.stabilisation_enabled {
                PidAxisData {
                    p,
                    i: self.iterm[axis],
                    d,
                }
            } else {
                PidAxisData::default()
            };
        }

        &self.outputs
    }
}
