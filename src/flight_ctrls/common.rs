//! This module contains types shared by the rate loop stages: axis indexing, the per-cycle
//! inputs we receive from collaborators, and the outputs we hand to the mixer.

use core::ops::{Index, IndexMut};

use num_enum::TryFromPrimitive; // Enum from integer

use crate::util::map_linear;

pub const AXIS_COUNT: usize = 3;

/// One of the three independent control channels. Yaw is always index 2; only roll and pitch
/// take part in self-leveling.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Axis {
    Roll = 0,
    Pitch = 1,
    Yaw = 2,
}

// D-term filters are set up for roll and pitch only; this relies on yaw being last.
const _: () = assert!(Axis::Yaw as usize == 2 && AXIS_COUNT == 3);

impl Axis {
    pub const ALL: [Self; AXIS_COUNT] = [Self::Roll, Self::Pitch, Self::Yaw];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// One value per axis. Indexed by `Axis`, so a stage can't read another stage's axis by
/// accident.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PerAxis<T>(pub [T; AXIS_COUNT]);

impl<T> PerAxis<T> {
    pub const fn new(vals: [T; AXIS_COUNT]) -> Self {
        Self(vals)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.0.iter()
    }
}

impl<T: Copy> PerAxis<T> {
    pub const fn splat(val: T) -> Self {
        Self([val; AXIS_COUNT])
    }
}

impl<T> Index<Axis> for PerAxis<T> {
    type Output = T;

    fn index(&self, axis: Axis) -> &T {
        &self.0[axis.index()]
    }
}

impl<T> IndexMut<Axis> for PerAxis<T> {
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        &mut self.0[axis.index()]
    }
}

/// Self-leveling mode. Selected by the (external) flight mode logic.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LevelMode {
    /// Rate (acro); sticks command rotation rate directly.
    #[default]
    Off,
    /// Sticks command an angle; the rate setpoint is replaced by an angle loop.
    Angle,
    /// Rate control, with self-leveling mixed in near center stick.
    Horizon,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PidStabilisationState {
    /// Eg disarmed, or at zero throttle without airmode. Outputs are held at 0.
    Off,
    On,
}

/// P, I and D outputs for a single axis, for one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidAxisData {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

impl PidAxisData {
    /// The correction the mixer applies for this axis.
    pub fn sum(&self) -> f32 {
        self.p + self.i + self.d
    }
}

/// Everything the rate loop reads from its collaborators each cycle, besides the mixer.
/// Rates are in deg/s, angles in degrees, and stick deflection is -1. to 1.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleInputs {
    /// Target rate from RC and navigation.
    pub setpoint_rate: PerAxis<f32>,
    /// Filtered gyro reading; the process variable.
    pub gyro_rate: PerAxis<f32>,
    pub rc_deflection: PerAxis<f32>,
    pub rc_deflection_abs: PerAxis<f32>,
    pub level_mode: LevelMode,
    /// Roll and pitch attitude from the estimator.
    pub attitude: [f32; 2],
    /// Roll and pitch trim offsets; attitude is measured relative to these.
    pub angle_trim: [f32; 2],
    /// Extra roll and pitch angle commanded by navigation, eg GPS.
    pub angle_correction: [f32; 2],
    /// Throttle PID attenuation. See `tpa_factor`.
    pub tpa_factor: f32,
}

impl Default for CycleInputs {
    fn default() -> Self {
        Self {
            setpoint_rate: PerAxis::default(),
            gyro_rate: PerAxis::default(),
            rc_deflection: PerAxis::default(),
            rc_deflection_abs: PerAxis::default(),
            level_mode: LevelMode::Off,
            attitude: [0.; 2],
            angle_trim: [0.; 2],
            angle_correction: [0.; 2],
            tpa_factor: 1.,
        }
    }
}

impl CycleInputs {
    /// Set signed and absolute stick deflection together.
    pub fn set_rc_deflection(&mut self, deflection: PerAxis<f32>) {
        for axis in Axis::ALL {
            self.rc_deflection[axis] = deflection[axis];
            self.rc_deflection_abs[axis] = if deflection[axis] < 0. {
                -deflection[axis]
            } else {
                deflection[axis]
            };
        }
    }
}

/// What the rate loop needs to know from the motor mixer. Queried live: topology is read both
/// when gains are resolved and every cycle.
pub trait MixerFeedback {
    /// Spread between the highest and lowest motor outputs of the last mix. 1.0 or more
    /// means the mix is saturating the motor range.
    fn motor_mix_range(&self) -> f32;

    /// Is a tricopter (servo yaw) mixer active?
    fn tri_mixer_in_use(&self) -> bool;

    /// Would an error of this sign push this axis further into saturation?
    fn is_output_saturated(&self, _axis: Axis, _error_rate: f32) -> bool {
        self.motor_mix_range() >= 1.
    }
}

/// Plain snapshot of mixer state, for callers that don't have a live mixer to hand, and
/// for tests.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MixerStatus {
    pub motor_mix_range: f32,
    pub tri_mixer: bool,
    /// Overrides the mix range based check when set.
    pub saturated: Option<bool>,
}

impl MixerFeedback for MixerStatus {
    fn motor_mix_range(&self) -> f32 {
        self.motor_mix_range
    }

    fn tri_mixer_in_use(&self) -> bool {
        self.tri_mixer
    }

    fn is_output_saturated(&self, _axis: Axis, _error_rate: f32) -> bool {
        self.saturated.unwrap_or(self.motor_mix_range >= 1.)
    }
}

/// "TPA" stands for Throttle PID attenuation - reduction in P and D terms past a throttle
/// breakpoint, linearly. `throttle` is 0. to 1.; `breakpoint` is in µs of RC range
/// (1000 - 2000); `rate_percent` is the attenuation at full throttle. Multiply P and D by
/// the result.
/// https://github-wiki-see.page/m/betaflight/betaflight/wiki/PID-Tuning-Guide
pub fn tpa_factor(throttle: f32, breakpoint: u16, rate_percent: u8) -> f32 {
    let breakpoint = (breakpoint as f32 - 1_000.) / 1_000.;
    let rate = rate_percent as f32 / 100.;

    if throttle <= breakpoint {
        return 1.;
    }

    if throttle >= 1. {
        return 1. - rate;
    }

    1. - map_linear(throttle, (breakpoint, 1.), (0., rate))
}
