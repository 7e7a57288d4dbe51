//! This module contains code for digitally filtering the PID terms: a notch and a lowpass on
//! the D term, and an optional lowpass on the yaw P term.
//!
//! Filters are stateful, and are built for a specific sample rate. When the loop period or a
//! cutoff changes, the whole set is rebuilt; we never retune a filter in place.

use core::f32::consts::TAU;

use num_traits::float::Float; // sin, cos, log2 etc on no_std.

use crate::{
    flight_ctrls::common::{Axis, PerAxis},
    state::{ControlProfile, DtermFilterType},
};

/// Q for a second-order Butterworth lowpass.
const BIQUAD_Q: f32 = core::f32::consts::FRAC_1_SQRT_2;

pub const MAX_FIR_DENOISE_WINDOW_SIZE: usize = 120;

/// First-order lowpass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pt1Filter {
    state: f32,
    k: f32,
}

impl Pt1Filter {
    /// `dt` is the sample period, in seconds.
    pub fn new(cutoff_hz: f32, dt: f32) -> Self {
        let rc = 1. / (TAU * cutoff_hz);

        Self {
            state: 0.,
            k: dt / (rc + dt),
        }
    }

    pub fn apply(&mut self, input: f32) -> f32 {
        self.state += self.k * (input - self.state);
        self.state
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BiquadKind {
    Lowpass,
    Notch,
}

/// Second-order IIR section, in transposed direct form II. Coefficients are normalized by a0.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BiquadFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
}

impl BiquadFilter {
    /// `looptime` is the sample period, in µs.
    pub fn new(freq_hz: f32, looptime: u32, q: f32, kind: BiquadKind) -> Self {
        let sample_rate = 1. / (looptime as f32 * 0.000_001);
        let omega = TAU * freq_hz / sample_rate;
        let sn = omega.sin();
        let cs = omega.cos();
        let alpha = sn / (2. * q);

        let (b0, b1, b2) = match kind {
            BiquadKind::Lowpass => ((1. - cs) / 2., 1. - cs, (1. - cs) / 2.),
            BiquadKind::Notch => (1., -2. * cs, 1.),
        };
        let a0 = 1. + alpha;
        let a1 = -2. * cs;
        let a2 = 1. - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.,
            x2: 0.,
        }
    }

    pub fn new_lowpass(freq_hz: f32, looptime: u32) -> Self {
        Self::new(freq_hz, looptime, BIQUAD_Q, BiquadKind::Lowpass)
    }

    /// A band-stop centered on `center_hz`, with its lower -3dB edge at `cutoff_hz`.
    pub fn new_notch(center_hz: f32, cutoff_hz: f32, looptime: u32) -> Self {
        Self::new(
            center_hz,
            looptime,
            notch_q(center_hz, cutoff_hz),
            BiquadKind::Notch,
        )
    }

    pub fn apply(&mut self, input: f32) -> f32 {
        let result = self.b0 * input + self.x1;
        self.x1 = self.b1 * input - self.a1 * result + self.x2;
        self.x2 = self.b2 * input - self.a2 * result;
        result
    }
}

/// Q for a notch, from its center and lower cutoff frequencies. Only meaningful for
/// `0 < cutoff < center`.
pub fn notch_q(center_hz: f32, cutoff_hz: f32) -> f32 {
    let octaves = (center_hz / cutoff_hz).log2() * 2.;
    let width = 2_f32.powf(octaves);
    width.sqrt() / (width - 1.)
}

/// Moving-average ("denoise") FIR filter. The window covers one period of the cutoff
/// frequency, up to `MAX_FIR_DENOISE_WINDOW_SIZE` samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FirDenoiseFilter {
    state: [f32; MAX_FIR_DENOISE_WINDOW_SIZE],
    target_count: usize,
    filled_count: usize,
    index: usize,
    moving_sum: f32,
}

impl FirDenoiseFilter {
    /// `looptime` is the sample period, in µs.
    pub fn new(cutoff_hz: f32, looptime: u32) -> Self {
        let sample_rate = 1. / (looptime as f32 * 0.000_001);
        let window = (sample_rate / cutoff_hz).round();

        let target_count = if window < 1. {
            1
        } else if window > MAX_FIR_DENOISE_WINDOW_SIZE as f32 {
            MAX_FIR_DENOISE_WINDOW_SIZE
        } else {
            window as usize
        };

        Self {
            state: [0.; MAX_FIR_DENOISE_WINDOW_SIZE],
            target_count,
            filled_count: 0,
            index: 0,
            moving_sum: 0.,
        }
    }

    pub fn window(&self) -> usize {
        self.target_count
    }

    pub fn apply(&mut self, input: f32) -> f32 {
        // The slot we're about to overwrite holds the oldest sample in the window.
        self.moving_sum += input - self.state[self.index];
        self.state[self.index] = input;

        self.index += 1;
        if self.index == self.target_count {
            self.index = 0;
        }

        if self.filled_count < self.target_count {
            self.filled_count += 1;
        }

        self.moving_sum / self.filled_count as f32
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FirDenoiseFilter {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "FirDenoiseFilter(window: {}, filled: {})",
            self.target_count,
            self.filled_count
        )
    }
}

/// A filter stage, selected when the filter set is built. `Null` passes its input through
/// unchanged, and is what we use for a disabled or invalid cutoff.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Filter {
    #[default]
    Null,
    Pt1(Pt1Filter),
    Biquad(BiquadFilter),
    FirDenoise(FirDenoiseFilter),
}

impl Filter {
    pub fn apply(&mut self, input: f32) -> f32 {
        match self {
            Self::Null => input,
            Self::Pt1(f) => f.apply(input),
            Self::Biquad(f) => f.apply(input),
            Self::FirDenoise(f) => f.apply(input),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Is this cutoff usable at this sample rate? 0 means the filter is disabled; anything above
/// Nyquist can't be represented.
fn cutoff_valid(cutoff_hz: u16, nyquist_hz: f32, name: &str) -> bool {
    if cutoff_hz == 0 {
        return false;
    }

    if cutoff_hz as f32 > nyquist_hz {
        warn!(
            "{} cutoff of {} Hz is above Nyquist ({} Hz); filter disabled",
            name, cutoff_hz, nyquist_hz
        );
        return false;
    }

    true
}

/// Filter instances for the PID terms. The D-term stages run on roll and pitch; yaw's D term
/// (only computed with a tricopter mixer) passes through unfiltered.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DtermFilters {
    pub d_term_notch: PerAxis<Filter>,
    pub d_term_lpf: PerAxis<Filter>,
    pub p_term_yaw_lpf: Filter,
}

impl DtermFilters {
    /// Build the filter set for this profile, at a loop period of `looptime` µs. A looptime
    /// of 0 (not set yet) gives pass-through filters.
    pub fn new(profile: &ControlProfile, looptime: u32) -> Self {
        let mut result = Self::default();

        if looptime == 0 {
            warn!("No loop time set; PID filters disabled");
            return result;
        }

        let dt = looptime as f32 * 0.000_001;
        let nyquist = 500_000. / looptime as f32;

        if cutoff_valid(profile.dterm_notch_hz, nyquist, "D-term notch") {
            let center = profile.dterm_notch_hz as f32;
            let cutoff = profile.dterm_notch_cutoff as f32;

            if profile.dterm_notch_cutoff != 0 && cutoff < center {
                for axis in [Axis::Roll, Axis::Pitch] {
                    result.d_term_notch[axis] =
                        Filter::Biquad(BiquadFilter::new_notch(center, cutoff, looptime));
                }
            } else {
                warn!(
                    "D-term notch cutoff of {} Hz must be between 0 and the {} Hz center; notch disabled",
                    profile.dterm_notch_cutoff, profile.dterm_notch_hz
                );
            }
        }

        if cutoff_valid(profile.dterm_lpf_hz, nyquist, "D-term lowpass") {
            let cutoff = profile.dterm_lpf_hz as f32;

            for axis in [Axis::Roll, Axis::Pitch] {
                result.d_term_lpf[axis] = match profile.dterm_filter_type {
                    DtermFilterType::Pt1 => Filter::Pt1(Pt1Filter::new(cutoff, dt)),
                    DtermFilterType::Biquad => {
                        Filter::Biquad(BiquadFilter::new_lowpass(cutoff, looptime))
                    }
                    DtermFilterType::Fir => {
                        Filter::FirDenoise(FirDenoiseFilter::new(cutoff, looptime))
                    }
                };
            }
        }

        if cutoff_valid(profile.yaw_lpf_hz, nyquist, "Yaw P-term lowpass") {
            result.p_term_yaw_lpf = Filter::Pt1(Pt1Filter::new(profile.yaw_lpf_hz as f32, dt));
        }

        info!(
            "PID filters built at {} us. Notch: {}, D lowpass: {}, yaw P lowpass: {}",
            looptime,
            !result.d_term_notch[Axis::Roll].is_null(),
            !result.d_term_lpf[Axis::Roll].is_null(),
            !result.p_term_yaw_lpf.is_null()
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOPTIME: u32 = 1_000; // 1kHz

    fn profile() -> ControlProfile {
        ControlProfile::default()
    }

    #[test]
    fn null_filter_passes_input() {
        let mut filter = Filter::Null;
        for x in [0., 1., -250., 3.5e4, -0.001] {
            assert_eq!(filter.apply(x), x);
        }
    }

    #[test]
    fn pt1_gain_and_step() {
        let mut filter = Pt1Filter::new(100., 0.001);
        assert!((filter.k - 0.385_869_5).abs() < 1e-5);

        let first = filter.apply(1.);
        assert!((first - filter.k).abs() < 1e-6);

        for _ in 0..200 {
            filter.apply(1.);
        }
        assert!((filter.apply(1.) - 1.).abs() < 1e-4);
    }

    #[test]
    fn biquad_lowpass_unity_dc_gain() {
        let mut filter = BiquadFilter::new_lowpass(100., LOOPTIME);
        let mut out = 0.;
        for _ in 0..1_000 {
            out = filter.apply(2.);
        }
        assert!((out - 2.).abs() < 1e-3);
    }

    #[test]
    fn notch_q_from_edges() {
        assert!((notch_q(260., 160.) - 0.990_476).abs() < 1e-4);
    }

    #[test]
    fn notch_rejects_center_passes_dc() {
        let mut dc = BiquadFilter::new_notch(100., 70., LOOPTIME);
        let mut out = 0.;
        for _ in 0..2_000 {
            out = dc.apply(1.);
        }
        assert!((out - 1.).abs() < 1e-3);

        // A sine at the center frequency, sampled at 1kHz, settles to near zero.
        let mut notch = BiquadFilter::new_notch(100., 70., LOOPTIME);
        let mut peak: f32 = 0.;
        for i in 0..4_000 {
            // 10 samples per period.
            let x = (TAU * (i % 10) as f32 / 10.).sin();
            let y = notch.apply(x);
            if i > 3_000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.05);
    }

    #[test]
    fn fir_moving_average() {
        let mut filter = FirDenoiseFilter::new(250., LOOPTIME);
        assert_eq!(filter.window(), 4);

        // Averages over what it's seen until the window fills.
        assert!((filter.apply(4.) - 4.).abs() < 1e-6);
        assert!((filter.apply(0.) - 2.).abs() < 1e-6);
        filter.apply(0.);
        filter.apply(0.);
        assert!((filter.apply(0.) - 0.).abs() < 1e-6);
    }

    #[test]
    fn fir_window_clamped() {
        assert_eq!(FirDenoiseFilter::new(1., LOOPTIME).window(), MAX_FIR_DENOISE_WINDOW_SIZE);
        assert_eq!(FirDenoiseFilter::new(900., LOOPTIME).window(), 1);
    }

    #[test]
    fn bank_follows_profile() {
        let filters = DtermFilters::new(&profile(), LOOPTIME);

        for axis in [Axis::Roll, Axis::Pitch] {
            assert!(matches!(filters.d_term_notch[axis], Filter::Biquad(_)));
            assert!(matches!(filters.d_term_lpf[axis], Filter::Biquad(_)));
        }
        assert!(filters.d_term_notch[Axis::Yaw].is_null());
        assert!(filters.d_term_lpf[Axis::Yaw].is_null());
        // Off by default.
        assert!(filters.p_term_yaw_lpf.is_null());
    }

    #[test]
    fn bank_filter_type_selects_variant() {
        let mut profile = profile();

        profile.dterm_filter_type = DtermFilterType::Pt1;
        let filters = DtermFilters::new(&profile, LOOPTIME);
        assert!(matches!(filters.d_term_lpf[Axis::Pitch], Filter::Pt1(_)));

        profile.dterm_filter_type = DtermFilterType::Fir;
        let filters = DtermFilters::new(&profile, LOOPTIME);
        assert!(matches!(filters.d_term_lpf[Axis::Pitch], Filter::FirDenoise(_)));
    }

    #[test]
    fn bank_invalid_cutoffs_pass_through() {
        let mut profile = profile();
        profile.dterm_lpf_hz = 0;
        profile.dterm_notch_hz = 501; // Above Nyquist at 1kHz.
        profile.yaw_lpf_hz = 0;

        let mut filters = DtermFilters::new(&profile, LOOPTIME);
        for axis in Axis::ALL {
            assert!(filters.d_term_notch[axis].is_null());
            assert!(filters.d_term_lpf[axis].is_null());
        }
        assert!(filters.p_term_yaw_lpf.is_null());

        for x in [1., -7., 300.] {
            assert_eq!(filters.d_term_lpf[Axis::Roll].apply(x), x);
        }
    }

    #[test]
    fn bank_cutoff_at_nyquist_is_kept() {
        let mut profile = profile();
        profile.dterm_lpf_hz = 500;
        profile.yaw_lpf_hz = 500;

        let filters = DtermFilters::new(&profile, LOOPTIME);
        assert!(!filters.d_term_lpf[Axis::Roll].is_null());
        assert!(!filters.p_term_yaw_lpf.is_null());
    }

    #[test]
    fn bank_notch_needs_cutoff_below_center() {
        let mut profile = profile();
        profile.dterm_notch_cutoff = 0;
        assert!(DtermFilters::new(&profile, LOOPTIME).d_term_notch[Axis::Roll].is_null());

        profile.dterm_notch_cutoff = 300;
        assert!(DtermFilters::new(&profile, LOOPTIME).d_term_notch[Axis::Roll].is_null());
    }

    #[test]
    fn bank_without_looptime_is_null() {
        let filters = DtermFilters::new(&profile(), 0);
        assert_eq!(filters, DtermFilters::default());
    }
}
