//! Multi-cycle scenarios through the public API, with the factory profile.

use flight_pid::{
    Axis, ControlProfile, CycleInputs, LevelMode, MixerStatus, PerAxis, PidAxisData,
    PidStabilisationState, RateController,
};

const LOOPTIME: u32 = 1_000;

fn quad() -> MixerStatus {
    MixerStatus::default()
}

fn tri() -> MixerStatus {
    MixerStatus {
        tri_mixer: true,
        ..Default::default()
    }
}

fn setup(profile: &ControlProfile, mixer: &MixerStatus) -> RateController {
    profile.validate().unwrap();

    let mut ctrl = RateController::new(LOOPTIME);
    ctrl.init_filters(profile);
    ctrl.init_config(profile, mixer);
    ctrl
}

fn inputs(setpoint: [f32; 3], gyro: [f32; 3]) -> CycleInputs {
    CycleInputs {
        setpoint_rate: PerAxis::new(setpoint),
        gyro_rate: PerAxis::new(gyro),
        ..Default::default()
    }
}

#[test]
fn disarmed_outputs_are_zero_until_armed() {
    let profile = ControlProfile::default();
    let mut ctrl = setup(&profile, &quad());
    assert!(!ctrl.is_stabilisation_enabled());

    for _ in 0..50 {
        let outputs = ctrl.update(&inputs([100., -50., 5.], [0.; 3]), &quad());
        for axis in Axis::ALL {
            assert_eq!(outputs[axis], PidAxisData::default());
        }
    }

    // Arming: clear whatever the integrator picked up on the ground, then enable.
    ctrl.reset_iterm();
    ctrl.set_stabilisation_state(PidStabilisationState::On);

    let outputs = *ctrl.update(&inputs([100., -50., 5.], [0.; 3]), &quad());
    assert!(outputs[Axis::Roll].p > 0.);
    assert!(outputs[Axis::Pitch].p < 0.);
    assert!(outputs[Axis::Roll].sum() != 0.);
}

#[test]
fn integrator_accumulates_and_resets() {
    let profile = ControlProfile::default();
    let mut ctrl = setup(&profile, &quad());
    ctrl.set_stabilisation_state(PidStabilisationState::On);

    let mut last = 0.;
    for _ in 0..100 {
        ctrl.update(&inputs([30., 30., 0.], [0.; 3]), &quad());
        let iterm = ctrl.iterm(Axis::Roll);
        assert!(iterm > last);
        last = iterm;
    }

    // ki = 40 * 0.244381; 100 cycles of 30 deg/s error at 1 ms.
    let expected = 40. * 0.244_381 * 30. * 0.001 * 100.;
    assert!((last - expected).abs() < 1e-2);

    ctrl.reset_iterm();
    for axis in Axis::ALL {
        assert_eq!(ctrl.iterm(axis), 0.);
        assert_eq!(ctrl.outputs()[axis].i, 0.);
    }
}

#[test]
fn saturated_mixer_holds_integrator() {
    let profile = ControlProfile::default();
    let mut ctrl = setup(&profile, &quad());
    ctrl.set_stabilisation_state(PidStabilisationState::On);

    let saturated = MixerStatus {
        motor_mix_range: 1.5,
        ..Default::default()
    };

    for _ in 0..20 {
        ctrl.update(&inputs([200., 200., 0.], [0.; 3]), &saturated);
    }
    assert_eq!(ctrl.iterm(Axis::Roll), 0.);
    assert_eq!(ctrl.iterm(Axis::Pitch), 0.);
}

#[test]
fn acceleration_limit_ramps_setpoint() {
    let profile = ControlProfile {
        rate_accel_limit: 5.,
        ..Default::default()
    };
    let mut ctrl = setup(&profile, &quad());
    ctrl.set_stabilisation_state(PidStabilisationState::On);

    let kp = 44. * 0.032_029;

    // 5 deg/s per ms, so a step to 100 deg/s takes 20 cycles to come through.
    let mut last = 0.;
    for cycle in 1..=30 {
        let p = ctrl.update(&inputs([100., 0., 0.], [0.; 3]), &quad())[Axis::Roll].p;
        assert!(p >= last);
        assert!(p - last <= kp * 5. + 1e-3);

        if cycle < 19 {
            assert!(p < kp * 100. - 1.);
        }
        last = p;
    }
    assert!((last - kp * 100.).abs() < 1e-3);
}

#[test]
fn yaw_has_no_derivative_on_quad() {
    let profile = ControlProfile::default();
    let mut ctrl = setup(&profile, &quad());
    ctrl.set_stabilisation_state(PidStabilisationState::On);

    for gyro in [0., 50., -20., 80.] {
        let outputs = ctrl.update(&inputs([0.; 3], [gyro; 3]), &quad());
        assert_eq!(outputs[Axis::Yaw].d, 0.);
    }
}

#[test]
fn tricopter_yaw_derivative() {
    let profile = ControlProfile::default();
    let mut ctrl = setup(&profile, &tri());
    ctrl.set_stabilisation_state(PidStabilisationState::On);
    assert!(ctrl.gains().disable_tpa_for_yaw);

    ctrl.update(&inputs([0.; 3], [0.; 3]), &tri());

    // Yaw D is unfiltered: kd * (0 - 50) / dt.
    let d = ctrl.update(&inputs([0.; 3], [0., 0., 50.]), &tri())[Axis::Yaw].d;
    let expected = 20. * 0.000_529 * -50. / 0.001;
    assert!((d - expected).abs() < 0.1);
}

#[test]
fn angle_mode_levels_roll_and_pitch_only() {
    let profile = ControlProfile::default();
    let mut ctrl = setup(&profile, &quad());
    ctrl.set_stabilisation_state(PidStabilisationState::On);

    let mut inputs = inputs([300., 300., 8.], [0.; 3]);
    inputs.level_mode = LevelMode::Angle;
    inputs.attitude = [20., 0.];

    let outputs = *ctrl.update(&inputs, &quad());

    // Level P of 50: 5 deg/s per degree of error.
    let roll_kp = 44. * 0.032_029;
    assert!((outputs[Axis::Roll].p - roll_kp * -100.).abs() < 1e-2);
    assert!(outputs[Axis::Pitch].p.abs() < 1e-4);

    let yaw_kp = 70. * 0.032_029;
    assert!((outputs[Axis::Yaw].p - yaw_kp * 8.).abs() < 1e-3);
}

#[test]
fn looptime_change_requires_reinit() {
    let profile = ControlProfile::default();
    let mut ctrl = setup(&profile, &quad());
    assert!(!ctrl.filters().d_term_lpf[Axis::Roll].is_null());

    ctrl.set_target_looptime(125);
    assert!(ctrl.filters().d_term_lpf[Axis::Roll].is_null());

    ctrl.init_filters(&profile);
    ctrl.init_config(&profile, &quad());
    assert!(!ctrl.filters().d_term_lpf[Axis::Roll].is_null());
    assert!((ctrl.dt() - 0.000_125).abs() < 1e-9);
}
