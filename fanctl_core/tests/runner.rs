use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fanctl_core::mocks::{ManualPulseSource, PulseHandle, RecordingPwm, ScriptedThermometer};
use fanctl_core::{
    ControllerCfg, CycleReport, DutyCycleController, DutyValues, FanError, FanLoop,
    PulseRateEstimator, TachCfg,
};

// Deterministic clock; sleep advances time and counts the calls
#[derive(Clone)]
struct TestClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl TestClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }
    fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

impl fanctl_traits::clock::Clock for TestClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }
    fn sleep(&self, d: Duration) {
        *self.offset.lock().unwrap() += d;
        self.sleeps.lock().unwrap().push(d);
    }
}

fn controller() -> DutyCycleController {
    DutyCycleController::new(ControllerCfg {
        duty_cycle_min: 50,
        duty_cycle_max: 255,
        thresholds: vec![30.0, 40.0, 50.0],
        duty_cycle_values: DutyValues::Interior(vec![120, 190]),
        hysteresis: 2.0,
        stuck_counter_limit: 3,
    })
    .unwrap()
}

fn fan_loop(
    thermometer: ScriptedThermometer,
) -> (
    FanLoop<ScriptedThermometer, RecordingPwm, ManualPulseSource>,
    RecordingPwm,
    PulseHandle,
) {
    let pwm = RecordingPwm::new();
    let source = ManualPulseSource::new();
    let handle = source.handle();
    let estimator = PulseRateEstimator::new(source, TachCfg::default()).unwrap();
    let fan = FanLoop::new(thermometer, pwm.clone(), estimator, controller());
    (fan, pwm, handle)
}

#[test]
fn cycle_applies_and_reports() {
    let (mut fan, pwm, handle) = fan_loop(ScriptedThermometer::readings([35.04, 35.0, 28.0]));
    handle.edge(0);
    handle.edge(20_000);

    let r = fan.cycle().unwrap();
    assert_eq!(r.temperature, 35.0);
    assert_eq!(r.duty_cycle.value, 120);
    assert_eq!(r.duty_cycle.percent, 47);
    assert_eq!(r.rpm, 1500);

    assert_eq!(fan.cycle().unwrap().duty_cycle.value, 120);
    assert_eq!(fan.cycle().unwrap().duty_cycle.value, 50);
    assert_eq!(pwm.applied(), vec![120, 120, 50]);
    assert_eq!(fan.last_report().map(|r| r.duty_cycle.value), Some(50));
}

#[test]
fn sinks_see_every_report_and_failures_do_not_stop_the_cycle() {
    let seen = Arc::new(Mutex::new(Vec::<CycleReport>::new()));
    let (fan, pwm, _handle) = fan_loop(ScriptedThermometer::readings([45.0, 55.0]));
    let mut fan = fan
        .with_sink({
            let seen = seen.clone();
            move |r: &CycleReport| -> Result<(), FanError> {
                seen.lock().unwrap().push(*r);
                Ok(())
            }
        })
        .with_sink(|_: &CycleReport| -> Result<(), FanError> {
            Err(FanError::Io("disk full".into()))
        });

    fan.cycle().unwrap();
    fan.cycle().unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].duty_cycle.value, 255);
    assert_eq!(seen[1].rpm, 0);
    assert_eq!(pwm.applied(), vec![190, 255]);
}

#[test]
fn sensor_error_skips_the_cycle_and_keeps_pwm() {
    let (mut fan, pwm, _handle) = fan_loop(ScriptedThermometer::new([
        Ok(45.0),
        Err("crc mismatch".to_string()),
        Ok(45.0),
    ]));
    let clock = TestClock::new();
    let stop = AtomicBool::new(false);
    let cycles = fan
        .run_until(Duration::from_secs(30), &clock, &stop, Some(3))
        .unwrap();
    assert_eq!(cycles, 3);
    assert_eq!(pwm.applied(), vec![190, 190]);
}

#[test]
fn unreadable_sensor_file_skips_cycles_without_stopping_the_fan() {
    let dir = tempfile::tempdir().unwrap();
    let thermometer = fanctl_hardware::W1Thermometer::new(dir.path().join("w1_slave"));
    let pwm = RecordingPwm::new();
    let estimator = PulseRateEstimator::new(ManualPulseSource::new(), TachCfg::default()).unwrap();
    let mut fan = FanLoop::new(thermometer, pwm.clone(), estimator, controller());

    let err = fan.cycle().unwrap_err();
    assert!(matches!(err, FanError::Sensor(_)), "{err:?}");

    let clock = TestClock::new();
    let stop = AtomicBool::new(false);
    let cycles = fan
        .run_until(Duration::from_secs(1), &clock, &stop, Some(3))
        .unwrap();
    assert_eq!(cycles, 3);
    assert!(pwm.applied().is_empty());
}

#[test]
fn pwm_error_ends_the_loop() {
    let (mut fan, pwm, _handle) = fan_loop(ScriptedThermometer::readings([45.0]));
    pwm.fail_writes(true);
    let clock = TestClock::new();
    let stop = AtomicBool::new(false);
    let err = fan
        .run_until(Duration::from_secs(1), &clock, &stop, None)
        .unwrap_err();
    assert!(matches!(err, FanError::Pwm(_)), "{err:?}");
}

#[test]
fn paces_cycles_in_short_slices() {
    let (mut fan, _pwm, _handle) = fan_loop(ScriptedThermometer::readings([20.0]));
    let clock = TestClock::new();
    let stop = AtomicBool::new(false);
    fan.run_until(Duration::from_secs(1), &clock, &stop, Some(3))
        .unwrap();
    // two full waits between three cycles, none after the last
    assert_eq!(clock.elapsed(), Duration::from_secs(2));
    let sleeps = clock.sleeps.lock().unwrap();
    assert_eq!(sleeps.len(), 10);
    assert!(sleeps.iter().all(|d| *d <= Duration::from_millis(200)));
}

#[test]
fn raised_stop_flag_runs_nothing() {
    let (mut fan, pwm, _handle) = fan_loop(ScriptedThermometer::readings([45.0]));
    let clock = TestClock::new();
    let stop = AtomicBool::new(true);
    assert_eq!(
        fan.run_until(Duration::from_secs(30), &clock, &stop, None)
            .unwrap(),
        0
    );
    assert!(pwm.applied().is_empty());
}

#[test]
fn shutdown_stops_the_fan_and_releases_the_tach() {
    let (mut fan, pwm, handle) = fan_loop(ScriptedThermometer::readings([45.0]));
    fan.cycle().unwrap();
    fan.shutdown().unwrap();
    assert_eq!(pwm.applied(), vec![190, 0]);
    assert!(!handle.is_subscribed());
    assert!(!fan.estimator().is_attached());
}
