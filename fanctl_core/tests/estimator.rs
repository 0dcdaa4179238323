use std::sync::Arc;
use std::thread;

use fanctl_core::mocks::ManualPulseSource;
use fanctl_core::{FanError, PulseRateEstimator, TachCfg, WATCHDOG_TIMEOUT};
use rstest::rstest;

fn estimator(weighting: f64) -> PulseRateEstimator<ManualPulseSource> {
    PulseRateEstimator::new(
        ManualPulseSource::new(),
        TachCfg {
            weighting,
            ..TachCfg::default()
        },
    )
    .unwrap()
}

#[test]
fn subscribes_with_the_fixed_watchdog() {
    let source = ManualPulseSource::new();
    let handle = source.handle();
    let est = PulseRateEstimator::new(source, TachCfg::default()).unwrap();
    assert!(handle.is_subscribed());
    assert_eq!(handle.watchdog(), Some(WATCHDOG_TIMEOUT));
    assert!(est.is_attached());
}

#[test]
fn zero_rpm_until_a_full_period() {
    let est = estimator(0.5);
    assert_eq!(est.get_rpm(), 0.0);
    est.on_rising_edge(1_000);
    assert_eq!(est.get_rpm(), 0.0);
    est.on_rising_edge(21_000);
    // 20 ms per pulse at 2 pulses per revolution
    assert!((est.get_rpm() - 1500.0).abs() < 1e-9);
}

#[test]
fn smooths_with_the_configured_weight() {
    let est = estimator(0.5);
    est.on_rising_edge(0);
    est.on_rising_edge(10_000);
    est.on_rising_edge(30_000);
    // 0.5 * 10 000 + 0.5 * 20 000
    assert_eq!(est.state().smoothed_period_us, Some(15_000.0));
}

#[test]
fn backward_edge_leaves_the_state_untouched() {
    let est = estimator(0.5);
    est.on_rising_edge(10_000);
    est.on_rising_edge(30_000);
    let before = est.state();
    assert_eq!(before.smoothed_period_us, Some(20_000.0));

    est.on_rising_edge(25_000);
    assert_eq!(est.state(), before);
    assert!((est.get_rpm() - 1500.0).abs() < 1e-9);

    // the next in-order edge still measures from the last accepted one
    est.on_rising_edge(50_000);
    assert_eq!(est.state().smoothed_period_us, Some(20_000.0));
}

#[test]
fn duplicate_edge_is_ignored() {
    let est = estimator(0.5);
    est.on_rising_edge(10_000);
    est.on_rising_edge(30_000);
    est.on_rising_edge(30_000);
    assert_eq!(est.state().smoothed_period_us, Some(20_000.0));
    assert_eq!(est.state().last_rising_edge_tick, Some(30_000));
}

#[test]
fn edges_from_the_handle_reach_the_filter() {
    let source = ManualPulseSource::new();
    let handle = source.handle();
    let est = PulseRateEstimator::new(source, TachCfg::default()).unwrap();
    assert!(handle.edge(u32::MAX - 499));
    assert!(handle.edge(500));
    assert_eq!(est.state().smoothed_period_us, Some(1_000.0));
    assert_eq!(est.state().last_rising_edge_tick, Some(500));
}

#[test]
fn watchdog_extends_additively() {
    let source = ManualPulseSource::new();
    let handle = source.handle();
    let est = PulseRateEstimator::new(
        source,
        TachCfg {
            weighting: 0.0,
            ..TachCfg::default()
        },
    )
    .unwrap();
    handle.edge(0);
    handle.edge(10_000);
    assert_eq!(est.state().smoothed_period_us, Some(10_000.0));
    handle.timeout();
    handle.timeout();
    assert_eq!(est.state().smoothed_period_us, Some(410_000.0));
}

#[test]
fn watchdog_without_period_is_a_no_op() {
    let est = estimator(0.5);
    est.on_watchdog_timeout();
    est.on_rising_edge(5);
    est.on_watchdog_timeout();
    assert_eq!(est.state().smoothed_period_us, None);
    assert_eq!(est.get_rpm(), 0.0);
}

#[test]
fn stopping_fan_decays_to_zero() {
    let est = estimator(0.0);
    est.on_rising_edge(0);
    est.on_rising_edge(20_000);
    let mut last = est.get_rpm();
    for _ in 0..100 {
        est.on_watchdog_timeout();
        let rpm = est.get_rpm();
        assert!(rpm <= last);
        last = rpm;
    }
    // 20 ms + 100 * 200 ms is 1.5 rpm at 2 pulses, below the 5 rpm deadband
    assert_eq!(last, 0.0);
}

#[rstest]
#[case(5.0, 600_000_000, 0.0)]
#[case(5.0, 6_000_000, 5.0)]
#[case(1.0, 30_000_000, 1.0)]
#[case(0.0, 60_000_000, 0.0)]
fn min_rpm_is_a_deadband(#[case] min_rpm: f64, #[case] period_us: u32, #[case] expected: f64) {
    let est = PulseRateEstimator::new(
        ManualPulseSource::new(),
        TachCfg {
            min_rpm,
            weighting: 0.0,
            ..TachCfg::default()
        },
    )
    .unwrap();
    est.on_rising_edge(0);
    est.on_rising_edge(period_us);
    assert!((est.get_rpm() - expected).abs() < 1e-9, "rpm {}", est.get_rpm());
}

#[test]
fn clean_up_releases_once() {
    let source = ManualPulseSource::new();
    let handle = source.handle();
    let mut est = PulseRateEstimator::new(source, TachCfg::default()).unwrap();
    est.clean_up().unwrap();
    est.clean_up().unwrap();
    assert!(!est.is_attached());
    assert!(!handle.is_subscribed());
    assert!(!handle.edge(10));
    drop(est);
    assert_eq!(handle.releases(), 1);
}

#[test]
fn drop_releases_the_source() {
    let source = ManualPulseSource::new();
    let handle = source.handle();
    drop(PulseRateEstimator::new(source, TachCfg::default()).unwrap());
    assert_eq!(handle.releases(), 1);
}

struct DeadSource;

impl fanctl_traits::PulseSource for DeadSource {
    fn subscribe(
        &mut self,
        _watchdog: std::time::Duration,
        _on_edge: fanctl_traits::EdgeHandler,
        _on_watchdog: fanctl_traits::WatchdogHandler,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("gpio busy".into())
    }
    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

#[test]
fn subscribe_failure_is_a_tach_error() {
    let err = PulseRateEstimator::new(DeadSource, TachCfg::default()).unwrap_err();
    match err {
        FanError::Tach(msg) => assert!(msg.contains("gpio busy")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn concurrent_edges_and_reads_stay_consistent() {
    let source = ManualPulseSource::new();
    let handle = source.handle();
    let est = Arc::new(PulseRateEstimator::new(
        source,
        TachCfg {
            weighting: 0.9,
            ..TachCfg::default()
        },
    )
    .unwrap());

    let writer = {
        let handle = handle.clone();
        thread::spawn(move || {
            let mut tick = 0u32;
            for i in 0..20_000u32 {
                tick = tick.wrapping_add(20_000);
                handle.edge(tick);
                if i % 97 == 0 {
                    handle.timeout();
                }
            }
        })
    };
    let reader = {
        let est = est.clone();
        thread::spawn(move || {
            for _ in 0..20_000 {
                let rpm = est.get_rpm();
                assert!(rpm == 0.0 || (rpm.is_finite() && rpm > 0.0));
                if let Some(p) = est.state().smoothed_period_us {
                    assert!(p > 0.0);
                }
            }
        })
    };
    writer.join().unwrap();
    reader.join().unwrap();
    assert!(est.get_rpm() > 0.0);
}
