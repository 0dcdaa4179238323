//! Hardware assembly, the paced control loop and the self-check.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::WrapErr;
use fanctl_config::Config;
use fanctl_core::{
    CycleReport, DutyCycleController, FanError, FanLoop, LocalExport, PulseRateEstimator, TachCfg,
    duty_cycle_percent,
};
use fanctl_traits::clock::MonotonicClock;
use fanctl_traits::{PulseSource, PwmOutput, Thermometer};

use crate::metrics::Metrics;

/// Top speed of the simulated fan.
const SIM_MAX_RPM: f64 = 3000.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOpts {
    pub simulate: bool,
    pub cycles: Option<u64>,
    pub loop_duration_s: Option<f64>,
}

pub fn run(cfg: &Config, opts: RunOpts, json: bool) -> eyre::Result<()> {
    let loop_duration_s = opts.loop_duration_s.unwrap_or(cfg.runner.loop_duration_s);
    if !(loop_duration_s.is_finite() && loop_duration_s >= 0.0) {
        eyre::bail!("--loop-duration-s must be a non-negative number of seconds");
    }
    let period = Duration::from_secs_f64(loop_duration_s);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    let controller = DutyCycleController::new((&cfg.control).into())?;
    let tach: TachCfg = (&cfg.tach).into();

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        if !opts.simulate {
            let path = cfg.temperature_path().ok_or_else(|| {
                eyre::eyre!("sensor.path_temperature_file is required when driving real hardware")
            })?;
            let thermometer = fanctl_hardware::W1Thermometer::new(path);
            let pwm = fanctl_hardware::pi::GpioPwm::new(
                cfg.pins.pwm_gpio,
                cfg.runner.pwm_frequency_hz,
            )
            .wrap_err("open pwm pin")?;
            let estimator = PulseRateEstimator::new(
                fanctl_hardware::pi::GpioPulseSource::new(cfg.pins.rpm_gpio),
                tach,
            )?;
            tracing::info!(
                rpm_gpio = cfg.pins.rpm_gpio,
                pwm_gpio = cfg.pins.pwm_gpio,
                "driving hardware fan"
            );
            let fan_loop = FanLoop::new(thermometer, pwm, estimator, controller);
            return drive(cfg, fan_loop, period, &shutdown, opts.cycles, json);
        }
    }

    if !opts.simulate {
        tracing::info!("built without hardware support; using the simulated fan");
    }
    let fan = fanctl_hardware::SimulatedFan::new(SIM_MAX_RPM, cfg.tach.pulses_per_revolution);
    let estimator = PulseRateEstimator::new(fan.pulse_source(), tach)?;
    let fan_loop = FanLoop::new(simulated_thermometer(cfg), fan.pwm(), estimator, controller);
    drive(cfg, fan_loop, period, &shutdown, opts.cycles, json)
}

/// Sweeps a few degrees past both ends of the threshold range.
fn simulated_thermometer(cfg: &Config) -> fanctl_hardware::SimulatedThermometer {
    let t = &cfg.control.thresholds;
    let low = t.first().copied().unwrap_or(20.0) - 5.0;
    let high = t.last().copied().unwrap_or(30.0) + 5.0;
    fanctl_hardware::SimulatedThermometer::new(low, high, 0.5)
}

fn drive<T, W, P>(
    cfg: &Config,
    fan_loop: FanLoop<T, W, P>,
    period: Duration,
    shutdown: &AtomicBool,
    cycles: Option<u64>,
    json: bool,
) -> eyre::Result<()>
where
    T: Thermometer,
    W: PwmOutput,
    P: PulseSource,
{
    let mut fan_loop = fan_loop.with_sink(move |r: &CycleReport| -> Result<(), FanError> {
        print_report(r, json);
        Ok(())
    });

    if cfg.export.enable_local_export {
        let path = cfg
            .export_path()
            .ok_or_else(|| eyre::eyre!("export.path_export_file is not set"))?;
        tracing::info!(path = %path.display(), "local export enabled");
        fan_loop = fan_loop.with_sink(LocalExport::new(path));
    }
    if cfg.export.enable_prometheus_exporter {
        let metrics = Metrics::new()?;
        metrics.serve(SocketAddr::from((
            Ipv4Addr::UNSPECIFIED,
            cfg.export.prometheus_port,
        )))?;
        fan_loop = fan_loop.with_sink(metrics);
    }

    tracing::info!(period_s = period.as_secs_f64(), "fan loop starting");
    let result = fan_loop.run_until(period, &MonotonicClock::new(), shutdown, cycles);
    let cleanup = fan_loop.shutdown();
    let n = result?;
    cleanup?;

    if json {
        println!("{}", serde_json::json!({ "stopped": true, "cycles": n }));
    } else {
        println!("Stopped after {n} cycles.");
    }
    Ok(())
}

fn print_report(r: &CycleReport, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "temperature": r.temperature,
                "duty_cycle": r.duty_cycle.value,
                "duty_cycle_percent": r.duty_cycle.percent,
                "rpm": r.rpm,
            })
        );
    } else {
        println!(
            "{:5.1} °C  duty {:3} ({:3}%)  {:5} rpm",
            r.temperature, r.duty_cycle.value, r.duty_cycle.percent, r.rpm
        );
    }
}

/// Validate the config, build the controller and print its table. Reads the
/// temperature sensor once when one is configured.
pub fn self_check(cfg: &Config, json: bool) -> eyre::Result<()> {
    let controller = DutyCycleController::new((&cfg.control).into())?;
    let table = controller.table();
    let thresholds = table.thresholds();
    let values = table.values();

    let temperature = match cfg.temperature_path() {
        Some(path) => Some(
            fanctl_hardware::W1Thermometer::new(&path)
                .read()
                .map_err(|e| FanError::Sensor(format!("{}: {e}", path.display())))?,
        ),
        None => None,
    };

    if json {
        let percent: Vec<u8> = values.iter().map(|&v| duty_cycle_percent(v)).collect();
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "thresholds": thresholds,
                "duty_cycle_values": values,
                "duty_cycle_percent": percent,
                "temperature": temperature,
            })
        );
        return Ok(());
    }

    println!("Config OK ({} bands)", values.len());
    for (i, &v) in values.iter().enumerate() {
        let band = if i == 0 {
            format!("below {:.1} °C", thresholds[0])
        } else if i == thresholds.len() {
            format!("above {:.1} °C", thresholds[i - 1])
        } else {
            format!("{:.1}..{:.1} °C", thresholds[i - 1], thresholds[i])
        };
        println!("  {band:<20} duty {v:3} ({:3}%)", duty_cycle_percent(v));
    }
    if let Some(t) = temperature {
        println!("Sensor: {t:.1} °C");
    }
    Ok(())
}
