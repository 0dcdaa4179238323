#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not. A config that
    // validates must also build a controller and survive a few evaluations.
    let Ok(cfg) = toml::from_str::<fanctl_config::Config>(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    let control: fanctl_core::ControllerCfg = (&cfg.control).into();
    let mut controller = fanctl_core::DutyCycleController::new(control)
        .expect("validated config must build a controller");
    for t in [f64::MIN, -40.0, 0.0, 25.0, 60.0, f64::NAN, f64::MAX] {
        let _ = controller.get_duty_cycle(t);
    }
});
