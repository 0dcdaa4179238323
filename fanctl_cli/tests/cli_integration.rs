use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

const VALID: &str = r#"
[pins]
rpm_gpio = 24
pwm_gpio = 18

[control]
duty_cycle_min = 50
duty_cycle_max = 255
thresholds = [30.0, 40.0, 50.0]
duty_cycle_values = [120, 190]
hysteresis = 2.0
hysteresis_stuck_counter = 3

[runner]
loop_duration_s = 0.05
"#;

fn write_config(dir: &tempfile::TempDir, toml: &str) -> PathBuf {
    let path = dir.path().join("fanctl.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "Config OK (4 bands)", "stdout")]
#[case(&["run", "--simulate", "--cycles", "2"], 0, "Stopped after 2 cycles.", "stdout")]
#[case(&["run", "--cycles", "1", "--loop-duration-s", "0"], 0, "rpm", "stdout")]
#[case(&["bogus"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);

    let mut cmd = Command::cargo_bin("fanctl").unwrap();
    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn self_check_lists_bands() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);
    Command::cargo_bin("fanctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("below 30.0 °C"))
        .stdout(predicate::str::contains("duty 120 ( 47%)"))
        .stdout(predicate::str::contains("above 50.0 °C"));
}

#[test]
fn self_check_reads_the_sensor_file() {
    let dir = tempdir().unwrap();
    let sensor = dir.path().join("w1_slave");
    fs::write(
        &sensor,
        "59 01 4b 46 7f ff 07 10 a2 : crc=a2 YES\n59 01 4b 46 7f ff 07 10 a2 t=21562\n",
    )
    .unwrap();
    let toml = format!(
        "{VALID}\n[sensor]\npath_temperature_file = \"{}\"\n",
        sensor.display()
    );
    let cfg = write_config(&dir, &toml);
    Command::cargo_bin("fanctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sensor: 21.6 °C"));
}

#[test]
fn bad_sensor_crc_is_a_sensor_error() {
    let dir = tempdir().unwrap();
    let sensor = dir.path().join("w1_slave");
    fs::write(
        &sensor,
        "59 01 4b 46 7f ff 07 10 a2 : crc=a2 NO\n59 01 4b 46 7f ff 07 10 a2 t=21562\n",
    )
    .unwrap();
    let toml = format!(
        "{VALID}\n[sensor]\npath_temperature_file = \"{}\"\n",
        sensor.display()
    );
    let cfg = write_config(&dir, &toml);
    Command::cargo_bin("fanctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .code(5)
        .stderr(predicate::str::contains("DS18B20"));
}

#[test]
fn missing_config_explains_the_path() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("fanctl")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not read the config file"));
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, &VALID.replace("hysteresis = 2.0", "hysteresis = -1.0"));
    Command::cargo_bin("fanctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--cycles")
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("control.hysteresis must be >= 0"));
}

#[test]
fn json_run_emits_one_line_per_cycle() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);
    let out = Command::cargo_bin("fanctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .arg("run")
        .arg("--simulate")
        .arg("--cycles")
        .arg("3")
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 4);
    // the simulated thermometer starts 5 °C below the first threshold
    assert_eq!(lines[0]["temperature"], 25.0);
    assert_eq!(lines[0]["duty_cycle"], 50);
    assert_eq!(lines[0]["duty_cycle_percent"], 20);
    assert_eq!(lines[1]["temperature"], 25.5);
    assert_eq!(lines[3]["cycles"], 3);
}

#[test]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, &VALID.replace("duty_cycle_values = [120, 190]", "duty_cycle_values = [120]"));
    let out = Command::cargo_bin("fanctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .arg("self-check")
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8(out.stderr).unwrap();
    let line = stderr.lines().find(|l| l.starts_with('{')).unwrap();
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "Error");
    assert!(v["message"].as_str().unwrap().contains("duty_cycle_values"));
}

#[test]
fn local_export_writes_the_last_cycle() {
    let dir = tempdir().unwrap();
    let export = dir.path().join("out").join("values.json");
    let toml = format!(
        "{VALID}\n[export]\nenable_local_export = true\npath_export_file = \"{}\"\n",
        export.display()
    );
    let cfg = write_config(&dir, &toml);
    Command::cargo_bin("fanctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--simulate")
        .arg("--cycles")
        .arg("2")
        .assert()
        .success();
    let v: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(v["temperature"], 25.5);
    assert_eq!(v["duty_cycle"], 50);
    assert!(v["rpm"].is_u64());
}
