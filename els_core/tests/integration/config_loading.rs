//! Configuration files on disk → running core.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use els_common::config::ConfigError;
use els_common::feed::FeedSpec;
use els_core::config::load_config;
use els_core::hal::DriveLines;
use els_core::hal::sim::{ManualCounter, SimInput, SimOutput};
use els_core::{Core, PositionEncoder, RationalFeed, SharedControls, StepPulseGenerator};
use tempfile::NamedTempFile;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn shipped_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/els.toml");
    let loaded = load_config(&path).unwrap();
    assert!(!loaded.feed_table.is_empty());

    let m15 = loaded.feed_table.find("M1.5").unwrap();
    assert_eq!(
        loaded.feed_table.get(m15).unwrap().spec(),
        FeedSpec::new(25, 128).unwrap()
    );
}

#[test]
fn missing_file_is_reported() {
    let err = load_config(Path::new("/nonexistent/els.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let file = write_config("[shared\nservice_name = ");
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn duplicate_feed_names_are_rejected() {
    let file = write_config(
        r#"
[shared]
service_name = "els"

[[feeds]]
name = "x"
numerator = 1
denominator = 2

[[feeds]]
name = "x"
numerator = 1
denominator = 3
"#,
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("duplicate")));
}

#[test]
fn zero_geometry_is_rejected_for_pitch_feeds() {
    let file = write_config(
        r#"
[shared]
service_name = "els"

[machine]
encoder_resolution = 0
stepper_steps_per_rev = 200
microsteps = 8
leadscrew_pitch_um = 3000

[[feeds]]
name = "M1"
pitch_um = 1000
"#,
    );
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn loaded_config_drives_a_core() {
    let file = write_config(
        r#"
[shared]
service_name = "els"

[drive]
max_buffered_steps = 7

[drive.lines.enable]
polarity = "active_low"

[[feeds]]
name = "half"
numerator = 1
denominator = 2
"#,
    );
    let loaded = load_config(file.path()).unwrap();
    let config = loaded.config;

    let enable = SimOutput::new();
    let lines = DriveLines::new(
        SimOutput::new(),
        SimOutput::new(),
        enable.clone(),
        SimInput::new(true),
        &config.drive.lines,
    );
    let encoder = Arc::new(PositionEncoder::new(ManualCounter::new(0)));
    let (mut core, handle) = Core::<_, _, _, RationalFeed>::with_representation(
        Arc::clone(&encoder),
        StepPulseGenerator::new(lines, config.drive.max_buffered_steps),
        loaded.feed_table,
        Arc::new(SharedControls::new()),
    );
    assert!(enable.level(), "active-low enable idles high");

    handle.set_feed_by_name("half").unwrap();
    handle.set_power_on(true);
    core.tick();
    assert!(!enable.level());

    // 16 ticks → 8 steps, one over the configured backlog.
    encoder.counter().advance(16);
    assert!(core.tick().fault.has_critical());
    assert!(enable.level());
}
