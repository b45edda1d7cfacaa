use dripmon_config::load_toml;

#[test]
fn empty_config_uses_reference_defaults() {
    let cfg = load_toml("").expect("empty config parses");
    assert_eq!(cfg.timing.tick_ms, 1000);
    assert_eq!(cfg.timing.fast_convergence_ms, 60_000);
    assert_eq!(cfg.timing.no_drip_timeout_ms, 10_000);
    assert!((cfg.tare.equipment_g - 12.0).abs() < 1e-6);
    assert!((cfg.tare.empty_bag_g - 60.0).abs() < 1e-6);
    assert_eq!(cfg.wpd.drops_per_ml, 20);
    assert!((cfg.weight_filter.r - 50.0).abs() < 1e-6);
    assert_eq!(cfg.wpd_calibration.min_drops, 30);
    assert!(cfg.device.device_id.is_none());
}

#[test]
fn partial_sections_override_only_named_fields() {
    let cfg = load_toml(
        r#"
[weight_filter]
r = 25.0

[timing]
tick_ms = 500

[device]
device_id = "bed-7"
target_empty_g = 5.0
"#,
    )
    .expect("parses");
    assert!((cfg.weight_filter.r - 25.0).abs() < 1e-6);
    // untouched fields keep defaults
    assert!((cfg.weight_filter.sigma_a - 0.0005).abs() < 1e-9);
    assert_eq!(cfg.timing.tick_ms, 500);
    assert_eq!(cfg.timing.stall_check_ms, 10_000);
    assert_eq!(cfg.device.device_id.as_deref(), Some("bed-7"));
    assert_eq!(cfg.device.target_empty_g, Some(5.0));
}

#[test]
fn logging_section_round_trips() {
    let cfg = load_toml(
        r#"
[logging]
file = "var/dripmon.log"
level = "debug"
rotation = "daily"
"#,
    )
    .expect("parses");
    assert_eq!(cfg.logging.file.as_deref(), Some("var/dripmon.log"));
    assert_eq!(cfg.logging.level.as_deref(), Some("debug"));
    assert_eq!(cfg.logging.rotation.as_deref(), Some("daily"));
}

#[test]
fn wrong_types_are_rejected() {
    let err = load_toml(
        r#"
[timing]
tick_ms = "fast"
"#,
    )
    .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("tick_ms") || msg.contains("invalid type"), "{msg}");
}

#[test]
fn unknown_keys_are_tolerated() {
    // Firmware configs often carry extra sections for collaborators.
    let cfg = load_toml(
        r#"
[display]
oled = true
"#,
    );
    assert!(cfg.is_ok());
}
