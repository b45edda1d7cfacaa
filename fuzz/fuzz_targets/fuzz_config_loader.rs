#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Fuzz TOML parsing of Config: arbitrary input must be rejected
    // gracefully, never by panicking.
    let _ = dripmon_config::load_toml(data);
});
