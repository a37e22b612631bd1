#![no_main]

use ballast_config::BallastConfig;
use libfuzzer_sys::fuzz_target;

// Goal: never panic on arbitrary config text. Any input either parses (and
// validates without panicking) or yields a typed error.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok((config, _warnings)) = BallastConfig::from_toml_str(text) {
        let _ = config.validate();
        let _ = config.governor_settings();
        let _ = config.yield_batch_size();
    }
});
