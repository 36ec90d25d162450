//! Fuzz target for token decoding.
//!
//! Arbitrary strings and hand-assembled segments must be rejected with an
//! error, never a panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;

use keystone_jwt::{JwtConfig, Manager, Token};

/// Arbitrary token material.
#[derive(Debug, Arbitrary)]
struct FuzzToken {
    /// Raw token text
    raw: String,
    /// Segments joined with dots
    segments: Vec<String>,
}

fn manager() -> &'static Manager {
    static MANAGER: OnceLock<Manager> = OnceLock::new();
    MANAGER.get_or_init(|| Manager::new(JwtConfig::new("fuzz-secret")).unwrap())
}

fn runtime() -> &'static tokio::runtime::Runtime {
    static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
    })
}

fuzz_target!(|data: FuzzToken| {
    let manager = manager();
    let joined = data.segments.join(".");

    for candidate in [data.raw.as_str(), joined.as_str()] {
        let token = Token::new(candidate);
        let decoded = runtime().block_on(manager.decode(&token, true, true));
        assert!(decoded.is_err(), "forged token accepted: {:?}", candidate);

        let _ = candidate.parse::<Token>();
    }
});
