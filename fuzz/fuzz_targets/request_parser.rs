//! Fuzz target for request token extraction.
//!
//! Tests the default parser chain against arbitrary headers, query
//! parameters and cookies.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use keystone_jwt::{HttpRequest, RequestParser};

/// Arbitrary request parts for fuzzing.
#[derive(Debug, Arbitrary)]
struct FuzzRequest {
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    cookie_header: String,
}

fuzz_target!(|data: FuzzRequest| {
    let mut request = HttpRequest::new("GET", "/").with_header("Cookie", data.cookie_header);
    for (name, value) in data.headers {
        request = request.with_header(name, value);
    }
    for (name, value) in data.query {
        request = request.with_query(name, value);
    }

    let parser = RequestParser::default();
    if let Some(token) = parser.parse_token(&request) {
        // Extracted tokens are trimmed and never empty
        assert!(!token.is_empty());
        assert_eq!(token.trim(), token);
    }
});
