//! Skips wiremock tests where localhost sockets cannot be bound.
//!
//! Set `CHAPTERDL_REQUIRE_SOCKET_TESTS=1` in CI to turn a skip into a failure.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_VAR: &str = "CHAPTERDL_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_VAR)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a mock server, or returns `None` (after a note on stderr) when the
/// sandbox forbids binding a localhost port.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl std::future::Future<Output = Option<MockServer>> {
    let caller = Location::caller();
    let bindable = TcpListener::bind("127.0.0.1:0").is_ok();
    if !bindable {
        let note = format!("localhost sockets unavailable for {}:{}", caller.file(), caller.line());
        assert!(!sockets_required(), "{note}; unset {REQUIRE_VAR} to allow skipping");
        eprintln!("{note}; skipping");
    }
    async move {
        if bindable {
            Some(MockServer::start().await)
        } else {
            None
        }
    }
}
