// std
use std::time::Duration;
// crates.io
use http::Method;
use url::Url;
// self
use bearer_session::config::{SessionConfig, SessionConfigBuilder, SessionConfigError};

fn url(value: &str) -> Url {
	Url::parse(value).expect("Failed to parse fixture URL.")
}

fn builder(base: &str) -> SessionConfigBuilder {
	SessionConfig::builder(url(base))
}

#[test]
fn endpoints_resolve_under_the_base_path() {
	let config = builder("https://api.example.com/v1")
		.refresh_path("/auth/refresh")
		.csrf_path("auth/csrf")
		.build()
		.expect("Secure config should build.");

	assert_eq!(config.endpoints.base.as_str(), "https://api.example.com/v1/");
	assert_eq!(config.endpoints.refresh.as_str(), "https://api.example.com/v1/auth/refresh");
	assert_eq!(config.endpoints.csrf.as_str(), "https://api.example.com/v1/auth/csrf");
	assert_eq!(config.endpoints.login.as_str(), "https://api.example.com/v1/login");
	assert_eq!(config.csrf.header_name, "X-CSRF-Token");
	assert_eq!(config.csrf.cookie_name, "csrf_token");
	assert_eq!(config.request_timeout, SessionConfig::DEFAULT_TIMEOUT);
}

#[test]
fn plain_http_is_only_allowed_on_loopback() {
	let err = builder("http://api.example.com/")
		.build()
		.expect_err("Plain HTTP on a public host should be rejected.");

	assert!(matches!(err, SessionConfigError::InsecureEndpoint { endpoint: "base", .. }));

	for base in ["http://localhost:8080/", "http://127.0.0.1:3000/api/", "http://[::1]/"] {
		builder(base).build().expect("Loopback hosts may use plain HTTP.");
	}
}

#[test]
fn csrf_settings_are_validated() {
	let err = builder("https://api.example.com/")
		.csrf_header("X CSRF")
		.build()
		.expect_err("Header names with spaces should be rejected.");

	assert_eq!(err, SessionConfigError::InvalidCsrfHeader { name: "X CSRF".into() });

	let err = builder("https://api.example.com/")
		.csrf_cookie("  ")
		.build()
		.expect_err("Blank cookie names should be rejected.");

	assert_eq!(err, SessionConfigError::EmptyCsrfCookie);

	let config = builder("https://api.example.com/")
		.csrf_header("X-XSRF-TOKEN")
		.csrf_cookie("XSRF-TOKEN")
		.build()
		.expect("Custom CSRF names should build.");

	assert_eq!(config.csrf_header().as_str(), "x-xsrf-token");
}

#[test]
fn mutating_methods_and_timeout_are_validated() {
	let err = builder("https://api.example.com/")
		.mutating_methods([])
		.build()
		.expect_err("An empty mutating set should be rejected.");

	assert_eq!(err, SessionConfigError::NoMutatingMethods);

	let err = builder("https://api.example.com/")
		.request_timeout(Duration::ZERO)
		.build()
		.expect_err("A zero timeout should be rejected.");

	assert_eq!(err, SessionConfigError::ZeroTimeout);

	let config = builder("https://api.example.com/")
		.mutating_methods([Method::POST, Method::POST, Method::DELETE])
		.build()
		.expect("Custom mutating methods should build.");

	assert_eq!(config.mutating_methods, ["POST", "DELETE"]);
	assert!(!config.is_state_mutating(&Method::PUT));
}

#[test]
fn opaque_bases_are_rejected() {
	let err = builder("mailto:ops@example.com")
		.build()
		.expect_err("Opaque URLs cannot act as a base.");

	assert!(matches!(err, SessionConfigError::CannotBeABase { .. }));
}
