// std
use std::{iter::IntoIterator, net::IpAddr};
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	config::{CsrfSettings, SessionConfig, SessionEndpoints},
};

/// Errors raised while constructing or validating session configurations.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum SessionConfigError {
	/// The base URL cannot have paths joined onto it (e.g. `mailto:`).
	#[error("Base URL cannot be used as a base: {url}.")]
	CannotBeABase {
		/// Offending URL.
		url: String,
	},
	/// An endpoint path could not be joined onto the base URL.
	#[error("The {endpoint} path `{path}` is invalid.")]
	InvalidPath {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path that failed to join.
		path: String,
	},
	/// Endpoints must use HTTPS unless they target a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// CSRF header name is not a valid HTTP header name.
	#[error("CSRF header name `{name}` is not a valid header name.")]
	InvalidCsrfHeader {
		/// Offending header name.
		name: String,
	},
	/// CSRF cookie name must not be empty.
	#[error("CSRF cookie name must not be empty.")]
	EmptyCsrfCookie,
	/// At least one method must be treated as state-mutating.
	#[error("At least one method must be marked as state-mutating.")]
	NoMutatingMethods,
	/// Every remote call needs a bounded, non-zero timeout.
	#[error("Request timeout must be greater than zero.")]
	ZeroTimeout,
}

/// Builder for [`SessionConfig`] values.
#[derive(Debug)]
pub struct SessionConfigBuilder {
	/// Base URL of the API.
	pub base: Url,
	/// Refresh endpoint path, relative to the base.
	pub refresh_path: String,
	/// CSRF rotation endpoint path, relative to the base.
	pub csrf_path: String,
	/// Login endpoint path, relative to the base.
	pub login_path: String,
	/// CSRF header and cookie names.
	pub csrf: CsrfSettings,
	/// State-mutating methods.
	pub mutating_methods: Vec<Method>,
	/// Per-call timeout.
	pub request_timeout: StdDuration,
}
impl SessionConfigBuilder {
	/// Creates a new builder seeded with the provided base URL and defaults.
	pub fn new(base: Url) -> Self {
		Self {
			base,
			refresh_path: "refresh".into(),
			csrf_path: "csrf".into(),
			login_path: "login".into(),
			csrf: CsrfSettings::default(),
			mutating_methods: vec![Method::POST, Method::PUT, Method::PATCH, Method::DELETE],
			request_timeout: SessionConfig::DEFAULT_TIMEOUT,
		}
	}

	/// Sets the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Sets the CSRF rotation endpoint path.
	pub fn csrf_path(mut self, path: impl Into<String>) -> Self {
		self.csrf_path = path.into();

		self
	}

	/// Sets the login endpoint path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Sets the header used to send the CSRF token.
	pub fn csrf_header(mut self, name: impl Into<String>) -> Self {
		self.csrf.header_name = name.into();

		self
	}

	/// Sets the cookie the server writes the CSRF token into.
	pub fn csrf_cookie(mut self, name: impl Into<String>) -> Self {
		self.csrf.cookie_name = name.into();

		self
	}

	/// Replaces the set of state-mutating methods.
	pub fn mutating_methods<I>(mut self, methods: I) -> Self
	where
		I: IntoIterator<Item = Method>,
	{
		self.mutating_methods = methods.into_iter().collect();

		self
	}

	/// Sets the per-call timeout.
	pub fn request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<SessionConfig, SessionConfigError> {
		if self.base.cannot_be_a_base() {
			return Err(SessionConfigError::CannotBeABase { url: self.base.to_string() });
		}

		let base = with_trailing_slash(self.base);
		let endpoints = SessionEndpoints {
			refresh: join("refresh", &base, &self.refresh_path)?,
			csrf: join("csrf", &base, &self.csrf_path)?,
			login: join("login", &base, &self.login_path)?,
			base,
		};
		let mut mutating_methods = Vec::new();

		for method in self.mutating_methods {
			let name = method.as_str().to_ascii_uppercase();

			if !mutating_methods.contains(&name) {
				mutating_methods.push(name);
			}
		}

		let config = SessionConfig {
			endpoints,
			csrf: self.csrf,
			mutating_methods,
			request_timeout: self.request_timeout,
		};

		config.validate()?;

		Ok(config)
	}
}

impl SessionConfig {
	/// Validates invariants for the configuration.
	fn validate(&self) -> Result<(), SessionConfigError> {
		validate_endpoint("base", &self.endpoints.base)?;
		validate_endpoint("refresh", &self.endpoints.refresh)?;
		validate_endpoint("csrf", &self.endpoints.csrf)?;
		validate_endpoint("login", &self.endpoints.login)?;

		if HeaderName::from_bytes(self.csrf.header_name.as_bytes()).is_err() {
			return Err(SessionConfigError::InvalidCsrfHeader {
				name: self.csrf.header_name.clone(),
			});
		}
		if self.csrf.cookie_name.trim().is_empty() {
			return Err(SessionConfigError::EmptyCsrfCookie);
		}
		if self.mutating_methods.is_empty() {
			return Err(SessionConfigError::NoMutatingMethods);
		}
		if self.request_timeout.is_zero() {
			return Err(SessionConfigError::ZeroTimeout);
		}

		Ok(())
	}
}

/// Directory-style base so `join("refresh")` keeps the base path.
fn with_trailing_slash(mut url: Url) -> Url {
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url
}

fn join(endpoint: &'static str, base: &Url, path: &str) -> Result<Url, SessionConfigError> {
	base.join(path.trim_start_matches('/'))
		.map_err(|_| SessionConfigError::InvalidPath { endpoint, path: path.to_owned() })
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), SessionConfigError> {
	if url.scheme() == "https" || is_loopback(url) {
		Ok(())
	} else {
		Err(SessionConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	}
}
