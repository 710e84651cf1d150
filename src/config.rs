//! Session configuration: endpoints, CSRF wiring, mutating methods, and timeouts.
//!
//! Values are validated once by [`SessionConfigBuilder::build`] so the recovery pipeline
//! never has to handle malformed endpoints at request time.

/// Builder API for assembling session configurations.
pub mod builder;

pub use builder::*;

// self
use crate::_prelude::*;

/// Endpoint set resolved against the API base URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEndpoints {
	/// Base URL every relative request path is resolved against.
	pub base: Url,
	/// Credential refresh endpoint (`POST`).
	pub refresh: Url,
	/// CSRF mint/rotation endpoint (`GET`).
	pub csrf: Url,
	/// Login endpoint (`POST`).
	pub login: Url,
}

/// Where the CSRF token is read from and where it is attached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfSettings {
	/// Request header carrying the token on mutating requests.
	pub header_name: String,
	/// Cookie the server writes the token into.
	pub cookie_name: String,
}
impl Default for CsrfSettings {
	fn default() -> Self {
		Self { header_name: "X-CSRF-Token".into(), cookie_name: "csrf_token".into() }
	}
}

/// Immutable, validated session configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
	/// Resolved endpoints.
	pub endpoints: SessionEndpoints,
	/// CSRF header and cookie names.
	pub csrf: CsrfSettings,
	/// Upper-case method names that mutate server state and therefore carry the CSRF token.
	pub mutating_methods: Vec<String>,
	/// Upper bound for every remote call, including refresh and CSRF rotation.
	pub request_timeout: StdDuration,
}
impl SessionConfig {
	/// Default per-call timeout.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(10);

	/// Creates a new builder for the provided API base URL.
	pub fn builder(base: Url) -> SessionConfigBuilder {
		SessionConfigBuilder::new(base)
	}

	/// Whether requests with `method` mutate state and must carry the CSRF token.
	pub fn is_state_mutating(&self, method: &Method) -> bool {
		self.mutating_methods.iter().any(|candidate| candidate == method.as_str())
	}

	/// Parsed CSRF header name.
	pub fn csrf_header(&self) -> HeaderName {
		// Validated by the builder; the fallback only triggers for hand-edited configs.
		HeaderName::from_bytes(self.csrf.header_name.as_bytes())
			.unwrap_or_else(|_| HeaderName::from_static("x-csrf-token"))
	}
}
