//! Session-level error types shared by the transport, the stores, and the recovery pipeline.

// self
use crate::{_prelude::*, http::ApiResponse};

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error surfaced to callers once local recovery is exhausted.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// No response reached the client (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The server answered with a failure status that this layer could not recover from.
	#[error(transparent)]
	Status(Box<HttpFailure>),
	/// The credential refresh failed. The session has been logged out unless the refresh was
	/// [abandoned](RefreshError::Abandoned).
	#[error(transparent)]
	Refresh(#[from] RefreshError),
	/// Response body did not match the expected JSON shape.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl Error {
	/// Returns the HTTP status carried by the error, if a response was received.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			Self::Status(failure) => Some(failure.status),
			Self::Refresh(RefreshError::Rejected { status }) => StatusCode::from_u16(*status).ok(),
			_ => None,
		}
	}

	/// Whether the error is a surfaced `403` (CSRF rejection or plain forbidden).
	pub fn is_csrf_rejection(&self) -> bool {
		matches!(self, Self::Status(failure) if failure.status == StatusCode::FORBIDDEN)
	}

	/// Whether the error is a surfaced `401`.
	pub fn is_unauthenticated(&self) -> bool {
		matches!(self, Self::Status(failure) if failure.status == StatusCode::UNAUTHORIZED)
	}
}
impl From<HttpFailure> for Error {
	fn from(failure: HttpFailure) -> Self {
		Self::Status(Box::new(failure))
	}
}

/// Failed response surfaced unchanged to the caller.
#[derive(Debug, ThisError)]
#[error("{method} {url} failed with status {status}.")]
pub struct HttpFailure {
	/// Method of the failed request.
	pub method: Method,
	/// URL of the failed request.
	pub url: Url,
	/// Response status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpFailure {
	/// Captures a failed response for the given request line.
	pub fn new(method: Method, url: Url, response: ApiResponse) -> Self {
		let (status, headers, body) = response.into_parts();

		Self { method, url, status, headers, body }
	}

	/// Returns the body as UTF-8 text, replacing invalid sequences.
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Configuration and construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Session configuration failed validation.
	#[error(transparent)]
	Session(#[from] crate::config::SessionConfigError),
	/// A request path could not be resolved against the base URL.
	#[error("Path `{path}` cannot be resolved against the base URL.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	BodySerialize(#[source] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures: no response reached the client.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request did not complete within the configured timeout.
	#[error("Request timed out after {after:?}.")]
	Timeout {
		/// Configured timeout that elapsed.
		after: StdDuration,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Credential refresh failures.
///
/// The type is `Clone` because one failed refresh rejects every request queued behind it.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// Refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the session with status {status}.")]
	Rejected {
		/// HTTP status code returned by the refresh endpoint.
		status: u16,
	},
	/// No response reached the client.
	#[error("Refresh request failed in transit: {message}.")]
	Transport {
		/// Rendered transport failure.
		message: String,
	},
	/// Refresh did not complete within the configured timeout.
	#[error("Refresh request timed out after {after:?}.")]
	Timeout {
		/// Configured timeout that elapsed.
		after: StdDuration,
	},
	/// Refresh endpoint answered 2xx without a usable access token.
	#[error("Refresh endpoint returned a malformed response: {message}.")]
	MalformedResponse {
		/// Parsing failure summary.
		message: String,
	},
	/// The task driving the refresh was dropped before it settled.
	#[error("Refresh was abandoned before it settled.")]
	Abandoned,
}
impl From<TransportError> for RefreshError {
	fn from(e: TransportError) -> Self {
		match e {
			TransportError::Timeout { after } => Self::Timeout { after },
			e => Self::Transport { message: e.to_string() },
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_session_error_with_source() {
		let store_error = crate::store::StoreError::Backend { message: "disk unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk unreachable"));

		let source = StdError::source(&error)
			.expect("Session error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn status_helpers_classify_surfaced_failures() {
		let url = Url::parse("https://api.example.com/items").expect("Fixture URL should parse.");
		let forbidden = Error::from(HttpFailure::new(
			Method::POST,
			url.clone(),
			ApiResponse::from_parts(StatusCode::FORBIDDEN, HeaderMap::new(), b"csrf".to_vec()),
		));
		let unauthorized = Error::from(HttpFailure::new(
			Method::GET,
			url,
			ApiResponse::from_parts(StatusCode::UNAUTHORIZED, HeaderMap::new(), Vec::new()),
		));

		assert!(forbidden.is_csrf_rejection());
		assert!(!forbidden.is_unauthenticated());
		assert_eq!(forbidden.status(), Some(StatusCode::FORBIDDEN));
		assert!(unauthorized.is_unauthenticated());
		assert_eq!(
			forbidden.to_string(),
			"POST https://api.example.com/items failed with status 403 Forbidden."
		);

		let refresh = Error::from(RefreshError::Rejected { status: 401 });

		assert_eq!(refresh.status(), Some(StatusCode::UNAUTHORIZED));
		assert!(!refresh.is_unauthenticated());
	}

	#[test]
	fn timeouts_keep_their_kind_when_refreshing() {
		let after = StdDuration::from_millis(250);

		assert_eq!(
			RefreshError::from(TransportError::Timeout { after }),
			RefreshError::Timeout { after }
		);
		assert!(matches!(
			RefreshError::from(TransportError::Io(std::io::Error::other("reset"))),
			RefreshError::Transport { .. }
		));
	}
}
