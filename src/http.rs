//! Transport primitives: request/response descriptors and the [`HttpTransport`] seam.
//!
//! The session never talks to an HTTP stack directly. Every dispatch goes through
//! [`HttpTransport::execute`], which receives a fully decorated [`ApiRequest`] and returns a
//! `'static` future. The returned future may be lazy, sending nothing until it is first
//! polled; replays released by one refresh are first polled in FIFO order either way.

#[cfg(feature = "reqwest")] use reqwest::cookie::Jar;
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::{ConfigError, TransportError},
};

/// Future returned by [`HttpTransport::execute`].
pub type TransportFuture =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'static + Send>>;

/// Abstraction over HTTP stacks capable of executing session requests.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared by
/// every clone of a session, and the futures they return must own whatever state they need.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches `request` and resolves with the raw response, or with a
	/// [`TransportError`] when no response reached the client.
	fn execute(&self, request: ApiRequest) -> TransportFuture;
}

/// Per-request flags bounding recovery to one attempt of each kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryMarkers {
	/// Set once the request went through a CSRF rotation.
	pub csrf_retried: bool,
	/// Set once the request went through a credential refresh.
	pub auth_retried: bool,
}
impl RetryMarkers {
	/// Markers with both recovery kinds already spent.
	pub const EXHAUSTED: Self = Self { csrf_retried: true, auth_retried: true };
}

/// Outgoing request descriptor, replayable verbatim apart from its headers.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Request headers; the session overwrites the credential headers on every dispatch.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
	/// Recovery attempts already spent on this logical request.
	pub markers: RetryMarkers,
	pub(crate) sent_with: Option<AccessToken>,
}
impl ApiRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self {
			method,
			url,
			headers: HeaderMap::new(),
			body: None,
			markers: RetryMarkers::default(),
			sent_with: None,
		}
	}

	/// Sets (replacing) a header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Sets a raw request body.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `value` as the JSON body and sets the matching content type.
	pub fn json<T>(mut self, value: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let body = serde_json::to_vec(value).map_err(ConfigError::BodySerialize)?;

		self.headers
			.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
		self.body = Some(body);

		Ok(self)
	}

	/// Opts this request out of every recovery strategy.
	pub fn without_recovery(mut self) -> Self {
		self.markers = RetryMarkers::EXHAUSTED;

		self
	}

	/// Access token this request was last decorated with.
	pub fn sent_with(&self) -> Option<&AccessToken> {
		self.sent_with.as_ref()
	}
}

/// Raw response returned by a transport.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// Response status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Assembles a response from its parts.
	pub fn from_parts(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
		Self { status, headers, body }
	}

	/// Splits the response into its parts.
	pub fn into_parts(self) -> (StatusCode, HeaderMap, Vec<u8>) {
		(self.status, self.headers, self.body)
	}

	/// Whether the status is a client or server error and therefore enters recovery.
	pub fn is_failure(&self) -> bool {
		self.status.is_client_error() || self.status.is_server_error()
	}

	/// Decodes the body as JSON, reporting the failing path on mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::Decode { source })
	}
}

/// Thin wrapper around [`ReqwestClient`] sharing a cookie jar with the CSRF side channel.
///
/// The jar captures the server's `Set-Cookie` headers (CSRF token, refresh cookie) and
/// replays them on every request, so the refresh endpoint receives its ambient credential
/// without the session touching it.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	jar: Arc<Jar>,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a client with a fresh cookie jar.
	pub fn new() -> Result<Self, ConfigError> {
		let jar = Arc::new(Jar::default());
		let client = ReqwestClient::builder().cookie_provider(jar.clone()).build()?;

		Ok(Self { client, jar })
	}

	/// Wraps an existing client; `jar` must be the cookie provider the client was built with.
	pub fn with_client(client: ReqwestClient, jar: Arc<Jar>) -> Self {
		Self { client, jar }
	}

	/// Cookie jar shared with the underlying client.
	pub fn jar(&self) -> Arc<Jar> {
		self.jar.clone()
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: ApiRequest) -> TransportFuture {
		let client = self.client.clone();

		Box::pin(async move {
			let ApiRequest { method, url, headers, body, .. } = request;
			let mut builder = client.request(method, url).headers(headers);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok::<_, TransportError>(ApiResponse::from_parts(status, headers, body))
		})
	}
}
