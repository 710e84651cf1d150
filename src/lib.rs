//! Bearer-token and CSRF session layer for REST clients: single-flight refresh, CSRF rotation,
//! and replay-once recovery for every in-flight request.

#![deny(clippy::all, missing_docs)]
#![warn(unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod csrf;
pub mod error;
pub mod http;
pub mod obs;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// crates.io
	pub use tokio::sync::Notify;
	// self
	use crate::{
		config::SessionConfig,
		csrf::MemoryCsrfSource,
		error::TransportError,
		http::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
		session::SessionClient,
		store::MemoryCredentialStore,
	};

	/// Handler signature used by [`ScriptedTransport`].
	pub type ScriptHandler = dyn Fn(&ApiRequest) -> TransportFuture + Send + Sync;

	/// Snapshot of a request as it reached the transport.
	#[derive(Clone, Debug)]
	pub struct RecordedCall {
		/// HTTP method.
		pub method: Method,
		/// Request path (no query).
		pub path: String,
		/// Raw `Authorization` header value, if any.
		pub authorization: Option<String>,
		/// Raw CSRF header value, if any.
		pub csrf: Option<String>,
	}

	/// Programmable transport that records every dispatched request in dispatch order.
	#[derive(Clone)]
	pub struct ScriptedTransport {
		csrf_header: String,
		handler: Arc<ScriptHandler>,
		calls: Arc<Mutex<VecDeque<RecordedCall>>>,
		record_on_poll: bool,
	}
	impl ScriptedTransport {
		/// Builds a transport that answers every request through `handler`.
		pub fn new<F>(csrf_header: impl Into<String>, handler: F) -> Self
		where
			F: 'static + Fn(&ApiRequest) -> TransportFuture + Send + Sync,
		{
			Self {
				csrf_header: csrf_header.into(),
				handler: Arc::new(handler),
				calls: Default::default(),
				record_on_poll: false,
			}
		}

		/// Like [`ScriptedTransport::new`], but a call is recorded when its future is first
		/// polled, the way a lazy HTTP client only starts sending once it is awaited.
		pub fn lazy<F>(csrf_header: impl Into<String>, handler: F) -> Self
		where
			F: 'static + Fn(&ApiRequest) -> TransportFuture + Send + Sync,
		{
			Self { record_on_poll: true, ..Self::new(csrf_header, handler) }
		}

		/// Returns every recorded call in the order it reached the transport.
		pub fn calls(&self) -> Vec<RecordedCall> {
			self.calls.lock().iter().cloned().collect()
		}

		/// Returns the recorded calls that targeted `path`.
		pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
			self.calls.lock().iter().filter(|call| call.path == path).cloned().collect()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn execute(&self, request: ApiRequest) -> TransportFuture {
			let header = |name: &str| {
				request.headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
			};

			let call = RecordedCall {
				method: request.method.clone(),
				path: request.url.path().to_owned(),
				authorization: header("authorization"),
				csrf: header(&self.csrf_header),
			};
			let outcome = (self.handler)(&request);

			if !self.record_on_poll {
				self.calls.lock().push_back(call);

				return outcome;
			}

			let calls = self.calls.clone();

			Box::pin(async move {
				calls.lock().push_back(call);

				outcome.await
			})
		}
	}

	/// Resolves immediately with `status` and a JSON `body`.
	pub fn respond(status: u16, body: serde_json::Value) -> TransportFuture {
		let response = scripted_response(status, body);

		Box::pin(async move { Ok(response) })
	}

	/// Resolves with `status` and a JSON `body` once `delay` elapsed.
	pub fn respond_after(delay: StdDuration, status: u16, body: serde_json::Value) -> TransportFuture {
		let response = scripted_response(status, body);

		Box::pin(async move {
			tokio::time::sleep(delay).await;

			Ok(response)
		})
	}

	/// Resolves with `status` and a JSON `body` once `gate` is notified.
	pub fn respond_gated(gate: Arc<Notify>, status: u16, body: serde_json::Value) -> TransportFuture {
		let response = scripted_response(status, body);

		Box::pin(async move {
			gate.notified().await;

			Ok(response)
		})
	}

	/// Fails immediately as if the connection was refused.
	pub fn refuse() -> TransportFuture {
		Box::pin(async {
			Err(TransportError::network(std::io::Error::new(
				std::io::ErrorKind::ConnectionRefused,
				"connection refused",
			)))
		})
	}

	/// Bearer token carried by `request`, if any.
	pub fn bearer(request: &ApiRequest) -> Option<&str> {
		request
			.headers
			.get("authorization")
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix("Bearer "))
	}

	fn scripted_response(status: u16, body: serde_json::Value) -> ApiResponse {
		ApiResponse::from_parts(
			StatusCode::from_u16(status).expect("Scripted status must be a valid HTTP status."),
			HeaderMap::new(),
			body.to_string().into_bytes(),
		)
	}

	/// Session client wired to a [`ScriptedTransport`] used by in-crate tests.
	pub type ScriptedSession = SessionClient<ScriptedTransport>;

	/// Configuration rooted at `http://127.0.0.1/api/` with a 500 ms call timeout.
	pub fn scripted_config() -> SessionConfig {
		SessionConfig::builder(
			Url::parse("http://127.0.0.1/api/").expect("Test base URL should parse."),
		)
		.request_timeout(StdDuration::from_millis(500))
		.build()
		.expect("Test session config should build.")
	}

	/// Builds a session against `http://127.0.0.1` backed by `transport`, an in-memory store
	/// seeded with `token`, and an explicit CSRF source.
	pub fn build_scripted_session(
		transport: ScriptedTransport,
		token: Option<&str>,
	) -> (ScriptedSession, Arc<MemoryCredentialStore>, Arc<MemoryCsrfSource>) {
		let config = scripted_config();
		let store = Arc::new(MemoryCredentialStore::default());
		let csrf = Arc::new(MemoryCsrfSource::default());

		if let Some(token) = token {
			store.replace(token);
		}

		let client = SessionClient::with_transport(config, transport, store.clone(), csrf.clone());

		(client, store, csrf)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use ::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
