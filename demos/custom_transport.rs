//! Demonstrates plugging a non-reqwest transport into [`SessionClient`].
//!
//! 1. Implement [`HttpTransport`] so every call returns an owned, `'static` future.
//! 2. Hand the transport, a [`CredentialStore`], and a [`CsrfSource`] to
//!    [`SessionClient::with_transport`].
//! 3. Send requests; expired tokens are refreshed once and the request is replayed.

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use color_eyre::Result;
use http::{HeaderMap, StatusCode};
use url::Url;
// self
use bearer_session::{
	config::SessionConfig,
	csrf::MemoryCsrfSource,
	error::TransportError,
	http::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
	session::SessionClient,
	store::MemoryCredentialStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = SessionConfig::builder(Url::parse("https://inventory.example.com/api/")?).build()?;
	let store = Arc::new(MemoryCredentialStore::with_token("expired-token"));
	let csrf = Arc::new(MemoryCsrfSource::default());
	let transport = InMemoryInventory::default();
	let refreshes = transport.refreshes.clone();
	let client = SessionClient::<InMemoryInventory>::with_transport(
		config,
		transport,
		store,
		csrf,
	)
	.with_logout_hook(|| println!("The session was logged out."));
	let response = client.send(client.get("items")?).await?;

	println!(
		"Listed items with status {} after {} refresh call(s): {}.",
		response.status,
		refreshes.load(Ordering::SeqCst),
		String::from_utf8_lossy(&response.body)
	);
	println!("Replays recorded by the session: {}.", client.metrics.replays());

	match client.send(client.get("missing")?).await {
		Ok(_) => println!("The missing resource unexpectedly resolved."),
		Err(e) => println!("Non-credential failures surface untouched: {e}."),
	}

	Ok(())
}

/// Fake API that accepts exactly one token and mints it on refresh.
#[derive(Default)]
struct InMemoryInventory {
	refreshes: Arc<AtomicUsize>,
}
impl HttpTransport for InMemoryInventory {
	fn execute(&self, request: ApiRequest) -> TransportFuture {
		let authorized = request
			.headers
			.get(http::header::AUTHORIZATION)
			.is_some_and(|value| value.as_bytes() == b"Bearer live-token");
		let (status, body) = match request.url.path() {
			"/api/refresh" => {
				self.refreshes.fetch_add(1, Ordering::SeqCst);

				(StatusCode::OK, r#"{"access_token":"live-token"}"#)
			},
			"/api/items" if authorized => (StatusCode::OK, r#"[{"sku":"A-1"},{"sku":"B-2"}]"#),
			_ if !authorized => (StatusCode::UNAUTHORIZED, r#"{"error":"expired"}"#),
			_ => (StatusCode::NOT_FOUND, r#"{"error":"not found"}"#),
		};

		Box::pin(async move {
			Ok::<_, TransportError>(ApiResponse::from_parts(
				status,
				HeaderMap::new(),
				body.as_bytes().to_vec(),
			))
		})
	}
}
