//! Logs in against a live API and keeps the session alive with the default reqwest transport.
//!
//! ```sh
//! BEARER_SESSION_BASE=https://api.example.com/ \
//! BEARER_SESSION_USER=ada BEARER_SESSION_PASSWORD=secret \
//! cargo run --example reqwest_session -- profile
//! ```

// std
use std::env;
// crates.io
use color_eyre::{Result, eyre::WrapErr};
use serde::Serialize;
use url::Url;
// self
use bearer_session::{config::SessionConfig, session::SessionClient};

#[derive(Serialize)]
struct Credentials {
	email: String,
	password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let base = env::var("BEARER_SESSION_BASE").wrap_err("BEARER_SESSION_BASE must be set")?;
	let credentials = Credentials {
		email: env::var("BEARER_SESSION_USER").wrap_err("BEARER_SESSION_USER must be set")?,
		password: env::var("BEARER_SESSION_PASSWORD")
			.wrap_err("BEARER_SESSION_PASSWORD must be set")?,
	};
	let path = env::args().nth(1).unwrap_or_else(|| "me".into());
	let client = SessionClient::new(SessionConfig::builder(Url::parse(&base)?).build()?)?
		.with_logout_hook(|| eprintln!("Refresh failed; the session was cleared."));

	client.login(&credentials).await?;

	let response = client.send(client.get(&path)?).await?;
	let body = response.json::<serde_json::Value>()?;

	println!("{}", serde_json::to_string_pretty(&body)?);
	println!(
		"Refreshes: {}, CSRF rotations: {}, replays: {}.",
		client.metrics.refresh_attempts(),
		client.metrics.csrf_rotations(),
		client.metrics.replays()
	);

	Ok(())
}
