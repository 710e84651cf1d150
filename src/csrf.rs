//! Anti-CSRF token side channel.
//!
//! The server writes the CSRF token into an ambient channel (a cookie in browser-like
//! deployments) on login and on every `GET /csrf` rotation. The client never mints its own
//! value; it only reads whatever the channel currently holds through [`CsrfSource`].

#[cfg(feature = "reqwest")] use reqwest::cookie::{CookieStore, Jar};
// self
use crate::{_prelude::*, auth::CsrfToken};

/// Read-only view over the channel carrying the server-issued CSRF token.
pub trait CsrfSource
where
	Self: Send + Sync,
{
	/// Returns the current CSRF token, if the server has issued one.
	fn current(&self) -> Option<CsrfToken>;
}

/// Explicitly managed CSRF slot for deployments where the token arrives outside a cookie jar.
#[derive(Clone, Debug, Default)]
pub struct MemoryCsrfSource(Arc<RwLock<Option<CsrfToken>>>);
impl MemoryCsrfSource {
	/// Replaces the held token.
	pub fn replace(&self, token: impl Into<String>) {
		*self.0.write() = Some(CsrfToken::new(token));
	}

	/// Drops the held token.
	pub fn clear(&self) {
		self.0.write().take();
	}
}
impl CsrfSource for MemoryCsrfSource {
	fn current(&self) -> Option<CsrfToken> {
		self.0.read().clone().filter(|token| !token.is_empty())
	}
}

/// Reads a named cookie out of the reqwest cookie jar shared with the transport.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct CookieCsrfSource {
	jar: Arc<Jar>,
	url: Url,
	cookie_name: String,
}
#[cfg(feature = "reqwest")]
impl CookieCsrfSource {
	/// Watches `cookie_name` as scoped to `url`.
	pub fn new(jar: Arc<Jar>, url: Url, cookie_name: impl Into<String>) -> Self {
		Self { jar, url, cookie_name: cookie_name.into() }
	}
}
#[cfg(feature = "reqwest")]
impl CsrfSource for CookieCsrfSource {
	fn current(&self) -> Option<CsrfToken> {
		let header = self.jar.cookies(&self.url)?;

		find_cookie(header.to_str().ok()?, &self.cookie_name).map(CsrfToken::new)
	}
}

/// Extracts `name` from a `Cookie` header value (`a=1; b=2`).
fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
	header
		.split(';')
		.filter_map(|pair| pair.trim().split_once('='))
		.find(|(key, _)| *key == name)
		.map(|(_, value)| value.trim_matches('"'))
		.filter(|value| !value.is_empty())
}
