//! Authenticated session client: request decoration, single-flight refresh, and recovery.
//!
//! [`SessionClient`] owns the transport, the credential store, the CSRF side channel, and
//! the refresh coordinator. Clones share all of them, so a refresh started through one
//! clone is joined by requests sent through any other.

pub mod metrics;
pub mod recovery;
pub mod refresh;

mod decorate;

pub use metrics::SessionMetrics;
pub use recovery::Recovery;
pub use refresh::RefreshPhase;

// self
#[cfg(feature = "reqwest")]
use crate::{csrf::CookieCsrfSource, http::ReqwestTransport, store::MemoryCredentialStore};
use crate::{
	_prelude::*,
	auth::{AccessToken, CsrfToken, TokenGrant},
	config::SessionConfig,
	csrf::CsrfSource,
	error::{ConfigError, HttpFailure},
	http::{ApiRequest, HttpTransport},
	obs::{self, event},
	session::refresh::RefreshCoordinator,
	store::CredentialStore,
};

#[cfg(feature = "reqwest")]
/// Session specialized for the crate's default reqwest transport.
pub type ReqwestSession = SessionClient<ReqwestTransport>;

/// Side effect invoked when the session is forcibly logged out after a failed refresh.
pub trait LogoutHook
where
	Self: Send + Sync,
{
	/// Called exactly once per unrecoverable refresh failure, after the store was cleared.
	fn force_logout(&self);
}
impl<F> LogoutHook for F
where
	F: Fn() + Send + Sync,
{
	fn force_logout(&self) {
		self()
	}
}

/// Logout hook that does nothing beyond the credential clear the session already performs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogout;
impl LogoutHook for NoopLogout {
	fn force_logout(&self) {}
}

/// HTTP client that keeps a bearer session and its CSRF token alive across failures.
pub struct SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for every outbound request.
	pub transport: Arc<T>,
	/// Store holding the current access token.
	pub store: Arc<dyn CredentialStore>,
	/// Side channel the server writes the CSRF token into.
	pub csrf: Arc<dyn CsrfSource>,
	/// Hook invoked on forced logout.
	pub logout_hook: Arc<dyn LogoutHook>,
	/// Validated configuration.
	pub config: SessionConfig,
	/// Shared recovery counters.
	pub metrics: Arc<SessionMetrics>,
	coordinator: Arc<RefreshCoordinator>,
}
impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a session over a caller-provided transport, store, and CSRF source.
	pub fn with_transport(
		config: SessionConfig,
		transport: impl Into<Arc<T>>,
		store: Arc<dyn CredentialStore>,
		csrf: Arc<dyn CsrfSource>,
	) -> Self {
		Self {
			transport: transport.into(),
			store,
			csrf,
			logout_hook: Arc::new(NoopLogout),
			config,
			metrics: Default::default(),
			coordinator: Default::default(),
		}
	}

	/// Sets or replaces the forced-logout hook.
	pub fn with_logout_hook(mut self, hook: impl 'static + LogoutHook) -> Self {
		self.logout_hook = Arc::new(hook);

		self
	}

	/// Current state of the refresh coordinator.
	pub fn refresh_phase(&self) -> RefreshPhase {
		self.coordinator.phase()
	}

	/// Reads the CSRF token currently held by the side channel.
	pub fn read_csrf(&self) -> Option<CsrfToken> {
		self.csrf.current()
	}

	/// Builds a request for `path`, resolved against the configured base URL.
	pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest, ConfigError> {
		let url = self.config.endpoints.base.join(path.trim_start_matches('/')).map_err(
			|source| ConfigError::InvalidPath { path: path.to_owned(), source },
		)?;

		Ok(ApiRequest::new(method, url))
	}

	/// Shorthand for a `GET` request against the base URL.
	pub fn get(&self, path: &str) -> Result<ApiRequest, ConfigError> {
		self.request(Method::GET, path)
	}

	/// Shorthand for a `POST` request against the base URL.
	pub fn post(&self, path: &str) -> Result<ApiRequest, ConfigError> {
		self.request(Method::POST, path)
	}

	/// Shorthand for a `PUT` request against the base URL.
	pub fn put(&self, path: &str) -> Result<ApiRequest, ConfigError> {
		self.request(Method::PUT, path)
	}

	/// Shorthand for a `PATCH` request against the base URL.
	pub fn patch(&self, path: &str) -> Result<ApiRequest, ConfigError> {
		self.request(Method::PATCH, path)
	}

	/// Shorthand for a `DELETE` request against the base URL.
	pub fn delete(&self, path: &str) -> Result<ApiRequest, ConfigError> {
		self.request(Method::DELETE, path)
	}

	/// Exchanges `credentials` for an access token at the login endpoint and stores it.
	///
	/// The login call never enters recovery: a rejected login is surfaced as-is.
	pub async fn login<B>(&self, credentials: &B) -> Result<AccessToken>
	where
		B: ?Sized + Serialize,
	{
		let mut request = ApiRequest::new(Method::POST, self.config.endpoints.login.clone())
			.json(credentials)?
			.without_recovery();
		let response = self.dispatch(&mut request).await?;

		if response.is_failure() {
			return Err(HttpFailure::new(request.method, request.url, response).into());
		}

		let grant = response.json::<TokenGrant>()?;

		self.store.set(grant.access_token.clone())?;
		event!(debug, "session established");

		Ok(grant.access_token)
	}

	/// Drops the local credential. Subsequent requests go out without a bearer token.
	pub fn logout(&self) -> Result<()> {
		self.store.clear()?;
		event!(debug, "session cleared by caller");

		Ok(())
	}

	/// Reads the store, treating read failures as "no credential".
	pub(crate) fn current_token(&self) -> Option<AccessToken> {
		match self.store.get() {
			Ok(token) => token.filter(|token| !token.is_empty()),
			Err(e) => {
				event!(warn, error = %e, "credential store read failed; sending without a token");

				None
			},
		}
	}

	/// Counts a forced logout and runs the logout hook. The refresh flight cleared the store
	/// when it settled.
	pub(crate) fn force_logout(&self) {
		self.metrics.record_forced_logout();
		obs::record_recovery(obs::RecoveryKind::Refresh, obs::RecoveryOutcome::Failure);
		event!(warn, "refresh failed; forcing logout");
		self.logout_hook.force_logout();
	}
}
impl<T> Clone for SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			csrf: self.csrf.clone(),
			logout_hook: self.logout_hook.clone(),
			config: self.config.clone(),
			metrics: self.metrics.clone(),
			coordinator: self.coordinator.clone(),
		}
	}
}
#[cfg(feature = "reqwest")]
impl SessionClient<ReqwestTransport> {
	/// Creates a session on the default reqwest transport.
	///
	/// The transport's cookie jar carries the refresh cookie and doubles as the CSRF side
	/// channel; the access token is kept in memory.
	pub fn new(config: SessionConfig) -> Result<Self> {
		let transport = ReqwestTransport::new()?;
		let csrf = CookieCsrfSource::new(
			transport.jar(),
			config.endpoints.base.clone(),
			config.csrf.cookie_name.clone(),
		);

		Ok(Self::with_transport(
			config,
			transport,
			Arc::new(MemoryCredentialStore::default()),
			Arc::new(csrf),
		))
	}
}
impl<T> Debug for SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionClient")
			.field("base", &self.config.endpoints.base.as_str())
			.field("refresh_phase", &self.refresh_phase())
			.finish()
	}
}
