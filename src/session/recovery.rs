//! Failure classification and the replay-once recovery loop.
//!
//! [`SessionClient::send`] drives each request as a loop over `(request, outcome)` pairs:
//! a failed outcome is classified into a [`Recovery`] strategy, the strategy runs, and the
//! replay's outcome is fed back into the loop. Each strategy flips a marker on the request
//! before it runs, so a request is rotated at most once and refreshed at most once.

// self
use crate::{
	_prelude::*,
	config::SessionConfig,
	error::{HttpFailure, TransportError},
	http::{ApiRequest, ApiResponse, HttpTransport, RetryMarkers, TransportFuture},
	obs::{self, RecoveryKind, RecoveryOutcome, RecoverySpan, event},
	session::SessionClient,
};

/// Strategy applied to a failed response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
	/// Return the failure to the caller unchanged.
	Surface,
	/// Rotate the CSRF token and replay once.
	RotateCsrf,
	/// Refresh the access token through the coordinator and replay once.
	Reauthenticate,
}
impl Recovery {
	/// Picks the strategy for a response with `status` to `request`.
	pub fn classify(config: &SessionConfig, request: &ApiRequest, status: StatusCode) -> Self {
		let markers = request.markers;

		if status == StatusCode::FORBIDDEN
			&& !markers.csrf_retried
			&& config.is_state_mutating(&request.method)
		{
			Self::RotateCsrf
		} else if status == StatusCode::UNAUTHORIZED && !markers.auth_retried {
			Self::Reauthenticate
		} else {
			Self::Surface
		}
	}
}

impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Decorates and dispatches `request`, recovering from credential failures.
	///
	/// Transport failures are returned immediately. A `403` on a mutating request triggers
	/// one CSRF rotation; a `401` triggers one single-flight refresh. Anything else, or a
	/// failure repeated after its recovery already ran, is surfaced as
	/// [`Error::Status`].
	pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		const KIND: RecoveryKind = RecoveryKind::Request;

		let span = RecoverySpan::new(KIND, "send");

		span.instrument(async move {
			let outcome = self.dispatch(&mut request).await;

			self.drive(request, outcome).await
		})
		.await
	}

	/// Asks the server to rotate the CSRF token.
	///
	/// A `401` from the rotation endpoint runs one refresh cycle that replays the rotation.
	pub async fn rotate_csrf(&self) -> Result<()> {
		self.renew_csrf().await.map(|_| ())
	}

	/// Rotates the CSRF token and reports whether the access token was refreshed on the way.
	async fn renew_csrf(&self) -> Result<bool> {
		const KIND: RecoveryKind = RecoveryKind::CsrfRotation;

		let span = RecoverySpan::new(KIND, "rotate_csrf");

		obs::record_recovery(KIND, RecoveryOutcome::Attempt);
		self.metrics.record_csrf_rotation();

		let result = span
			.instrument(async {
				let mut request = ApiRequest::new(Method::GET, self.config.endpoints.csrf.clone());

				request.markers = RetryMarkers { csrf_retried: true, auth_retried: false };

				let mut response = self.dispatch(&mut request).await?;
				let refreshed = response.status == StatusCode::UNAUTHORIZED;

				if refreshed {
					request.markers.auth_retried = true;

					let replay = self.reauthenticate(request).await?;

					request = replay.request;
					response = replay.outcome.await?;
				}
				if !response.status.is_success() {
					return Err(HttpFailure::new(request.method, request.url, response).into());
				}

				Ok::<_, Error>(refreshed)
			})
			.await;

		match &result {
			Ok(_) => obs::record_recovery(KIND, RecoveryOutcome::Success),
			Err(_) => obs::record_recovery(KIND, RecoveryOutcome::Failure),
		}

		result
	}

	pub(crate) async fn drive(
		&self,
		mut request: ApiRequest,
		mut outcome: Result<ApiResponse, TransportError>,
	) -> Result<ApiResponse> {
		loop {
			let response = outcome?;

			if !response.is_failure() {
				return Ok(response);
			}

			let recovery = Recovery::classify(&self.config, &request, response.status);

			event!(
				debug,
				method = %request.method,
				status = response.status.as_u16(),
				?recovery,
				"request failed"
			);

			match recovery {
				Recovery::Surface =>
					return Err(HttpFailure::new(request.method, request.url, response).into()),
				Recovery::RotateCsrf => {
					request.markers.csrf_retried = true;

					match self.renew_csrf().await {
						// The rotation already ran a credential cycle for this request.
						Ok(refreshed) => request.markers.auth_retried |= refreshed,
						Err(e) => {
							event!(warn, error = %e, "CSRF rotation failed; surfacing the rejection");

							return Err(HttpFailure::new(request.method, request.url, response).into());
						},
					}

					self.metrics.record_replay();
					obs::record_recovery(RecoveryKind::Replay, RecoveryOutcome::Attempt);

					outcome = self.dispatch(&mut request).await;
				},
				Recovery::Reauthenticate => {
					request.markers.auth_retried = true;

					let replay = self.reauthenticate(request).await?;

					request = replay.request;
					outcome = replay.outcome.await;
				},
			}
		}
	}

	/// Decorates `request` from the current store and CSRF state and dispatches it.
	pub(crate) fn dispatch(&self, request: &mut ApiRequest) -> TransportFuture {
		self.decorate(request);

		self.execute_timed(request.clone())
	}

	/// Hands `request` to the transport, bounded by the configured timeout.
	pub(crate) fn execute_timed(&self, request: ApiRequest) -> TransportFuture {
		let after = self.config.request_timeout;
		let outcome = self.transport.execute(request);

		Box::pin(async move {
			tokio::time::timeout(after, outcome)
				.await
				.unwrap_or(Err(TransportError::Timeout { after }))
		})
	}
}
