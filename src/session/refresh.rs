//! Single-flight credential refresh with a FIFO queue of requests waiting on it.
//!
//! The first request that meets a `401` while the coordinator is idle becomes the flight's
//! leader: it flips the state to [`RefreshPhase::Refreshing`], calls the refresh endpoint,
//! and settles every request that queued behind it. The idle check and the transition
//! happen under one lock acquisition, and so do the store update and the transition back
//! to idle, which also drains the queue. A request can therefore never queue behind a
//! flight that has already settled.
//!
//! Replays are started in FIFO order: the trigger first, then the queue in enqueue order.
//! Each replay's transport future is first polled only after its predecessor's was, so the
//! order also holds for transports that send nothing until they are awaited.

// std
use std::{collections::VecDeque, future, mem};
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenGrant},
	error::RefreshError,
	http::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
	obs::{self, RecoveryKind, RecoveryOutcome, RecoverySpan, event},
	session::SessionClient,
};

type Settlement = Result<Replay, RefreshError>;

/// Observable state of the refresh coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPhase {
	/// No refresh in flight.
	Idle,
	/// A refresh call is in flight.
	Refreshing {
		/// Requests waiting for the flight to settle.
		queued: usize,
	},
}

/// A request re-dispatched with a fresh credential, paired with its in-flight outcome.
pub(crate) struct Replay {
	pub(crate) request: ApiRequest,
	pub(crate) outcome: TransportFuture,
}

/// Chains replay starts so each replay is first polled after the one sequenced before it.
///
/// A predecessor that is dropped without ever being polled releases its successor.
#[derive(Default)]
struct ReplayOrder {
	previous: Option<oneshot::Receiver<()>>,
}
impl ReplayOrder {
	fn sequence(&mut self, replay: Replay) -> Replay {
		let Replay { request, outcome } = replay;
		let (started, next) = oneshot::channel();
		let previous = self.previous.replace(next);
		let outcome: TransportFuture = Box::pin(async move {
			if let Some(previous) = previous {
				let _ = previous.await;
			}

			let mut outcome = outcome;
			let mut started = Some(started);

			future::poll_fn(move |cx| {
				let poll = outcome.as_mut().poll(cx);

				if let Some(started) = started.take() {
					let _ = started.send(());
				}

				poll
			})
			.await
		});

		Replay { request, outcome }
	}
}

struct PendingRequest {
	request: ApiRequest,
	settle: oneshot::Sender<Settlement>,
}

#[derive(Default)]
enum RefreshState {
	#[default]
	Idle,
	Refreshing {
		queue: VecDeque<PendingRequest>,
	},
}

/// Single-flight state machine shared by every clone of a session.
#[derive(Default)]
pub(crate) struct RefreshCoordinator {
	state: Mutex<RefreshState>,
}
impl RefreshCoordinator {
	pub(crate) fn phase(&self) -> RefreshPhase {
		match &*self.state.lock() {
			RefreshState::Idle => RefreshPhase::Idle,
			RefreshState::Refreshing { queue } => RefreshPhase::Refreshing { queued: queue.len() },
		}
	}

	/// Admits a request that met a `401`.
	///
	/// `rotated` is consulted only when no flight is active; returning a token there means
	/// the credential changed since the request left and no refresh is needed.
	fn enter<F>(&self, request: ApiRequest, rotated: F) -> Ticket<'_>
	where
		F: FnOnce(&ApiRequest) -> Option<AccessToken>,
	{
		let mut state = self.state.lock();

		if let RefreshState::Refreshing { queue } = &mut *state {
			let (settle, settled) = oneshot::channel();

			queue.push_back(PendingRequest { request, settle });

			return Ticket::Queued(settled);
		}
		if let Some(token) = rotated(&request) {
			return Ticket::Rotated(token, Box::new(request));
		}

		*state = RefreshState::Refreshing { queue: VecDeque::new() };

		Ticket::Lead(RefreshFlight { coordinator: self, settled: false }, Box::new(request))
	}

	/// Runs `commit` and returns to idle in one critical section, handing back the queue.
	fn settle<F>(&self, commit: F) -> VecDeque<PendingRequest>
	where
		F: FnOnce(),
	{
		let mut state = self.state.lock();

		commit();

		match mem::take(&mut *state) {
			RefreshState::Refreshing { queue } => queue,
			RefreshState::Idle => VecDeque::new(),
		}
	}
}

enum Ticket<'a> {
	Rotated(AccessToken, Box<ApiRequest>),
	Lead(RefreshFlight<'a>, Box<ApiRequest>),
	Queued(oneshot::Receiver<Settlement>),
}

/// Leadership over the active flight. Dropping it unsettled rejects the queue.
struct RefreshFlight<'a> {
	coordinator: &'a RefreshCoordinator,
	settled: bool,
}
impl RefreshFlight<'_> {
	fn finish<F>(mut self, commit: F) -> VecDeque<PendingRequest>
	where
		F: FnOnce(),
	{
		self.settled = true;

		self.coordinator.settle(commit)
	}
}
impl Drop for RefreshFlight<'_> {
	fn drop(&mut self) {
		if self.settled {
			return;
		}

		let queue = self.coordinator.settle(|| {});

		event!(warn, queued = queue.len(), "refresh abandoned before it settled");

		for pending in queue {
			let _ = pending.settle.send(Err(RefreshError::Abandoned));
		}
	}
}

impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Routes a request that was answered with `401` through the single-flight refresh.
	///
	/// Starts a refresh when none is in flight, otherwise waits for the active one. The
	/// request is replayed once with the new credential and its outcome goes back through
	/// recovery with the auth retry spent. When the refresh fails the session is logged out
	/// and the refresh error is returned.
	pub async fn coordinate_refresh(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		request.markers.auth_retried = true;

		let Replay { request, outcome } = self.reauthenticate(request).await?;
		let outcome = outcome.await;

		self.drive(request, outcome).await
	}

	pub(crate) async fn reauthenticate(&self, request: ApiRequest) -> Result<Replay, RefreshError> {
		let ticket = self.coordinator.enter(request, |request| {
			let current = self.current_token()?;

			(request.sent_with() != Some(&current)).then_some(current)
		});

		match ticket {
			Ticket::Rotated(token, request) => {
				event!(debug, "credential changed since dispatch; replaying without a refresh");

				Ok(self.prepare_replay(*request, &token))
			},
			Ticket::Lead(flight, request) => self.lead_refresh(flight, *request).await,
			Ticket::Queued(settled) => {
				event!(debug, "refresh in flight; request queued");

				settled.await.unwrap_or(Err(RefreshError::Abandoned))
			},
		}
	}

	async fn lead_refresh(
		&self,
		flight: RefreshFlight<'_>,
		request: ApiRequest,
	) -> Result<Replay, RefreshError> {
		const KIND: RecoveryKind = RecoveryKind::Refresh;

		let span = RecoverySpan::new(KIND, "lead_refresh");

		obs::record_recovery(KIND, RecoveryOutcome::Attempt);
		self.metrics.record_refresh_attempt();

		match span.instrument(self.call_refresh()).await {
			Ok(token) => {
				let queue = flight.finish(|| {
					if let Err(e) = self.store.set(token.clone()) {
						event!(warn, error = %e, "refreshed token could not be stored");
					}
				});

				self.metrics.record_refresh_success();
				obs::record_recovery(KIND, RecoveryOutcome::Success);
				event!(debug, queued = queue.len(), "refresh succeeded; replaying");

				let mut order = ReplayOrder::default();
				let replay = order.sequence(self.prepare_replay(request, &token));

				for PendingRequest { request, settle } in queue {
					let _ = settle.send(Ok(order.sequence(self.prepare_replay(request, &token))));
				}

				Ok(replay)
			},
			Err(e) => {
				let queue = flight.finish(|| {
					if let Err(e) = self.store.clear() {
						event!(warn, error = %e, "credential store could not be cleared");
					}
				});

				self.metrics.record_refresh_failure();
				event!(warn, error = %e, queued = queue.len(), "refresh failed");

				for pending in queue {
					let _ = pending.settle.send(Err(e.clone()));
				}

				self.force_logout();

				Err(e)
			},
		}
	}

	async fn call_refresh(&self) -> Result<AccessToken, RefreshError> {
		let mut request =
			ApiRequest::new(Method::POST, self.config.endpoints.refresh.clone()).without_recovery();
		let response = self.dispatch(&mut request).await?;

		if !response.status.is_success() {
			return Err(RefreshError::Rejected { status: response.status.as_u16() });
		}

		let grant = serde_json::from_slice::<TokenGrant>(&response.body)
			.map_err(|e| RefreshError::MalformedResponse { message: e.to_string() })?;

		if grant.access_token.is_empty() {
			return Err(RefreshError::MalformedResponse {
				message: "access token is empty".into(),
			});
		}

		Ok(grant.access_token)
	}

	/// Decorates `request` with `token` and hands it to the transport without awaiting it.
	fn prepare_replay(&self, mut request: ApiRequest, token: &AccessToken) -> Replay {
		self.decorate_with(&mut request, Some(token));
		self.metrics.record_replay();
		obs::record_recovery(RecoveryKind::Replay, RecoveryOutcome::Attempt);

		let outcome = self.execute_timed(request.clone());

		Replay { request, outcome }
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::_preludet::*;

	async fn wait_for_phase(client: &ScriptedSession, phase: RefreshPhase) {
		while client.refresh_phase() != phase {
			tokio::task::yield_now().await;
		}
	}

	fn spawn_get(
		client: &ScriptedSession,
		path: &str,
	) -> tokio::task::JoinHandle<Result<ApiResponse>> {
		let client = client.clone();
		let request = client.get(path).expect("Path should resolve.");

		tokio::spawn(async move { client.send(request).await })
	}

	/// `/api/refresh` answers through `refresh`; every other path accepts only `fresh`.
	fn refreshing_transport<F>(refresh: F) -> ScriptedTransport
	where
		F: 'static + Fn() -> TransportFuture + Send + Sync,
	{
		ScriptedTransport::new("x-csrf-token", move |request| match request.url.path() {
			"/api/refresh" => refresh(),
			_ if bearer(request) == Some("fresh") => respond(200, serde_json::json!({ "ok": true })),
			_ => respond(401, serde_json::json!({ "error": "expired" })),
		})
	}

	#[tokio::test]
	async fn concurrent_unauthorized_requests_share_one_refresh() {
		let transport = refreshing_transport(|| {
			respond_after(
				StdDuration::from_millis(50),
				200,
				serde_json::json!({ "access_token": "fresh" }),
			)
		});
		let (client, store, _) = build_scripted_session(transport.clone(), Some("stale"));
		let handles = (0..5).map(|i| spawn_get(&client, &format!("items/{i}"))).collect::<Vec<_>>();

		for handle in handles {
			let response =
				handle.await.expect("Task should join.").expect("Request should recover.");

			assert_eq!(response.status, StatusCode::OK);
		}

		assert_eq!(transport.calls_to("/api/refresh").len(), 1);
		assert_eq!(client.metrics.refresh_attempts(), 1);
		assert_eq!(client.metrics.refresh_successes(), 1);
		assert_eq!(client.metrics.replays(), 5);
		assert_eq!(store.current(), Some(AccessToken::new("fresh")));
		assert_eq!(client.refresh_phase(), RefreshPhase::Idle);
	}

	#[tokio::test]
	async fn queued_requests_replay_in_enqueue_order() {
		let gate = Arc::new(Notify::new());
		let refresh_gate = gate.clone();
		let transport = refreshing_transport(move || {
			respond_gated(refresh_gate.clone(), 200, serde_json::json!({ "access_token": "fresh" }))
		});
		let (client, _, _) = build_scripted_session(transport.clone(), Some("stale"));
		let leader = spawn_get(&client, "trigger");

		wait_for_phase(&client, RefreshPhase::Refreshing { queued: 0 }).await;

		let mut queued = Vec::new();

		for (i, path) in ["a", "b", "c"].into_iter().enumerate() {
			queued.push(spawn_get(&client, path));
			wait_for_phase(&client, RefreshPhase::Refreshing { queued: i + 1 }).await;
		}

		gate.notify_one();

		for handle in std::iter::once(leader).chain(queued) {
			handle.await.expect("Task should join.").expect("Request should recover.");
		}

		let replayed = transport
			.calls()
			.into_iter()
			.filter(|call| call.authorization.as_deref() == Some("Bearer fresh"))
			.map(|call| call.path)
			.collect::<Vec<_>>();

		assert_eq!(replayed, ["/api/trigger", "/api/a", "/api/b", "/api/c"]);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn lazy_transport_replays_start_in_enqueue_order() {
		let gate = Arc::new(Notify::new());
		let refresh_gate = gate.clone();
		let transport = ScriptedTransport::lazy("x-csrf-token", move |request| {
			match request.url.path() {
				"/api/refresh" => respond_gated(
					refresh_gate.clone(),
					200,
					serde_json::json!({ "access_token": "fresh" }),
				),
				_ if bearer(request) == Some("fresh") => respond(200, serde_json::json!({ "ok": true })),
				_ => respond(401, serde_json::json!({ "error": "expired" })),
			}
		});
		let (client, _, _) = build_scripted_session(transport.clone(), Some("stale"));
		let leader = spawn_get(&client, "trigger");

		wait_for_phase(&client, RefreshPhase::Refreshing { queued: 0 }).await;

		let paths = (0..12).map(|i| format!("q{i:02}")).collect::<Vec<_>>();
		let mut queued = Vec::new();

		for (i, path) in paths.iter().enumerate() {
			queued.push(spawn_get(&client, path));
			wait_for_phase(&client, RefreshPhase::Refreshing { queued: i + 1 }).await;
		}

		gate.notify_one();

		for handle in std::iter::once(leader).chain(queued) {
			handle.await.expect("Task should join.").expect("Request should recover.");
		}

		let replayed = transport
			.calls()
			.into_iter()
			.filter(|call| call.authorization.as_deref() == Some("Bearer fresh"))
			.map(|call| call.path)
			.collect::<Vec<_>>();
		let expected = std::iter::once("/api/trigger".to_owned())
			.chain(paths.iter().map(|path| format!("/api/{path}")))
			.collect::<Vec<_>>();

		assert_eq!(replayed, expected);
		assert_eq!(transport.calls_to("/api/refresh").len(), 1);
		assert_eq!(client.refresh_phase(), RefreshPhase::Idle);
	}

	#[tokio::test]
	async fn dropped_replay_releases_the_next_in_line() {
		let transport = ScriptedTransport::lazy("x-csrf-token", |_| {
			respond(200, serde_json::json!({ "ok": true }))
		});
		let (client, _, _) = build_scripted_session(transport.clone(), Some("fresh"));
		let token = AccessToken::new("fresh");
		let mut order = ReplayOrder::default();
		let first = order.sequence(
			client.prepare_replay(client.get("first").expect("Path should resolve."), &token),
		);
		let second = order.sequence(
			client.prepare_replay(client.get("second").expect("Path should resolve."), &token),
		);

		drop(first);

		let response = second.outcome.await.expect("Second replay should run.");

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(
			transport.calls().into_iter().map(|call| call.path).collect::<Vec<_>>(),
			["/api/second"]
		);
	}

	#[tokio::test]
	async fn failed_refresh_logs_out_once_and_rejects_the_queue() {
		let gate = Arc::new(Notify::new());
		let refresh_gate = gate.clone();
		let transport = refreshing_transport(move || {
			respond_gated(refresh_gate.clone(), 401, serde_json::json!({ "error": "revoked" }))
		});
		let (client, store, _) = build_scripted_session(transport.clone(), Some("stale"));
		let logouts = Arc::new(AtomicUsize::new(0));
		let hook_logouts = logouts.clone();
		let client = client.with_logout_hook(move || {
			hook_logouts.fetch_add(1, Ordering::SeqCst);
		});
		let leader = spawn_get(&client, "trigger");

		wait_for_phase(&client, RefreshPhase::Refreshing { queued: 0 }).await;

		let waiters = [spawn_get(&client, "a"), spawn_get(&client, "b")];

		wait_for_phase(&client, RefreshPhase::Refreshing { queued: 2 }).await;
		gate.notify_one();

		for handle in std::iter::once(leader).chain(waiters) {
			let err = handle.await.expect("Task should join.").expect_err("Refresh should fail.");

			assert!(matches!(err, Error::Refresh(RefreshError::Rejected { status: 401 })));
		}

		assert_eq!(logouts.load(Ordering::SeqCst), 1);
		assert_eq!(client.metrics.forced_logouts(), 1);
		assert_eq!(client.metrics.refresh_failures(), 1);
		assert_eq!(store.current(), None);
		assert_eq!(transport.calls_to("/api/refresh").len(), 1);
		assert_eq!(client.refresh_phase(), RefreshPhase::Idle);
	}

	#[tokio::test]
	async fn timed_out_refresh_is_a_refresh_failure() {
		let transport = refreshing_transport(|| {
			respond_after(
				StdDuration::from_secs(5),
				200,
				serde_json::json!({ "access_token": "late" }),
			)
		});
		let (client, store, _) = build_scripted_session(transport, Some("stale"));
		let logouts = Arc::new(AtomicUsize::new(0));
		let hook_logouts = logouts.clone();
		let client = client.with_logout_hook(move || {
			hook_logouts.fetch_add(1, Ordering::SeqCst);
		});
		let err = client
			.send(client.get("items").expect("Path should resolve."))
			.await
			.expect_err("Timed-out refresh should fail the request.");

		assert!(matches!(
			err,
			Error::Refresh(RefreshError::Timeout { after }) if after == StdDuration::from_millis(500)
		));
		assert_eq!(logouts.load(Ordering::SeqCst), 1);
		assert_eq!(store.current(), None);
	}

	#[tokio::test]
	async fn malformed_refresh_body_is_rejected() {
		let transport = refreshing_transport(|| respond(200, serde_json::json!({ "access_token": "" })));
		let (client, store, _) = build_scripted_session(transport, Some("stale"));
		let err = client
			.send(client.get("items").expect("Path should resolve."))
			.await
			.expect_err("Empty token should fail the refresh.");

		assert!(matches!(err, Error::Refresh(RefreshError::MalformedResponse { .. })));
		assert_eq!(store.current(), None);
	}

	#[tokio::test]
	async fn abandoned_flight_rejects_waiters_without_logout() {
		let gate = Arc::new(Notify::new());
		let refresh_gate = gate.clone();
		let transport = refreshing_transport(move || {
			respond_gated(refresh_gate.clone(), 200, serde_json::json!({ "access_token": "fresh" }))
		});
		let (client, store, _) = build_scripted_session(transport, Some("stale"));
		let logouts = Arc::new(AtomicUsize::new(0));
		let hook_logouts = logouts.clone();
		let client = client.with_logout_hook(move || {
			hook_logouts.fetch_add(1, Ordering::SeqCst);
		});
		let leader = spawn_get(&client, "trigger");

		wait_for_phase(&client, RefreshPhase::Refreshing { queued: 0 }).await;

		let waiter = spawn_get(&client, "a");

		wait_for_phase(&client, RefreshPhase::Refreshing { queued: 1 }).await;
		leader.abort();

		let err = waiter
			.await
			.expect("Task should join.")
			.expect_err("Waiter should be rejected when the leader is dropped.");

		assert!(matches!(err, Error::Refresh(RefreshError::Abandoned)));
		assert_eq!(logouts.load(Ordering::SeqCst), 0);
		assert_eq!(store.current(), Some(AccessToken::new("stale")));
		assert_eq!(client.refresh_phase(), RefreshPhase::Idle);
	}

	#[tokio::test]
	async fn rotated_credential_replays_without_refreshing() {
		let transport = refreshing_transport(|| respond(500, serde_json::json!({})));
		let (client, store, _) = build_scripted_session(transport.clone(), Some("old"));
		let mut request = client.get("items").expect("Path should resolve.");

		client.decorate(&mut request);
		store.replace("fresh");

		let response =
			client.coordinate_refresh(request).await.expect("Replay with the new token should pass.");

		assert_eq!(response.status, StatusCode::OK);
		assert!(transport.calls_to("/api/refresh").is_empty());
		assert_eq!(client.metrics.refresh_attempts(), 0);
		assert_eq!(client.metrics.replays(), 1);
	}
}
