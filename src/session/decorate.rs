// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	http::{ApiRequest, HttpTransport},
	obs::event,
	session::SessionClient,
};

impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Attaches the current bearer token and, for mutating methods, the current CSRF token.
	///
	/// Headers are replaced rather than appended, so decorating twice against unchanged
	/// store and CSRF state yields identical headers. Missing credentials are skipped.
	pub fn decorate(&self, request: &mut ApiRequest) {
		let token = self.current_token();

		self.decorate_with(request, token.as_ref());
	}

	pub(crate) fn decorate_with(&self, request: &mut ApiRequest, token: Option<&AccessToken>) {
		request.sent_with = None;

		if let Some(token) = token {
			match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
				Ok(mut value) => {
					value.set_sensitive(true);
					request.headers.insert(http::header::AUTHORIZATION, value);
					request.sent_with = Some(token.clone());
				},
				Err(_) => {
					request.headers.remove(http::header::AUTHORIZATION);
					event!(warn, "access token is not a valid header value; sending without it");
				},
			}
		} else {
			request.headers.remove(http::header::AUTHORIZATION);
		}

		if !self.config.is_state_mutating(&request.method) {
			return;
		}

		let header = self.config.csrf_header();

		match self.csrf.current().map(|csrf| HeaderValue::from_str(csrf.expose())) {
			Some(Ok(mut value)) => {
				value.set_sensitive(true);
				request.headers.insert(header, value);
			},
			Some(Err(_)) => {
				request.headers.remove(&header);
				event!(warn, "CSRF token is not a valid header value; sending without it");
			},
			None => {
				request.headers.remove(&header);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, csrf::MemoryCsrfSource};

	fn session(token: Option<&str>) -> (ScriptedSession, Arc<MemoryCsrfSource>) {
		let transport = ScriptedTransport::new("x-csrf-token", |_| respond(200, serde_json::json!({})));
		let (client, _, csrf) = build_scripted_session(transport, token);

		(client, csrf)
	}

	fn header<'a>(request: &'a ApiRequest, name: &str) -> Option<&'a str> {
		request.headers.get(name).and_then(|value| value.to_str().ok())
	}

	#[test]
	fn mutating_requests_carry_bearer_and_csrf() {
		let (client, csrf) = session(Some("access-1"));

		csrf.replace("csrf-1");

		let mut request = client.post("items").expect("Path should resolve.");

		client.decorate(&mut request);

		assert_eq!(header(&request, "authorization"), Some("Bearer access-1"));
		assert_eq!(header(&request, "x-csrf-token"), Some("csrf-1"));
		assert_eq!(request.sent_with(), Some(&AccessToken::new("access-1")));
		assert!(request.headers.get("authorization").is_some_and(HeaderValue::is_sensitive));
	}

	#[test]
	fn safe_requests_skip_csrf_and_missing_credentials_are_omitted() {
		let (client, csrf) = session(None);

		csrf.replace("csrf-1");

		let mut get = client.get("items").expect("Path should resolve.");
		let mut post = client.post("items").expect("Path should resolve.");

		client.decorate(&mut get);
		csrf.clear();
		client.decorate(&mut post);

		assert_eq!(header(&get, "authorization"), None);
		assert_eq!(header(&get, "x-csrf-token"), None);
		assert_eq!(header(&post, "x-csrf-token"), None);
		assert!(get.sent_with().is_none());
	}

	#[test]
	fn decoration_is_idempotent() {
		let (client, csrf) = session(Some("access-1"));

		csrf.replace("csrf-1");

		let mut request = client.delete("items/3").expect("Path should resolve.");

		client.decorate(&mut request);

		let once = request.headers.clone();

		client.decorate(&mut request);

		assert_eq!(request.headers, once);
		assert_eq!(request.headers.get_all("authorization").iter().count(), 1);
		assert_eq!(request.headers.get_all("x-csrf-token").iter().count(), 1);
	}
}
