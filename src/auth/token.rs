//! Typed wrappers for the two credentials a session carries.
//!
//! Both wrappers serialize as plain strings but redact their value in `Debug` and
//! `Display`, so they can sit inside logged structs without leaking.

// self
use crate::_prelude::*;

macro_rules! def_token {
	($name:ident, $doc:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);
		impl $name {
			/// Wraps a raw token value.
			pub fn new(value: impl Into<String>) -> Self {
				Self(value.into())
			}

			/// Returns the raw value. Callers must avoid logging this string.
			pub fn expose(&self) -> &str {
				&self.0
			}

			/// Whether the token carries no value.
			pub fn is_empty(&self) -> bool {
				self.0.is_empty()
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.debug_tuple(stringify!($name)).field(&"<redacted>").finish()
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str("<redacted>")
			}
		}
		impl From<&str> for $name {
			fn from(value: &str) -> Self {
				Self::new(value)
			}
		}
		impl From<String> for $name {
			fn from(value: String) -> Self {
				Self::new(value)
			}
		}
	};
}

def_token!(AccessToken, "Short-lived bearer credential authenticating a request.");
def_token!(CsrfToken, "Anti-forgery token required on state-mutating requests.");

/// Token payload returned by the refresh and login endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenGrant {
	/// Newly issued access token.
	#[serde(alias = "accessToken", alias = "token")]
	pub access_token: AccessToken,
}
