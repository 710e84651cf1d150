//! Credential storage contract and built-in store implementations.
//!
//! The session reads the store on every dispatch and mutates it only when a refresh
//! settles, a login succeeds, or the session is logged out. Writes happen inside the
//! refresh coordinator's critical section, so implementations must be synchronous and
//! must not block for long.

pub mod file;
pub mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

// self
use crate::{_prelude::*, auth::AccessToken};

/// Storage backend contract for the session's access token.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the current access token, if any.
	fn get(&self) -> Result<Option<AccessToken>, StoreError>;

	/// Replaces the current access token.
	fn set(&self, token: AccessToken) -> Result<(), StoreError>;

	/// Removes the current access token.
	fn clear(&self) -> Result<(), StoreError>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
