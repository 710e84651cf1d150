//! Thread-safe in-memory [`CredentialStore`] for browser-like clients and tests.

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	store::{CredentialStore, StoreError},
};

/// Keeps the access token in-process; it does not survive a restart.
#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore(Arc<RwLock<Option<AccessToken>>>);
impl MemoryCredentialStore {
	/// Creates a store seeded with `token`.
	pub fn with_token(token: impl Into<String>) -> Self {
		let store = Self::default();

		store.replace(token);

		store
	}

	/// Infallible replacement used by callers holding the concrete type.
	pub fn replace(&self, token: impl Into<String>) {
		*self.0.write() = Some(AccessToken::new(token));
	}

	/// Returns the current token without going through the trait.
	pub fn current(&self) -> Option<AccessToken> {
		self.0.read().clone()
	}
}
impl CredentialStore for MemoryCredentialStore {
	fn get(&self) -> Result<Option<AccessToken>, StoreError> {
		Ok(self.current())
	}

	fn set(&self, token: AccessToken) -> Result<(), StoreError> {
		*self.0.write() = Some(token);

		Ok(())
	}

	fn clear(&self) -> Result<(), StoreError> {
		self.0.write().take();

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn clones_share_the_same_slot() {
		let store = MemoryCredentialStore::with_token("access-1");
		let clone = store.clone();

		clone.set(AccessToken::new("access-2")).expect("Memory store writes should succeed.");

		assert_eq!(store.current(), Some(AccessToken::new("access-2")));

		store.clear().expect("Memory store clears should succeed.");

		assert_eq!(clone.get().expect("Memory store reads should succeed."), None);
	}
}
