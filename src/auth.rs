//! Bearer-token model: persisted token keys, redacted secrets, and the refresh flow.

pub mod refresh;
pub mod secret;

pub use refresh::*;
pub use secret::*;

// self
use crate::_prelude::*;

/// Keys under which tokens are persisted in the device store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TokenKey {
	/// Access token attached as `Authorization: Bearer`.
	#[serde(rename = "userToken")]
	Access,
	/// Refresh token exchanged for a new access token after a 401.
	#[serde(rename = "refreshToken")]
	Refresh,
}
impl TokenKey {
	/// Both keys, in storage order.
	pub const ALL: [TokenKey; 2] = [TokenKey::Access, TokenKey::Refresh];

	/// Returns the storage key string.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenKey::Access => "userToken",
			TokenKey::Refresh => "refreshToken",
		}
	}
}
impl Display for TokenKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Session state reported alongside [`Error::AuthExpired`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
	/// A fresh access token is stored; re-issuing the request should succeed.
	Refreshed,
	/// Refresh failed and both tokens were cleared; the user must sign in again.
	LoggedOut,
}
impl SessionState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionState::Refreshed => "refreshed",
			SessionState::LoggedOut => "logged_out",
		}
	}
}
impl Display for SessionState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
