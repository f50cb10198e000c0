//! Correlation identifiers for outbound requests.
//!
//! Every request carries a [`RequestId`] that the server echoes back in its
//! response. Identifiers are random 128-bit values rendered in the familiar
//! UUID v4 layout (`xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx`), so they stay unique
//! for the lifetime of the process with overwhelming probability.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Builder;

/// Correlation token embedded in a request and echoed in its response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh identifier.
    ///
    /// Randomness comes from the thread-local generator in `rand`; the version
    /// and variant bits are fixed so the result is a well-formed v4 UUID.
    ///
    /// # Examples
    ///
    /// ```
    /// use netview::RequestId;
    ///
    /// let a = RequestId::generate();
    /// let b = RequestId::generate();
    /// assert_ne!(a, b);
    /// assert_eq!(a.as_str().len(), 36);
    /// ```
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        let uuid = Builder::from_random_bytes(bytes).into_uuid();
        Self(uuid.hyphenated().to_string())
    }

    /// Borrow the textual form of the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self { Self(value) }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self { Self(value.to_owned()) }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
