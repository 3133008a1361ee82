// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redacting wrapper for access tokens, refresh tokens, and passwords.
//!
//! A [`Secret`] prints as `[REDACTED]` through `Debug`, `Display`, and
//! `Serialize`, and is zeroed when dropped. The only way to read the value is
//! [`Secret::expose`], which keeps every use site greppable.
//!
//! ```
//! use kubeportal_common_secret::SecretString;
//!
//! let token = SecretString::new("eyJhbGciOi".to_string());
//! assert_eq!(format!("{token}"), "[REDACTED]");
//! assert_eq!(token.expose(), "eyJhbGciOi");
//! ```

use std::fmt;

use zeroize::Zeroize;

/// Placeholder emitted wherever a secret would otherwise be printed.
pub const REDACTED: &str = "[REDACTED]";

#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Secret<T>
where
	T: Zeroize,
{
	inner: T,
}

pub type SecretString = Secret<String>;

impl<T> Secret<T>
where
	T: Zeroize,
{
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	pub fn expose(&self) -> &T {
		&self.inner
	}
}

impl SecretString {
	/// An empty token, used for the anonymous session.
	pub fn empty() -> Self {
		Self::new(String::new())
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}
}

impl Default for SecretString {
	fn default() -> Self {
		Self::empty()
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value.to_string())
	}
}

impl<T> Clone for Secret<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self::new(self.inner.clone())
	}
}

impl<T> fmt::Debug for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Secret").field(&REDACTED).finish()
	}
}

impl<T> fmt::Display for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Secret<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl<T> Eq for Secret<T> where T: Zeroize + Eq {}

#[cfg(feature = "serde")]
mod serde_impl {
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use zeroize::Zeroize;

	use super::{Secret, REDACTED};

	// Serializing never leaks; persisted snapshots expose values explicitly.
	impl<T> Serialize for Secret<T>
	where
		T: Zeroize,
	{
		fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(REDACTED)
		}
	}

	impl<'de, T> Deserialize<'de> for Secret<T>
	where
		T: Zeroize + Deserialize<'de>,
	{
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			T::deserialize(deserializer).map(Secret::new)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn debug_and_display_are_redacted() {
		let token = SecretString::from("T1");
		assert_eq!(format!("{token:?}"), "Secret(\"[REDACTED]\")");
		assert_eq!(token.to_string(), REDACTED);
	}

	#[test]
	fn empty_token_reports_empty() {
		assert!(SecretString::empty().is_empty());
		assert!(SecretString::default().is_empty());
		assert!(!SecretString::from("x").is_empty());
	}

	#[test]
	fn serialize_redacts_but_deserialize_reads_plain() {
		let token = SecretString::from("R1");
		let json = serde_json::to_string(&token).unwrap();
		assert_eq!(json, "\"[REDACTED]\"");

		let parsed: SecretString = serde_json::from_str("\"R1\"").unwrap();
		assert_eq!(parsed.expose(), "R1");
	}

	#[test]
	fn clones_compare_equal() {
		let token = SecretString::from("abc");
		assert_eq!(token.clone(), token);
	}

	proptest! {
		#[test]
		fn display_never_contains_value(value in "[a-zA-Z0-9]{12,40}") {
			let token = SecretString::new(value.clone());
			let display = format!("{token}");
			let debug = format!("{token:?}");
			prop_assert!(!display.contains(&value));
			prop_assert!(!debug.contains(&value));
		}
	}
}
