//! Validated credential names accepted at the request boundary.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const NAME_MAX_LEN: usize = 128;

/// Error returned when credential name validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum NameError {
	/// The name was empty.
	#[error("Credential name cannot be empty.")]
	Empty,
	/// The name exceeded the allowed character count.
	#[error("Credential name exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
	/// The name must start and end with an ASCII word character.
	#[error("Credential name must start and end with a letter, digit, or underscore.")]
	InvalidBoundary,
	/// The name contains a character outside the safe set.
	#[error("Credential name contains an unsupported character: {ch:?}.")]
	InvalidCharacter {
		/// The offending character.
		ch: char,
	},
}

/// Caller-chosen identifier for one logical client-credentials flow.
///
/// Names are limited to characters that carry no meaning in URLs or shells: ASCII word
/// characters, plus `. @ ~ ! _ , : ^ -` anywhere except the first and last position.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialName(String);
impl CredentialName {
	/// Creates a new name after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, NameError> {
		let view = value.as_ref();

		validate(view)?;

		Ok(Self(view.to_owned()))
	}

	/// Returns the name as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Deref for CredentialName {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for CredentialName {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for CredentialName {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<CredentialName> for String {
	fn from(value: CredentialName) -> Self {
		value.0
	}
}
impl TryFrom<String> for CredentialName {
	type Error = NameError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate(&value)?;

		Ok(Self(value))
	}
}
impl FromStr for CredentialName {
	type Err = NameError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for CredentialName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CredentialName({})", self.0)
	}
}
impl Display for CredentialName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn is_word(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || ch == '_'
}

fn is_inner(ch: char) -> bool {
	is_word(ch) || matches!(ch, '.' | '@' | '~' | '!' | ',' | ':' | '^' | '-')
}

fn validate(view: &str) -> Result<(), NameError> {
	if view.is_empty() {
		return Err(NameError::Empty);
	}
	if view.chars().count() > NAME_MAX_LEN {
		return Err(NameError::TooLong { max: NAME_MAX_LEN });
	}
	if let Some(ch) = view.chars().find(|ch| !is_inner(*ch)) {
		return Err(NameError::InvalidCharacter { ch });
	}

	let first = view.chars().next();
	let last = view.chars().next_back();

	if !first.is_some_and(is_word) || !last.is_some_and(is_word) {
		return Err(NameError::InvalidBoundary);
	}

	Ok(())
}
