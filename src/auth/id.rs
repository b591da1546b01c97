//! Strongly typed identifiers for connected companies and pending authorization flows.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;
const FLOW_ID_LEN: usize = 32;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (company, flow).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (company, flow).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (company, flow).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { CompanyId, "Xero tenant identifier that keys exactly one token record.", "Company" }
def_id! { FlowId, "Opaque handle for one pending authorization flow.", "Flow" }

impl FlowId {
	/// Generates an unguessable flow identifier.
	pub fn generate() -> Self {
		Self(random_alphanumeric(FLOW_ID_LEN))
	}
}

pub(crate) fn random_alphanumeric(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn company_ids_reject_padding_and_blank_values() {
		assert!(CompanyId::new(" 0d2c-tenant").is_err(), "Leading whitespace must be rejected.");
		assert!(CompanyId::new("0d2c-tenant ").is_err(), "Trailing whitespace must be rejected.");
		assert!(CompanyId::new("").is_err());

		let company =
			CompanyId::new("0d2c-tenant").expect("Company fixture should be considered valid.");

		assert_eq!(company.as_ref(), "0d2c-tenant");
		assert_eq!(format!("{company:?}"), "Company(0d2c-tenant)");
	}

	#[test]
	fn serde_enforces_validation() {
		let company: CompanyId = serde_json::from_str("\"co1\"")
			.expect("Company identifier should deserialize successfully.");

		assert_eq!(company.as_ref(), "co1");
		assert!(serde_json::from_str::<CompanyId>("\"with space\"").is_err());
		assert!(serde_json::from_str::<FlowId>("\"\"").is_err());
	}

	#[test]
	fn length_limit_applies() {
		CompanyId::new("a".repeat(IDENTIFIER_MAX_LEN)).expect("Exact length should succeed.");

		assert!(CompanyId::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn generated_flow_ids_are_distinct_and_valid() {
		let first = FlowId::generate();
		let second = FlowId::generate();

		assert_ne!(first, second);
		assert_eq!(first.len(), FLOW_ID_LEN);
		FlowId::new(first.as_ref()).expect("Generated flow identifiers must pass validation.");
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<CompanyId, u8> = HashMap::from_iter([(
			CompanyId::new("co-lookup").expect("Company used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("co-lookup"), Some(&7));
	}
}
