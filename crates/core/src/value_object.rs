//! Value objects: equality by value, not identity.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Indian mobile number, normalized to its 10 national digits.
///
/// Accepts common input forms: `+91 98765 43210`, `09876543210`,
/// `98765-43210`. The first national digit must be 6-9.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MobileNumber(String);

impl ValueObject for MobileNumber {}

impl MobileNumber {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let digits: String = input
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();

        let national = digits
            .strip_prefix("+91")
            .or_else(|| (digits.len() == 12).then(|| digits.strip_prefix("91")).flatten())
            .or_else(|| (digits.len() == 11).then(|| digits.strip_prefix('0')).flatten())
            .unwrap_or(digits.as_str());

        if national.len() != 10 || !national.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "mobile number must have 10 digits, got {input:?}"
            )));
        }
        if !matches!(national.as_bytes()[0], b'6'..=b'9') {
            return Err(DomainError::validation(format!(
                "mobile number must start with 6-9, got {input:?}"
            )));
        }

        Ok(Self(national.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for MobileNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MobileNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MobileNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MobileNumber> for String {
    fn from(value: MobileNumber) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_common_forms() {
        for input in ["9876543210", "+91 98765 43210", "09876543210", "98765-43210", "919876543210"] {
            assert_eq!(MobileNumber::parse(input).unwrap().as_str(), "9876543210", "{input}");
        }
    }

    #[test]
    fn rejects_short_and_landline_numbers() {
        assert!(MobileNumber::parse("98765").is_err());
        assert!(MobileNumber::parse("0401234567").is_err());
        assert!(MobileNumber::parse("98765abcde").is_err());
        assert!(MobileNumber::parse("").unwrap_err().is_validation());
    }

    proptest! {
        #[test]
        fn any_valid_national_number_parses_to_itself(
            first in 6u8..=9,
            rest in proptest::collection::vec(0u8..=9, 9)
        ) {
            let number: String = std::iter::once(first)
                .chain(rest)
                .map(|d| char::from(b'0' + d))
                .collect();
            let parsed = MobileNumber::parse(&number).unwrap();
            prop_assert_eq!(parsed.as_str(), number.as_str());
        }
    }
}
