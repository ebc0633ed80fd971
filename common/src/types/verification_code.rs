use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::VERIFICATION_CODE_LENGTH;
use crate::errors::TrackerError;

/// One-time code the customer reads out to the field partner to confirm the pickup.
///
/// Always exactly [`VERIFICATION_CODE_LENGTH`] ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerificationCode(String);

impl VerificationCode {
    pub fn parse(raw: &str) -> Result<Self, TrackerError> {
        let trimmed = raw.trim();
        if trimmed.len() != VERIFICATION_CODE_LENGTH
            || !trimmed.chars().all(|c| c.is_ascii_digit())
        {
            return Err(TrackerError::InvalidVerificationCode(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generates a random code for a freshly booked pickup.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code: String = (0..VERIFICATION_CODE_LENGTH)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        Self(code)
    }

    /// Digits in display order, one per box in the tracking view.
    pub fn digits(&self) -> Vec<u8> {
        self.0.bytes().map(|b| b - b'0').collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VerificationCode {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VerificationCode {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VerificationCode> for String {
    fn from(code: VerificationCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_six_digits_only() {
        assert_eq!(VerificationCode::parse("048213").unwrap().as_str(), "048213");
        assert_eq!(VerificationCode::parse(" 123456\n").unwrap().as_str(), "123456");
        assert!(VerificationCode::parse("12345").is_err());
        assert!(VerificationCode::parse("1234567").is_err());
        assert!(VerificationCode::parse("12a456").is_err());
        assert!(VerificationCode::parse("").is_err());
    }

    #[test]
    fn generated_codes_are_valid() {
        for _ in 0..50 {
            let code = VerificationCode::generate();
            assert!(VerificationCode::parse(code.as_str()).is_ok());
            assert!(code.digits().iter().all(|d| *d <= 9));
        }
    }

    #[test]
    fn digits_preserve_leading_zeros() {
        let code = VerificationCode::parse("007310").unwrap();
        assert_eq!(code.digits(), vec![0, 0, 7, 3, 1, 0]);
    }

    #[test]
    fn deserializing_rejects_bad_codes() {
        assert!(serde_json::from_str::<VerificationCode>("\"99\"").is_err());
        let code: VerificationCode = serde_json::from_str("\"555123\"").unwrap();
        assert_eq!(code.to_string(), "555123");
    }
}
