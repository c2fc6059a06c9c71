use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$",
    )
    .unwrap()
});

// E.164: leading +, country code, 7..15 digits total.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9][0-9]{6,14}$").unwrap());

/// A normalized, validated login identifier. Exactly one of the two
/// contact methods; construction goes through `parse_email` / `parse_phone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Contact {
    Email(String),
    Phone(String),
}

impl Contact {
    /// Normalize (trim + lowercase) and validate an email address.
    pub fn parse_email(raw: &str) -> Result<Self, ContactError> {
        let email = raw.trim().to_lowercase();
        if EMAIL_RE.is_match(&email) {
            Ok(Contact::Email(email))
        } else {
            Err(ContactError::InvalidEmail(raw.trim().to_string()))
        }
    }

    /// Strip common separators and validate an E.164 phone number.
    pub fn parse_phone(raw: &str) -> Result<Self, ContactError> {
        let phone: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
            .collect();
        if PHONE_RE.is_match(&phone) {
            Ok(Contact::Phone(phone))
        } else {
            Err(ContactError::InvalidPhoneNumber(raw.trim().to_string()))
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Contact::Email(v) | Contact::Phone(v) => v,
        }
    }

    /// Stable discriminant used in store index keys.
    pub fn kind(&self) -> &'static str {
        match self {
            Contact::Email(_) => "email",
            Contact::Phone(_) => "phone",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactError {
    InvalidEmail(String),
    InvalidPhoneNumber(String),
}

impl fmt::Display for ContactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactError::InvalidEmail(raw) => write!(f, "invalid email address: {raw}"),
            ContactError::InvalidPhoneNumber(raw) => write!(f, "invalid phone number: {raw}"),
        }
    }
}

impl std::error::Error for ContactError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        let contact = Contact::parse_email("  Foo.Bar@Example.COM ").unwrap();
        assert_eq!(contact, Contact::Email("foo.bar@example.com".into()));
        assert_eq!(contact.kind(), "email");
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(Contact::parse_email("not-an-email").is_err());
        assert!(Contact::parse_email("a@b").is_err());
        assert!(Contact::parse_email("@example.com").is_err());
    }

    #[test]
    fn phone_separators_are_stripped() {
        let contact = Contact::parse_phone("+44 20 7946-0958").unwrap();
        assert_eq!(contact, Contact::Phone("+442079460958".into()));
    }

    #[test]
    fn rejects_phone_without_plus_or_too_short() {
        assert!(Contact::parse_phone("442079460958").is_err());
        assert!(Contact::parse_phone("+12345").is_err());
        assert!(Contact::parse_phone("+0123456789").is_err());
    }
}
