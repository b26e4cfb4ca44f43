//! AccountId - opaque identity for borrowers, lenders, collaborators and tokens
//!
//! The market never interprets account strings. Two accounts are the same
//! party iff their identifiers compare equal.

use serde::{Deserialize, Serialize};

/// Identity of any party the market deals with
///
/// Borrowers, lenders, aliases, credit lines, liquidity pools and token
/// assets are all addressed by an `AccountId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the unset identity
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_by_value() {
        let a = AccountId::from("borrower");
        let b = AccountId::new(String::from("borrower"));
        assert_eq!(a, b);
        assert_ne!(a, AccountId::from("lender"));
    }

    #[test]
    fn test_default_is_empty() {
        assert!(AccountId::default().is_empty());
        assert!(!AccountId::from("pool").is_empty());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&AccountId::from("pool-1")).unwrap();
        assert_eq!(json, "\"pool-1\"");
    }
}
