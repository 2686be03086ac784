//! Infrastructure resource identifier
//!
//! Resource identifiers are opaque strings handed out by the infrastructure
//! control plane (instance IDs, service names, node names). They are trimmed
//! on construction and must not be empty or contain whitespace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Maximum accepted length of a resource identifier
const MAX_RESOURCE_ID_LEN: usize = 256;

/// A validated infrastructure resource identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a resource ID, validating the format
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_string();

        if value.is_empty() {
            return Err(DomainError::InvalidResourceId(
                "resource id must not be empty".to_string(),
            ));
        }
        if value.len() > MAX_RESOURCE_ID_LEN {
            return Err(DomainError::InvalidResourceId(format!(
                "resource id exceeds {MAX_RESOURCE_ID_LEN} characters"
            )));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidResourceId(format!(
                "resource id contains whitespace: {value}"
            )));
        }

        Ok(Self(value))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ResourceId {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}
