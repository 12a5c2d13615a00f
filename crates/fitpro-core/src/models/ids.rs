// ABOUTME: Opaque identifier newtypes for sessions and users
// ABOUTME: Includes normalization of legacy untyped user references into typed ids
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::limits::OBJECT_REF_LEN;
use crate::errors::ReferenceParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a raw session id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Typed user reference
///
/// Users are identified by 24-digit hex object references. Identities coming
/// from the auth collaborator are accepted as-is; legacy keys found in stored
/// session documents go through [`UserId::parse_object_ref`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a user id that is already known to be typed
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize a legacy untyped reference into a typed user id
    ///
    /// Accepts surrounding whitespace, an `ObjectId("...")` wrapper, and
    /// uppercase hex. The result is always 24 lowercase hex digits.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceParseError` if the value is not a 24-digit hex reference
    pub fn parse_object_ref(raw: &str) -> Result<Self, ReferenceParseError> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix("ObjectId(")
            .and_then(|rest| rest.strip_suffix(')'))
            .map_or(trimmed, |quoted| {
                quoted.trim().trim_matches(|c| c == '"' || c == '\'')
            });

        if inner.len() != OBJECT_REF_LEN || !inner.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ReferenceParseError {
                raw: raw.to_owned(),
            });
        }

        Ok(Self(inner.to_ascii_lowercase()))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
