//! Wire types for the change feed and write API.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ApiError;

/// A relationship tuple: `user` has `relation` on `object`.
///
/// Users and objects are `type:id` pairs (`user:anne`, `document:roadmap`);
/// usersets keep their `#relation` suffix in the id (`group:eng#member`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleKey {
    pub user: String,
    pub relation: String,
    pub object: String,
}

impl TupleKey {
    pub fn new(
        user: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }

    /// Parse operator input of the form `user relation object`.
    ///
    /// Anything other than exactly three space-separated tokens is rejected.
    pub fn parse(input: &str) -> Result<Self, ApiError> {
        let parts: Vec<&str> = input.trim().split(' ').collect();
        match parts.as_slice() {
            [user, relation, object]
                if !user.is_empty() && !relation.is_empty() && !object.is_empty() =>
            {
                Ok(Self::new(*user, *relation, *object))
            }
            _ => Err(ApiError::InvalidTuple(input.to_string())),
        }
    }

    /// The canonical single-string identity: `"user relation object"`.
    pub fn canonical(&self) -> String {
        format!("{} {} {}", self.user, self.relation, self.object)
    }

    /// `(type, id)` of the user.
    pub fn user_parts(&self) -> (&str, &str) {
        split_type_pair(&self.user)
    }

    /// `(type, id)` of the object.
    pub fn object_parts(&self) -> (&str, &str) {
        split_type_pair(&self.object)
    }
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.user, self.relation, self.object)
    }
}

/// Split `type:id` on the first colon. A value with no colon is all type.
pub fn split_type_pair(pair: &str) -> (&str, &str) {
    pair.split_once(':').unwrap_or((pair, ""))
}

/// Kind of mutation recorded in the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TupleOperation {
    #[serde(rename = "TUPLE_OPERATION_WRITE")]
    Write,
    #[serde(rename = "TUPLE_OPERATION_DELETE")]
    Delete,
}

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleChange {
    pub tuple_key: TupleKey,
    pub operation: TupleOperation,
    pub timestamp: DateTime<Utc>,
}

impl TupleChange {
    pub fn write(key: TupleKey, timestamp: DateTime<Utc>) -> Self {
        Self {
            tuple_key: key,
            operation: TupleOperation::Write,
            timestamp,
        }
    }

    pub fn delete(key: TupleKey, timestamp: DateTime<Utc>) -> Self {
        Self {
            tuple_key: key,
            operation: TupleOperation::Delete,
            timestamp,
        }
    }
}

/// A page of the change feed plus the token to resume after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesPage {
    #[serde(default)]
    pub changes: Vec<TupleChange>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

impl ChangesPage {
    /// The continuation token, treating an empty string as absent.
    pub fn next_cursor(&self) -> Option<&str> {
        self.continuation_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}
