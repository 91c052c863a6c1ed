//! Row and query types for the mirror store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use fgamirror_api::TupleKey;

/// Rows per page returned by [`crate::MirrorStore::load_page`].
pub const PAGE_SIZE: usize = 200;

/// Substring searches no longer than this are ignored.
pub const MIN_SEARCH_LEN: usize = 3;

/// Identity of a remote source: API endpoint plus store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId {
    pub api_url: String,
    pub store_id: String,
}

impl SourceId {
    pub fn new(api_url: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            store_id: store_id.into(),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/stores/{}", self.api_url, self.store_id)
    }
}

/// A mirrored relationship tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    /// Canonical `"user relation object"` key.
    pub tuple_key: String,
    pub user_type: String,
    pub user_id: String,
    pub relation: String,
    pub object_type: String,
    pub object_id: String,
    /// Timestamp of the last WRITE seen for this key.
    pub timestamp: DateTime<Utc>,
}

impl Fact {
    /// Rebuild the remote tuple this fact mirrors.
    ///
    /// The canonical key is authoritative: the split columns cannot tell
    /// `"user"` from `"user:"`.
    pub fn to_tuple_key(&self) -> TupleKey {
        let mut parts = self.tuple_key.splitn(3, ' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(user), Some(relation), Some(object)) => TupleKey::new(user, relation, object),
            _ => TupleKey::new(
                join_type_pair(&self.user_type, &self.user_id),
                self.relation.clone(),
                join_type_pair(&self.object_type, &self.object_id),
            ),
        }
    }
}

fn join_type_pair(kind: &str, id: &str) -> String {
    if id.is_empty() {
        kind.to_string()
    } else {
        format!("{}:{}", kind, id)
    }
}

/// State of a deletion intent. No row means no intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentState {
    /// Operator asked for deletion; the remote call is pending.
    Marked,
    /// The remote store rejected the deletion. Terminal until pruned.
    Stale,
}

impl IntentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentState::Marked => "marked",
            IntentState::Stale => "stale",
        }
    }
}

impl fmt::Display for IntentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "marked" => Ok(IntentState::Marked),
            "stale" => Ok(IntentState::Stale),
            other => Err(format!("unknown intent state '{}'", other)),
        }
    }
}

/// Conjunction of optional predicates over facts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Substring of the canonical key. Ignored unless longer than
    /// [`MIN_SEARCH_LEN`] after trimming.
    pub search: Option<String>,
    pub user_type: Option<String>,
    pub relation: Option<String>,
    pub object_type: Option<String>,
}

impl Filter {
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn user_type(mut self, user_type: impl Into<String>) -> Self {
        self.user_type = Some(user_type.into());
        self
    }

    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    /// The search term that will actually be applied, if any.
    pub fn effective_search(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| s.chars().count() > MIN_SEARCH_LEN)
    }

}

/// A fact as shown on a page, with its position and deletion intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRow {
    /// 1-based position in the filtered, recency-ordered result set.
    pub row: usize,
    pub fact: Fact,
    pub intent: Option<IntentState>,
}

/// A window over the filtered fact set, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Row number of the first entry.
    pub lower_bound: usize,
    /// Row number of the last entry.
    pub upper_bound: usize,
    pub rows: Vec<PageRow>,
    /// Filter the page was loaded with.
    pub filter: Filter,
    /// Total facts matching the filter when the page was read.
    pub total: usize,
}

impl Page {
    /// Whether `row` (1-based) falls inside this page.
    pub fn contains(&self, row: usize) -> bool {
        row >= self.lower_bound && row <= self.upper_bound
    }

    /// Whether this page answers queries made with `filter`.
    pub fn is_for(&self, filter: &Filter) -> bool {
        &self.filter == filter
    }

    /// Entry at 1-based `row`, if loaded.
    pub fn get(&self, row: usize) -> Option<&PageRow> {
        if !self.contains(row) {
            return None;
        }
        self.rows.get(row - self.lower_bound)
    }
}

/// Columns with a small set of distinct values, used to populate filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactColumn {
    UserType,
    Relation,
    ObjectType,
}

impl FactColumn {
    pub(crate) fn column_name(&self) -> &'static str {
        match self {
            FactColumn::UserType => "user_type",
            FactColumn::Relation => "relation",
            FactColumn::ObjectType => "object_type",
        }
    }
}

/// Stored change-feed position for a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub source: SourceId,
    pub continuation_token: Option<String>,
    pub last_sync: DateTime<Utc>,
}

/// Counts of changes applied in one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub writes: usize,
    pub deletes: usize,
}
