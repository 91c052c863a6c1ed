//! SQLite database for the tuple mirror.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use fgamirror_api::{TupleChange, TupleOperation};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info};

use crate::{
    BatchSummary, Cursor, Fact, FactColumn, Filter, IntentState, PAGE_SIZE, Page, PageRow,
    SourceId, StoreError,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS facts (
        tuple_key TEXT NOT NULL PRIMARY KEY,
        user_type TEXT NOT NULL,
        user_id TEXT NOT NULL,
        relation TEXT NOT NULL,
        object_type TEXT NOT NULL,
        object_id TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_facts_filter ON facts(user_type, relation, object_type);
    CREATE INDEX IF NOT EXISTS idx_facts_timestamp ON facts(timestamp DESC, tuple_key);

    CREATE TABLE IF NOT EXISTS intents (
        tuple_key TEXT NOT NULL PRIMARY KEY,
        state TEXT NOT NULL CHECK (state IN ('marked', 'stale'))
    );
    CREATE INDEX IF NOT EXISTS idx_intents_state ON intents(state);

    CREATE TABLE IF NOT EXISTS cursors (
        api_url TEXT NOT NULL,
        store_id TEXT NOT NULL,
        continuation_token TEXT,
        last_sync TEXT NOT NULL,
        PRIMARY KEY (api_url, store_id)
    );
";

const FACT_COLUMNS: &str =
    "tuple_key, user_type, user_id, relation, object_type, object_id, timestamp";

/// SQLite-backed mirror store.
pub struct MirrorStore {
    conn: Mutex<Connection>,
}

impl MirrorStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets the CLI read while a daemon holds the writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let store = Self::init(conn)?;
        info!(path = %path.display(), "mirror database initialized");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Every statement runs inside its own transaction, so a panic while the
    /// lock was held leaves nothing half-applied; keep using the connection.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // =========================================================================
    // Facts
    // =========================================================================

    /// Apply one change from the feed in its own transaction.
    pub fn apply_change(&self, change: &TupleChange) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        apply_change_in(&tx, change)?;
        tx.commit()?;
        Ok(())
    }

    /// Apply a fetched batch in feed order and advance the cursor, atomically.
    ///
    /// On error nothing is committed: neither the changes nor the cursor.
    /// A `None` token keeps the previously stored one.
    pub fn apply_batch(
        &self,
        source: &SourceId,
        changes: &[TupleChange],
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut summary = BatchSummary::default();
        for change in changes {
            apply_change_in(&tx, change)?;
            match change.operation {
                TupleOperation::Write => summary.writes += 1,
                TupleOperation::Delete => summary.deletes += 1,
            }
        }
        upsert_cursor_in(&tx, source, token, now)?;

        tx.commit()?;

        debug!(
            source = %source,
            writes = summary.writes,
            deletes = summary.deletes,
            token = ?token,
            "applied change batch"
        );
        Ok(summary)
    }

    /// Get a fact by canonical key.
    pub fn get_fact(&self, key: &str) -> Result<Option<Fact>, StoreError> {
        let conn = self.conn();
        let fact = conn
            .query_row(
                &format!("SELECT {} FROM facts WHERE tuple_key = ?1", FACT_COLUMNS),
                params![key],
                fact_from_row,
            )
            .optional()?;
        Ok(fact)
    }

    /// Count facts matching `filter`.
    pub fn count_facts(&self, filter: &Filter) -> Result<usize, StoreError> {
        let conn = self.conn();
        Ok(count_in(&conn, filter)?)
    }

    /// Load the page of up to [`PAGE_SIZE`] facts after `offset` rows.
    ///
    /// Rows are numbered from 1 in descending timestamp order, so offset 0
    /// yields rows `1..=200`. Returns `Ok(None)` when no row lies past
    /// `offset`. Rows and total are read from the same snapshot.
    pub fn load_page(&self, offset: usize, filter: &Filter) -> Result<Option<Page>, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let (where_sql, mut values) = filter_clause(filter);
        let sql = format!(
            "SELECT f.tuple_key, f.user_type, f.user_id, f.relation, f.object_type, f.object_id,
                    f.timestamp, f.row_num, i.state
             FROM (SELECT *, row_number() OVER (ORDER BY timestamp DESC, tuple_key) AS row_num
                   FROM facts{}) f
             LEFT JOIN intents i ON i.tuple_key = f.tuple_key
             WHERE f.row_num > ? AND f.row_num <= ?
             ORDER BY f.row_num",
            where_sql
        );
        values.push(Value::Integer(to_i64(offset)));
        values.push(Value::Integer(to_i64(offset.saturating_add(PAGE_SIZE))));

        let rows = {
            let mut stmt = tx.prepare(&sql)?;
            stmt.query_map(params_from_iter(values.iter()), page_row_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };

        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Ok(None);
        };
        let (lower_bound, upper_bound) = (first.row, last.row);
        let total = count_in(&tx, filter)?;

        Ok(Some(Page {
            lower_bound,
            upper_bound,
            rows,
            filter: filter.clone(),
            total,
        }))
    }

    /// Sorted distinct values of `column` across all facts.
    pub fn distinct_values(&self, column: FactColumn) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {0} FROM facts ORDER BY {0}",
            column.column_name()
        ))?;
        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(values)
    }

    // =========================================================================
    // Deletion intents
    // =========================================================================

    /// Mark a fact for deletion.
    ///
    /// Returns `true` if a new intent was recorded. An existing intent (marked
    /// or stale) is left alone, and keys with no fact are ignored.
    pub fn mark_for_deletion(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO intents (tuple_key, state)
             SELECT tuple_key, 'marked' FROM facts WHERE tuple_key = ?1
             ON CONFLICT(tuple_key) DO NOTHING",
            params![key],
        )?;
        Ok(inserted > 0)
    }

    /// Current intent for a key, if any.
    pub fn intent_state(&self, key: &str) -> Result<Option<IntentState>, StoreError> {
        let conn = self.conn();
        let state = conn
            .query_row(
                "SELECT state FROM intents WHERE tuple_key = ?1",
                params![key],
                |row| intent_from_column(row, 0),
            )
            .optional()?
            .flatten();
        Ok(state)
    }

    /// Up to `limit` facts currently marked for deletion, oldest first.
    pub fn list_marked(&self, limit: usize) -> Result<Vec<Fact>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT f.tuple_key, f.user_type, f.user_id, f.relation, f.object_type, f.object_id,
                    f.timestamp
             FROM facts f
             JOIN intents i ON i.tuple_key = f.tuple_key
             WHERE i.state = 'marked'
             ORDER BY f.timestamp, f.tuple_key
             LIMIT ?1",
        )?;
        let facts = stmt
            .query_map(params![to_i64(limit)], fact_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(facts)
    }

    /// Flip a marked intent to stale.
    ///
    /// Only a `marked` row changes; if the change mirror already cleared the
    /// intent, nothing is recreated. Returns `true` if a row changed.
    pub fn demote_to_stale(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE intents SET state = 'stale' WHERE tuple_key = ?1 AND state = 'marked'",
            params![key],
        )?;
        Ok(changed > 0)
    }

    /// Delete every stale intent together with its fact. Returns the number
    /// of intents removed.
    pub fn prune(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM facts
             WHERE tuple_key IN (SELECT tuple_key FROM intents WHERE state = 'stale')",
            [],
        )?;
        let removed = tx.execute("DELETE FROM intents WHERE state = 'stale'", [])?;

        tx.commit()?;

        if removed > 0 {
            info!(removed, "pruned stale facts");
        }
        Ok(removed)
    }

    // =========================================================================
    // Cursors
    // =========================================================================

    /// Get the stored cursor for a source.
    pub fn get_cursor(&self, source: &SourceId) -> Result<Option<Cursor>, StoreError> {
        let conn = self.conn();
        let cursor = conn
            .query_row(
                "SELECT continuation_token, last_sync FROM cursors
                 WHERE api_url = ?1 AND store_id = ?2",
                params![source.api_url, source.store_id],
                |row| {
                    Ok(Cursor {
                        source: source.clone(),
                        continuation_token: row.get(0)?,
                        last_sync: timestamp_from_column(row, 1)?,
                    })
                },
            )
            .optional()?;
        Ok(cursor)
    }

    /// Store a cursor outside of a batch. A `None` token keeps the previous one.
    pub fn upsert_cursor(
        &self,
        source: &SourceId,
        token: Option<&str>,
        last_sync: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        upsert_cursor_in(&conn, source, token, last_sync)?;
        Ok(())
    }
}

/// Apply one feed change. Any intent on the key is cleared first: the feed
/// is authoritative over local intent.
fn apply_change_in(conn: &Connection, change: &TupleChange) -> rusqlite::Result<()> {
    let key = change.tuple_key.canonical();

    conn.prepare_cached("DELETE FROM intents WHERE tuple_key = ?1")?
        .execute(params![key])?;

    match change.operation {
        TupleOperation::Write => {
            let (user_type, user_id) = change.tuple_key.user_parts();
            let (object_type, object_id) = change.tuple_key.object_parts();
            conn.prepare_cached(
                "INSERT INTO facts
                 (tuple_key, user_type, user_id, relation, object_type, object_id, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(tuple_key) DO UPDATE SET timestamp = excluded.timestamp",
            )?
            .execute(params![
                key,
                user_type,
                user_id,
                change.tuple_key.relation,
                object_type,
                object_id,
                format_timestamp(&change.timestamp),
            ])?;
        }
        TupleOperation::Delete => {
            conn.prepare_cached("DELETE FROM facts WHERE tuple_key = ?1")?
                .execute(params![key])?;
        }
    }
    Ok(())
}

fn upsert_cursor_in(
    conn: &Connection,
    source: &SourceId,
    token: Option<&str>,
    last_sync: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cursors (api_url, store_id, continuation_token, last_sync)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(api_url, store_id) DO UPDATE SET
             continuation_token = COALESCE(excluded.continuation_token, cursors.continuation_token),
             last_sync = excluded.last_sync",
        params![
            source.api_url,
            source.store_id,
            token,
            format_timestamp(&last_sync)
        ],
    )?;
    Ok(())
}

fn count_in(conn: &Connection, filter: &Filter) -> rusqlite::Result<usize> {
    let (where_sql, values) = filter_clause(filter);
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM facts{}", where_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Build the `WHERE` clause for a filter. Predicates are ANDed.
fn filter_clause(filter: &Filter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(search) = filter.effective_search() {
        clauses.push("instr(tuple_key, ?) > 0");
        values.push(Value::Text(search.to_string()));
    }
    if let Some(ref user_type) = filter.user_type {
        clauses.push("user_type = ?");
        values.push(Value::Text(user_type.clone()));
    }
    if let Some(ref relation) = filter.relation {
        clauses.push("relation = ?");
        values.push(Value::Text(relation.clone()));
    }
    if let Some(ref object_type) = filter.object_type {
        clauses.push("object_type = ?");
        values.push(Value::Text(object_type.clone()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<Fact> {
    Ok(Fact {
        tuple_key: row.get(0)?,
        user_type: row.get(1)?,
        user_id: row.get(2)?,
        relation: row.get(3)?,
        object_type: row.get(4)?,
        object_id: row.get(5)?,
        timestamp: timestamp_from_column(row, 6)?,
    })
}

fn page_row_from_row(row: &Row<'_>) -> rusqlite::Result<PageRow> {
    let row_num: i64 = row.get(7)?;
    Ok(PageRow {
        row: row_num as usize,
        fact: fact_from_row(row)?,
        intent: intent_from_column(row, 8)?,
    })
}

fn intent_from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<IntentState>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse::<IntentState>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
    })
    .transpose()
}

fn timestamp_from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Fixed-width UTC so that text order is time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fgamirror_api::TupleKey;
    use pretty_assertions::assert_eq;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn key(user: &str, relation: &str, object: &str) -> TupleKey {
        TupleKey::new(user, relation, object)
    }

    fn write(store: &MirrorStore, k: &TupleKey, secs: i64) {
        store
            .apply_change(&TupleChange::write(k.clone(), ts(secs)))
            .unwrap();
    }

    fn source() -> SourceId {
        SourceId::new("http://localhost:8087", "01STORE")
    }

    /// Store with `n` facts `user:u{i} member group:g{i % 3}`, newest last.
    fn seeded(n: usize) -> MirrorStore {
        let store = MirrorStore::open_in_memory().unwrap();
        let changes: Vec<_> = (0..n)
            .map(|i| {
                TupleChange::write(
                    key(&format!("user:u{i:04}"), "member", &format!("group:g{}", i % 3)),
                    ts(i as i64),
                )
            })
            .collect();
        store
            .apply_batch(&source(), &changes, Some("seed"), ts(0))
            .unwrap();
        store
    }

    #[test]
    fn test_count_empty() {
        let store = MirrorStore::open_in_memory().unwrap();
        assert_eq!(store.count_facts(&Filter::default()).unwrap(), 0);
        assert_eq!(store.load_page(0, &Filter::default()).unwrap(), None);
    }

    #[test]
    fn test_write_twice_refreshes_timestamp() {
        let store = MirrorStore::open_in_memory().unwrap();
        let k = key("user:alice", "member", "group:eng");

        write(&store, &k, 1);
        write(&store, &k, 5);

        assert_eq!(store.count_facts(&Filter::default()).unwrap(), 1);
        let fact = store.get_fact(&k.canonical()).unwrap().unwrap();
        assert_eq!(fact.timestamp, ts(5));
        assert_eq!(fact.user_type, "user");
        assert_eq!(fact.user_id, "alice");
        assert_eq!(fact.object_type, "group");
        assert_eq!(fact.object_id, "eng");
    }

    #[test]
    fn test_delete_of_absent_fact_is_noop() {
        let store = MirrorStore::open_in_memory().unwrap();
        let k = key("user:alice", "member", "group:eng");

        store
            .apply_change(&TupleChange::delete(k.clone(), ts(1)))
            .unwrap();

        assert_eq!(store.get_fact(&k.canonical()).unwrap(), None);
    }

    #[test]
    fn test_any_change_clears_intent() {
        let store = MirrorStore::open_in_memory().unwrap();
        let k = key("user:alice", "member", "group:eng");
        write(&store, &k, 1);

        assert!(store.mark_for_deletion(&k.canonical()).unwrap());
        write(&store, &k, 2);
        assert_eq!(store.intent_state(&k.canonical()).unwrap(), None);
        assert!(store.get_fact(&k.canonical()).unwrap().is_some());

        assert!(store.mark_for_deletion(&k.canonical()).unwrap());
        assert!(store.demote_to_stale(&k.canonical()).unwrap());
        store
            .apply_change(&TupleChange::delete(k.clone(), ts(3)))
            .unwrap();
        assert_eq!(store.intent_state(&k.canonical()).unwrap(), None);
        assert_eq!(store.get_fact(&k.canonical()).unwrap(), None);
    }

    #[test]
    fn test_mark_is_idempotent() {
        let store = MirrorStore::open_in_memory().unwrap();
        let k = key("user:alice", "member", "group:eng");
        write(&store, &k, 1);

        assert!(store.mark_for_deletion(&k.canonical()).unwrap());
        assert!(!store.mark_for_deletion(&k.canonical()).unwrap());
        assert_eq!(
            store.intent_state(&k.canonical()).unwrap(),
            Some(IntentState::Marked)
        );

        // Marking never resurrects a stale intent back to marked
        store.demote_to_stale(&k.canonical()).unwrap();
        assert!(!store.mark_for_deletion(&k.canonical()).unwrap());
        assert_eq!(
            store.intent_state(&k.canonical()).unwrap(),
            Some(IntentState::Stale)
        );
    }

    #[test]
    fn test_mark_unknown_key_is_ignored() {
        let store = MirrorStore::open_in_memory().unwrap();
        assert!(!store.mark_for_deletion("user:nobody member group:eng").unwrap());
        assert_eq!(
            store.intent_state("user:nobody member group:eng").unwrap(),
            None
        );
    }

    #[test]
    fn test_stale_then_prune() {
        let store = MirrorStore::open_in_memory().unwrap();
        let k = key("user:alice", "member", "group:eng");
        let other = key("user:bob", "member", "group:eng");
        write(&store, &k, 1);
        write(&store, &other, 2);

        store.mark_for_deletion(&k.canonical()).unwrap();
        store.mark_for_deletion(&other.canonical()).unwrap();
        assert!(store.demote_to_stale(&k.canonical()).unwrap());
        assert!(!store.demote_to_stale(&k.canonical()).unwrap());

        assert_eq!(
            store.intent_state(&k.canonical()).unwrap(),
            Some(IntentState::Stale)
        );
        assert!(store.get_fact(&k.canonical()).unwrap().is_some());

        assert_eq!(store.prune().unwrap(), 1);
        assert_eq!(store.get_fact(&k.canonical()).unwrap(), None);
        assert_eq!(store.intent_state(&k.canonical()).unwrap(), None);

        // Marked intents survive a prune
        assert!(store.get_fact(&other.canonical()).unwrap().is_some());
        assert_eq!(
            store.intent_state(&other.canonical()).unwrap(),
            Some(IntentState::Marked)
        );
        assert_eq!(store.prune().unwrap(), 0);
    }

    #[test]
    fn test_demote_without_intent_creates_nothing() {
        let store = MirrorStore::open_in_memory().unwrap();
        let k = key("user:alice", "member", "group:eng");
        write(&store, &k, 1);

        assert!(!store.demote_to_stale(&k.canonical()).unwrap());
        assert_eq!(store.intent_state(&k.canonical()).unwrap(), None);
    }

    #[test]
    fn test_list_marked_respects_limit_and_state() {
        let store = seeded(30);
        for i in 0..15 {
            let k = format!("user:u{i:04} member group:g{}", i % 3);
            assert!(store.mark_for_deletion(&k).unwrap());
        }
        store
            .demote_to_stale(&format!("user:u{:04} member group:g{}", 0, 0))
            .unwrap();

        let marked = store.list_marked(10).unwrap();
        assert_eq!(marked.len(), 10);
        assert!(marked.iter().all(|f| f.tuple_key != "user:u0000 member group:g0"));
        assert_eq!(marked[0].tuple_key, "user:u0001 member group:g1");

        assert_eq!(store.list_marked(100).unwrap().len(), 14);
    }

    #[test]
    fn test_pagination_windows() {
        let store = seeded(250);

        let first = store.load_page(0, &Filter::default()).unwrap().unwrap();
        assert_eq!((first.lower_bound, first.upper_bound), (1, 200));
        assert_eq!(first.rows.len(), 200);
        assert_eq!(first.total, 250);
        // Newest first
        assert_eq!(first.rows[0].fact.tuple_key, "user:u0249 member group:g0");
        assert!(first.contains(200));
        assert!(!first.contains(201));
        assert_eq!(first.get(2).unwrap().row, 2);

        let last = store.load_page(200, &Filter::default()).unwrap().unwrap();
        assert_eq!((last.lower_bound, last.upper_bound), (201, 250));
        assert_eq!(last.rows.len(), 50);
        assert_eq!(last.total, 250);
        assert_eq!(last.rows[49].fact.tuple_key, "user:u0000 member group:g0");

        assert_eq!(store.load_page(250, &Filter::default()).unwrap(), None);
    }

    #[test]
    fn test_page_rows_carry_intent() {
        let store = seeded(3);
        let marked = "user:u0001 member group:g1";
        store.mark_for_deletion(marked).unwrap();

        let page = store.load_page(0, &Filter::default()).unwrap().unwrap();
        let row = page
            .rows
            .iter()
            .find(|r| r.fact.tuple_key == marked)
            .unwrap();
        assert_eq!(row.intent, Some(IntentState::Marked));
        assert_eq!(page.rows.iter().filter(|r| r.intent.is_none()).count(), 2);
    }

    #[test]
    fn test_short_search_matches_everything() {
        let store = seeded(10);
        let filter = Filter::default().search("u00");

        assert_eq!(store.count_facts(&filter).unwrap(), 10);
        let page = store.load_page(0, &filter).unwrap().unwrap();
        assert_eq!(page.total, 10);
    }

    #[test]
    fn test_long_search_restricts_by_substring() {
        let store = seeded(30);
        let filter = Filter::default().search("u002");

        // u0020..u0029
        assert_eq!(store.count_facts(&filter).unwrap(), 10);
        let page = store.load_page(0, &filter).unwrap().unwrap();
        assert!(page.rows.iter().all(|r| r.fact.tuple_key.contains("u002")));
        assert_eq!((page.lower_bound, page.upper_bound), (1, 10));
        assert!(page.is_for(&filter));
        assert!(!page.is_for(&Filter::default()));
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let store = seeded(5);
        assert_eq!(
            store.count_facts(&Filter::default().search("u%0_")).unwrap(),
            0
        );
    }

    #[test]
    fn test_exact_filters_are_anded() {
        let store = seeded(30);
        write(&store, &key("team:core", "admin", "group:g1"), 100);

        let by_group = Filter::default().object_type("group");
        assert_eq!(store.count_facts(&by_group).unwrap(), 31);

        let users_only = by_group.clone().user_type("user");
        assert_eq!(store.count_facts(&users_only).unwrap(), 30);

        let admins = users_only.clone().relation("admin");
        assert_eq!(store.count_facts(&admins).unwrap(), 0);
        assert_eq!(store.load_page(0, &admins).unwrap(), None);

        let g1 = Filter::default().user_type("user").search("group:g1");
        assert_eq!(store.count_facts(&g1).unwrap(), 10);
    }

    #[test]
    fn test_distinct_values_sorted() {
        let store = MirrorStore::open_in_memory().unwrap();
        write(&store, &key("user:a", "viewer", "doc:1"), 1);
        write(&store, &key("team:b", "editor", "folder:2"), 2);
        write(&store, &key("user:c", "viewer", "doc:3"), 3);

        assert_eq!(
            store.distinct_values(FactColumn::UserType).unwrap(),
            vec!["team", "user"]
        );
        assert_eq!(
            store.distinct_values(FactColumn::Relation).unwrap(),
            vec!["editor", "viewer"]
        );
        assert_eq!(
            store.distinct_values(FactColumn::ObjectType).unwrap(),
            vec!["doc", "folder"]
        );
    }

    #[test]
    fn test_cursor_roundtrip_and_retention() {
        let store = MirrorStore::open_in_memory().unwrap();
        assert_eq!(store.get_cursor(&source()).unwrap(), None);

        store.upsert_cursor(&source(), Some("t1"), ts(1)).unwrap();
        store.upsert_cursor(&source(), None, ts(2)).unwrap();

        let cursor = store.get_cursor(&source()).unwrap().unwrap();
        assert_eq!(cursor.continuation_token.as_deref(), Some("t1"));
        assert_eq!(cursor.last_sync, ts(2));

        // Same store id on another endpoint is a different source
        let other = SourceId::new("http://other:8080", "01STORE");
        assert_eq!(store.get_cursor(&other).unwrap(), None);
    }

    #[test]
    fn test_failed_batch_leaves_no_trace() {
        let store = MirrorStore::open_in_memory().unwrap();
        store.upsert_cursor(&source(), Some("before"), ts(0)).unwrap();
        store
            .conn()
            .execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON facts
                 WHEN NEW.relation = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'poisoned'); END;",
            )
            .unwrap();

        let changes = vec![
            TupleChange::write(key("user:alice", "member", "group:eng"), ts(1)),
            TupleChange::write(key("user:bob", "poison", "group:eng"), ts(2)),
        ];
        let result = store.apply_batch(&source(), &changes, Some("after"), ts(3));

        assert!(matches!(result, Err(StoreError::Sqlite(_))));
        assert_eq!(store.count_facts(&Filter::default()).unwrap(), 0);
        let cursor = store.get_cursor(&source()).unwrap().unwrap();
        assert_eq!(cursor.continuation_token.as_deref(), Some("before"));
        assert_eq!(cursor.last_sync, ts(0));
    }

    #[test]
    fn test_batch_counts_and_order() {
        let store = MirrorStore::open_in_memory().unwrap();
        let k = key("user:alice", "member", "group:eng");
        let changes = vec![
            TupleChange::write(k.clone(), ts(1)),
            TupleChange::delete(k.clone(), ts(2)),
            TupleChange::write(k.clone(), ts(3)),
        ];

        let summary = store
            .apply_batch(&source(), &changes, Some("t1"), ts(4))
            .unwrap();

        assert_eq!(summary, BatchSummary { writes: 2, deletes: 1 });
        assert_eq!(store.get_fact(&k.canonical()).unwrap().unwrap().timestamp, ts(3));
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fga.db");

        {
            let store = MirrorStore::open(&path).unwrap();
            let changes = vec![TupleChange::write(
                key("user:alice", "member", "group:eng"),
                ts(1),
            )];
            store
                .apply_batch(&source(), &changes, Some("t1"), ts(2))
                .unwrap();
            store
                .mark_for_deletion("user:alice member group:eng")
                .unwrap();
        }

        let store = MirrorStore::open(&path).unwrap();
        assert_eq!(store.count_facts(&Filter::default()).unwrap(), 1);
        assert_eq!(
            store.intent_state("user:alice member group:eng").unwrap(),
            Some(IntentState::Marked)
        );
        assert_eq!(
            store
                .get_cursor(&source())
                .unwrap()
                .unwrap()
                .continuation_token
                .as_deref(),
            Some("t1")
        );
    }
}
