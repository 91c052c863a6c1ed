//! Scripted stand-in for the remote tuple service.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fgamirror_api::{ApiError, ChangesPage, TupleChange, TupleKey, TupleService};

/// How the fake answers a delete for a given key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Accept,
    /// 400, tuple does not exist.
    Reject,
    /// 503.
    Unavailable,
}

#[derive(Default)]
pub struct FakeService {
    pages: Mutex<VecDeque<Result<ChangesPage, ApiError>>>,
    hang_reads: Mutex<bool>,
    cursors_seen: Mutex<Vec<Option<String>>>,
    writes: Mutex<Vec<TupleKey>>,
    deletes: Mutex<Vec<TupleKey>>,
    delete_outcomes: Mutex<HashMap<String, DeleteOutcome>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a feed page. Once the queue is empty, reads return no changes.
    pub fn push_page(&self, changes: Vec<TupleChange>, token: &str) {
        self.pages.lock().unwrap().push_back(Ok(ChangesPage {
            changes,
            continuation_token: Some(token.to_string()),
        }));
    }

    pub fn push_read_error(&self) {
        self.pages.lock().unwrap().push_back(Err(ApiError::Server {
            status: 503,
            message: "unavailable".into(),
        }));
    }

    /// Make every read block forever.
    pub fn hang_reads(&self) {
        *self.hang_reads.lock().unwrap() = true;
    }

    pub fn set_delete_outcome(&self, key: &TupleKey, outcome: DeleteOutcome) {
        self.delete_outcomes
            .lock()
            .unwrap()
            .insert(key.canonical(), outcome);
    }

    pub fn cursors_seen(&self) -> Vec<Option<String>> {
        self.cursors_seen.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<TupleKey> {
        self.writes.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<TupleKey> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TupleService for FakeService {
    async fn read_changes(
        &self,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<ChangesPage, ApiError> {
        self.cursors_seen
            .lock()
            .unwrap()
            .push(cursor.map(str::to_string));

        let hang = *self.hang_reads.lock().unwrap();
        if hang {
            std::future::pending::<()>().await;
        }

        let next = self.pages.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ChangesPage::default()))
    }

    async fn write(&self, tuples: &[TupleKey]) -> Result<(), ApiError> {
        self.writes.lock().unwrap().extend_from_slice(tuples);
        Ok(())
    }

    async fn delete(&self, tuples: &[TupleKey]) -> Result<(), ApiError> {
        self.deletes.lock().unwrap().extend_from_slice(tuples);

        let outcomes = self.delete_outcomes.lock().unwrap();
        for tuple in tuples {
            match outcomes.get(&tuple.canonical()).copied() {
                Some(DeleteOutcome::Reject) => {
                    return Err(ApiError::Rejected {
                        status: 400,
                        code: "write_failed_due_to_invalid_input".into(),
                        message: "cannot delete a tuple which does not exist".into(),
                    });
                }
                Some(DeleteOutcome::Unavailable) => {
                    return Err(ApiError::Server {
                        status: 503,
                        message: "unavailable".into(),
                    });
                }
                Some(DeleteOutcome::Accept) | None => {}
            }
        }
        Ok(())
    }
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

pub fn alice() -> TupleKey {
    TupleKey::new("user:alice", "member", "group:eng")
}

pub fn bob() -> TupleKey {
    TupleKey::new("user:bob", "member", "group:eng")
}
