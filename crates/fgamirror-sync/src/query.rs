//! Read/write facade for the presentation layer.

use std::sync::Arc;

use fgamirror_api::{TupleKey, TupleService};
use fgamirror_store::{FactColumn, Filter, MirrorStore, Page, PageRow};
use tracing::{info, warn};

use crate::SyncError;

/// Stateless facade over the store and remote API.
///
/// Every call reads current store state; nothing is cached here. See
/// [`PageWindow`] for a caller-side cache.
pub struct TupleBrowser {
    service: Arc<dyn TupleService>,
    store: Arc<MirrorStore>,
}

impl TupleBrowser {
    pub fn new(service: Arc<dyn TupleService>, store: Arc<MirrorStore>) -> Self {
        Self { service, store }
    }

    /// Page of facts after `offset` rows, or `None` past the end.
    pub fn page(&self, offset: usize, filter: &Filter) -> Result<Option<Page>, SyncError> {
        Ok(self.store.load_page(offset, filter)?)
    }

    pub fn count(&self, filter: &Filter) -> Result<usize, SyncError> {
        Ok(self.store.count_facts(filter)?)
    }

    /// Distinct values to populate a filter. Errors yield an empty list.
    pub fn distinct_values(&self, column: FactColumn) -> Vec<String> {
        self.store.distinct_values(column).unwrap_or_else(|e| {
            warn!(column = ?column, error = %e, "failed to load distinct values");
            Vec::new()
        })
    }

    /// Record the operator's intent to delete a fact.
    ///
    /// Returns `false` if the key already had an intent or no such fact is
    /// mirrored.
    pub fn mark_for_deletion(&self, key: &str) -> Result<bool, SyncError> {
        let marked = self.store.mark_for_deletion(key)?;
        if marked {
            info!(key = %key, "marked for deletion");
        }
        Ok(marked)
    }

    /// Create a tuple from operator input `"user relation object"`.
    ///
    /// Malformed input is rejected before any remote call. The new fact
    /// appears locally once the change mirror sees the WRITE.
    pub async fn create(&self, input: &str) -> Result<TupleKey, SyncError> {
        let key = TupleKey::parse(input)?;
        self.service.write(std::slice::from_ref(&key)).await?;
        info!(key = %key, "tuple written");
        Ok(key)
    }
}

/// Caller-side cache of the last loaded [`Page`].
///
/// A scrolling view asks for one row at a time; the store is queried only
/// when the row falls outside the cached bounds or the filter changed.
#[derive(Debug, Default)]
pub struct PageWindow {
    page: Option<Page>,
    loads: usize,
}

impl PageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry at 1-based `row` under `filter`, loading a new page on a miss.
    pub fn row(
        &mut self,
        browser: &TupleBrowser,
        row: usize,
        filter: &Filter,
    ) -> Result<Option<&PageRow>, SyncError> {
        if row == 0 {
            return Ok(None);
        }

        let hit = self
            .page
            .as_ref()
            .is_some_and(|page| page.is_for(filter) && page.contains(row));
        if !hit {
            self.page = browser.page(row - 1, filter)?;
            self.loads += 1;
        }

        Ok(self.page.as_ref().and_then(|page| page.get(row)))
    }

    /// Reload the current window, e.g. after marking a row.
    pub fn refresh(&mut self, browser: &TupleBrowser) -> Result<(), SyncError> {
        if let Some(ref page) = self.page {
            let (offset, filter) = (page.lower_bound - 1, page.filter.clone());
            self.page = browser.page(offset, &filter)?;
            self.loads += 1;
        }
        Ok(())
    }

    /// Drop the cached page.
    pub fn invalidate(&mut self) {
        self.page = None;
    }

    pub fn current(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    /// Number of store queries issued so far.
    pub fn loads(&self) -> usize {
        self.loads
    }
}
