//! Paginated list controller: filter text, page offset and page size for one
//! list screen, plus the paging decisions the screen renders from.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::router::list_url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQueryState {
    pub filter: Option<String>,
    pub offset: u32,
    pub items_per_page: u32,
}

impl ListQueryState {
    pub fn new(items_per_page: u32) -> Self {
        Self {
            filter: None,
            offset: 0,
            items_per_page: items_per_page.max(1),
        }
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref().filter(|f| !f.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LoadState {
    #[default]
    Idle,
    Loading,
}

/// Link to the page `direction` (+1 / -1) pages away from `offset`.
/// The offset never goes below zero.
pub fn compute_navigation_link(
    offset: u32,
    direction: i32,
    items_per_page: u32,
    filter: Option<&str>,
    base_path: &str,
) -> String {
    let step = i64::from(items_per_page) * i64::from(direction.signum());
    let new_offset = (i64::from(offset) + step).clamp(0, i64::from(u32::MAX)) as u32;
    list_url(base_path, filter, new_offset)
}

/// 1-based page number. Offsets that are not a multiple of the page size
/// round down to the page they start in.
pub fn compute_page_number(offset: u32, items_per_page: u32) -> u32 {
    offset / items_per_page.max(1) + 1
}

/// The list is fetched with one extra item: only when that extra item came
/// back is there a next page.
pub fn hide_next_arrow<T>(loading: bool, items: &[T], items_per_page: u32) -> bool {
    loading || items.is_empty() || items.len() < items_per_page as usize + 1
}

pub fn hide_prev_arrow(offset: u32) -> bool {
    offset == 0
}

/// Both missing and empty filters count as "no filter".
fn is_blank(filter: Option<&str>) -> bool {
    filter.map_or(true, str::is_empty)
}

/// A single cancel-and-replace timer.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Run `f` after the delay unless another call replaces it first.
    pub fn schedule<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// State owned by one list screen.
#[derive(Debug)]
pub struct ListController<T> {
    base_path: String,
    paged: bool,
    query: ListQueryState,
    items: Vec<T>,
    state: LoadState,
    /// Latest load ticket. Shared with the controllers this one replaced and
    /// with the cancel checks handed to running loads.
    load_id: Arc<AtomicU64>,
    debounce: Debouncer,
}

impl<T> ListController<T> {
    pub fn new(base_path: String, items_per_page: u32, debounce: Duration) -> Self {
        Self {
            base_path,
            paged: true,
            query: ListQueryState::new(items_per_page),
            items: Vec::new(),
            state: LoadState::Idle,
            load_id: Arc::new(AtomicU64::new(0)),
            debounce: Debouncer::new(debounce),
        }
    }

    /// Unpaged lists show every item and never offer next/previous.
    pub fn unpaged(mut self) -> Self {
        self.paged = false;
        self
    }

    /// Continue the load tickets of `previous`, so that loads it started
    /// can never be mistaken for this controller's.
    pub fn continue_after(mut self, previous: &Self) -> Self {
        self.load_id = Arc::clone(&previous.load_id);
        self
    }

    pub fn query(&self) -> &ListQueryState {
        &self.query
    }

    pub fn filter(&self) -> Option<&str> {
        self.query.filter()
    }

    pub fn offset(&self) -> u32 {
        self.query.offset
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    /// Replace filter and offset with what a route delivered. Any pending
    /// filter edit is dropped in favour of the route.
    pub fn apply_route(&mut self, filter: Option<String>, offset: u32) {
        self.debounce.cancel();
        self.query.filter = filter.filter(|f| !f.is_empty());
        self.query.offset = if self.paged { offset } else { 0 };
    }

    /// Record a filter edit and schedule navigation to the filtered list.
    ///
    /// Going from no filter to no filter does nothing. Edits inside the
    /// debounce window replace each other; only the last one navigates.
    /// Returns whether navigation was scheduled.
    pub fn set_filter<F>(&mut self, filter: Option<&str>, navigate: F) -> bool
    where
        F: FnOnce(String) + Send + 'static,
    {
        if is_blank(self.query.filter.as_deref()) && is_blank(filter) {
            return false;
        }
        self.query.filter = filter.map(str::to_string);

        let url = list_url(&self.base_path, self.query.filter(), 0);
        self.debounce.schedule(move || navigate(url));
        true
    }

    pub fn has_pending_filter(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Enter `Loading` and return the id the response must carry.
    pub fn begin_load(&mut self) -> u64 {
        self.state = LoadState::Loading;
        self.load_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether load `id` has been replaced by a newer one, checkable from
    /// the task running it.
    pub fn superseded_check(&self, id: u64) -> impl Fn() -> bool + Send + Sync + 'static {
        let latest = Arc::clone(&self.load_id);
        move || latest.load(Ordering::SeqCst) != id
    }

    /// Apply a response for load `id`.
    ///
    /// A response for anything but the latest load is discarded and reported
    /// as `Ok(false)`. Errors leave the current items in place and hand the
    /// error back to the caller.
    pub fn finish_load<E>(&mut self, id: u64, result: Result<Vec<T>, E>) -> Result<bool, E> {
        let current = self.load_id.load(Ordering::SeqCst);
        if id != current {
            tracing::debug!(id, current, "discarding late response");
            return Ok(false);
        }
        self.state = LoadState::Idle;
        self.items = result?;
        Ok(true)
    }

    /// Everything fetched, including the look-ahead item.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Items to render: the look-ahead item is never shown.
    pub fn visible_items(&self) -> &[T] {
        if !self.paged {
            return &self.items;
        }
        let end = self.items.len().min(self.query.items_per_page as usize);
        &self.items[..end]
    }

    pub fn page_number(&self) -> u32 {
        compute_page_number(self.query.offset, self.query.items_per_page)
    }

    pub fn hide_next_arrow(&self) -> bool {
        !self.paged || hide_next_arrow(self.is_loading(), &self.items, self.query.items_per_page)
    }

    pub fn hide_prev_arrow(&self) -> bool {
        !self.paged || hide_prev_arrow(self.query.offset)
    }

    pub fn next_link(&self) -> Option<String> {
        if self.hide_next_arrow() {
            return None;
        }
        Some(self.link(1))
    }

    pub fn prev_link(&self) -> Option<String> {
        if self.hide_prev_arrow() {
            return None;
        }
        Some(self.link(-1))
    }

    fn link(&self, direction: i32) -> String {
        compute_navigation_link(
            self.query.offset,
            direction,
            self.query.items_per_page,
            self.query.filter(),
            &self.base_path,
        )
    }
}
