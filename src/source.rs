use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::list_view::ListQueryState;
use crate::router::ListKind;
use crate::types::ListEntry;

/// Checked when a response arrives; `true` means nobody wants it any more.
pub type CancelCondition = Arc<dyn Fn() -> bool + Send + Sync>;

/// Where list screens get their rows from.
#[async_trait]
pub trait ListSource: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Browser URL for `entry` as shown on the `kind` screen.
    fn web_url(&self, kind: &ListKind, entry: &ListEntry) -> Option<String>;

    /// One page for `query`, including the look-ahead item when there is one.
    /// A fetch whose `cancel` condition holds once the response arrives
    /// may return no rows.
    async fn fetch_page(
        &self,
        kind: &ListKind,
        query: &ListQueryState,
        cancel: Option<CancelCondition>,
    ) -> Result<Vec<ListEntry>>;

    /// Name of the signed-in user, `None` when browsing anonymously.
    async fn current_user(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Forget cached pages for `kind` so the next fetch hits the server.
    fn invalidate(&self, _kind: &ListKind) {}
}
