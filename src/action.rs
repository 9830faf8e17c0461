use std::sync::Arc;

use crate::error::GerritError;
use crate::source::ListSource;
use crate::types::ListEntry;

#[derive(Debug, Clone)]
pub enum Action {
    Init,
    Back,
    ScrollUp,
    ScrollDown,
    GoToTop,
    GoToBottom,
    Select,
    NextList,
    PrevList,

    /// Show the list at a route path such as `/admin/groups/q/filter:ad,25`.
    Navigate(String),

    // Loading
    ListLoaded {
        entries: Vec<ListEntry>,
        load_id: u64,
    },
    ListFailed {
        error: GerritError,
        load_id: u64,
    },
    AccountLoaded(String),

    // Filter
    EnterFilterMode,
    ExitFilterMode,
    FilterInput(char),
    FilterBackspace,

    // Paging
    NextPage,
    PrevPage,

    // Item actions
    Refresh,
    OpenInBrowser,
    YankUrl,
    ShowBranches,
    ShowTags,
    ShowDashboards,

    // Popup navigation
    PopupUp,
    PopupDown,
    PopupSelect,

    // Server switching
    ShowServerSelect,
    SourceReady(Arc<dyn ListSource>, String),

    Error(String),
    None,
}

impl From<GerritError> for Action {
    fn from(err: GerritError) -> Self {
        Action::Error(err.to_string())
    }
}
