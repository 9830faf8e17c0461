use std::sync::Arc;
use std::time::Duration;

use crossterm::event::KeyEvent;
use tokio::sync::mpsc;

use crate::action::Action;
use crate::config::{GeneralConfig, ServerConfig};
use crate::error::GerritError;
use crate::event::{map_key, Event, InputMode};
use crate::list_view::ListController;
use crate::rest::{FetchCache, GerritClient};
use crate::router::{ListKind, Route};
use crate::source::{CancelCondition, ListSource};
use crate::types::ListEntry;

pub struct App {
    pub route: Route,
    pub list: ListController<ListEntry>,
    pub selected: usize,
    pub filter_mode: bool,
    /// Filter text as typed; may run ahead of the route while debouncing.
    pub filter_input: String,
    /// Highlighted row of the server popup, when it is open.
    pub server_popup: Option<usize>,
    pub user: Option<String>,
    pub error: Option<String>,
    pub status: Option<String>,
    pub should_quit: bool,
    history: Vec<Route>,
    servers: Vec<ServerConfig>,
    server_index: usize,
    items_per_page: u32,
    debounce: Duration,
    source: Arc<dyn ListSource>,
    action_tx: mpsc::UnboundedSender<Action>,
}

impl App {
    pub fn new(
        source: Arc<dyn ListSource>,
        servers: Vec<ServerConfig>,
        general: &GeneralConfig,
        route: Route,
        action_tx: mpsc::UnboundedSender<Action>,
    ) -> Self {
        let server_index = servers
            .iter()
            .position(|s| s.name == source.name())
            .unwrap_or(0);
        let items_per_page = general.items_per_page;
        let debounce = general.filter_debounce();

        Self {
            list: new_controller(&route.kind, items_per_page, debounce),
            route,
            selected: 0,
            filter_mode: false,
            filter_input: String::new(),
            server_popup: None,
            user: None,
            error: None,
            status: None,
            should_quit: false,
            history: Vec::new(),
            servers,
            server_index,
            items_per_page,
            debounce,
            source,
            action_tx,
        }
    }

    pub fn server_name(&self) -> &str {
        self.source.name()
    }

    pub fn server_names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name.clone()).collect()
    }

    pub fn input_mode(&self) -> InputMode {
        if self.server_popup.is_some() {
            InputMode::Popup
        } else if self.filter_mode {
            InputMode::Filter
        } else {
            InputMode::Normal
        }
    }

    pub fn selected_entry(&self) -> Option<&ListEntry> {
        self.list.visible_items().get(self.selected)
    }

    pub fn handle_event(&self, event: Event) -> Action {
        match event {
            Event::Init => Action::Init,
            Event::Key(key) => self.handle_key(key),
            _ => Action::None,
        }
    }

    fn handle_key(&self, key: KeyEvent) -> Action {
        map_key(key, self.input_mode())
    }

    pub fn update(&mut self, action: Action) {
        let background = matches!(
            action,
            Action::ListLoaded { .. }
                | Action::ListFailed { .. }
                | Action::AccountLoaded(_)
                | Action::SourceReady(..)
                | Action::Error(_)
                | Action::None
        );
        if !background {
            self.error = None;
            self.status = None;
        }

        match action {
            Action::Init => {
                self.spawn_load_user();
                self.show(self.route.clone());
            }
            Action::Back => {
                if self.server_popup.take().is_some() {
                    return;
                }
                if let Some(previous) = self.history.pop() {
                    self.show(previous);
                } else if self.route.kind.repo().is_some() {
                    self.show(Route::new(ListKind::Repos));
                } else {
                    self.should_quit = true;
                }
            }
            Action::ScrollUp => {
                self.selected = self.selected.saturating_sub(1);
            }
            Action::ScrollDown => {
                let len = self.list.visible_items().len();
                if len > 0 && self.selected < len - 1 {
                    self.selected += 1;
                }
            }
            Action::GoToTop => {
                self.selected = 0;
            }
            Action::GoToBottom => {
                self.selected = self.list.visible_items().len().saturating_sub(1);
            }
            Action::Select => match self.route.kind {
                ListKind::Repos => self.show_repo_list(ListKind::Branches),
                _ => self.open_selected(),
            },
            Action::NextList => {
                self.history.clear();
                self.show(Route::new(self.route.kind.next_top_level()));
            }
            Action::PrevList => {
                self.history.clear();
                self.show(Route::new(self.route.kind.prev_top_level()));
            }
            Action::Navigate(path) => self.navigate(&path),

            Action::ListLoaded { entries, load_id } => {
                if let Ok(true) = self.list.finish_load::<GerritError>(load_id, Ok(entries)) {
                    let len = self.list.visible_items().len();
                    self.selected = self.selected.min(len.saturating_sub(1));
                }
            }
            Action::ListFailed { error, load_id } => {
                if let Err(err) = self.list.finish_load(load_id, Err(error)) {
                    self.error = Some(match err.status() {
                        Some(401 | 403) => format!("{} (not permitted, check credentials)", err),
                        _ => err.to_string(),
                    });
                }
            }
            Action::AccountLoaded(name) => {
                self.user = Some(name);
            }

            Action::EnterFilterMode => {
                self.filter_mode = true;
                self.filter_input = self.list.filter().unwrap_or_default().to_string();
            }
            Action::ExitFilterMode => {
                self.filter_mode = false;
            }
            Action::FilterInput(c) => {
                self.filter_input.push(c);
                self.schedule_filter();
            }
            Action::FilterBackspace => {
                self.filter_input.pop();
                self.schedule_filter();
            }

            Action::NextPage => {
                if let Some(link) = self.list.next_link() {
                    self.navigate(&link);
                }
            }
            Action::PrevPage => {
                if let Some(link) = self.list.prev_link() {
                    self.navigate(&link);
                }
            }

            Action::Refresh => {
                self.source.invalidate(&self.route.kind);
                self.spawn_load();
            }
            Action::OpenInBrowser => self.open_selected(),
            Action::YankUrl => {
                if let Some(url) = self.selected_url() {
                    let copied =
                        arboard::Clipboard::new().and_then(|mut cb| cb.set_text(url.clone()));
                    match copied {
                        Ok(()) => self.status = Some(format!("Copied {}", url)),
                        Err(err) => self.error = Some(format!("Clipboard: {}", err)),
                    }
                }
            }
            Action::ShowBranches => self.show_repo_list(ListKind::Branches),
            Action::ShowTags => self.show_repo_list(ListKind::Tags),
            Action::ShowDashboards => self.show_repo_list(ListKind::Dashboards),

            Action::PopupUp => {
                if let Some(i) = self.server_popup.as_mut() {
                    *i = i.saturating_sub(1);
                }
            }
            Action::PopupDown => {
                let len = self.servers.len();
                if let Some(i) = self.server_popup.as_mut() {
                    if *i + 1 < len {
                        *i += 1;
                    }
                }
            }
            Action::PopupSelect => {
                if let Some(index) = self.server_popup.take() {
                    self.switch_server(index);
                }
            }

            Action::ShowServerSelect => {
                self.server_popup = Some(self.server_index);
            }
            Action::SourceReady(source, name) => {
                tracing::info!(server = %name, "switched server");
                if let Some(index) = self.servers.iter().position(|s| s.name == name) {
                    self.server_index = index;
                }
                self.source = source;
                self.user = None;
                self.history.clear();
                self.status = Some(format!("Connected to {}", name));
                self.spawn_load_user();

                // repository sub-lists may not exist on the new server
                let kind = match &self.route.kind {
                    ListKind::Branches(_) | ListKind::Tags(_) | ListKind::Dashboards(_) => {
                        ListKind::Repos
                    }
                    kind => kind.clone(),
                };
                self.show(Route::new(kind));
            }

            Action::Error(msg) => {
                self.error = Some(msg);
            }
            Action::None => {}
        }
    }

    fn navigate(&mut self, path: &str) {
        match Route::parse(path) {
            Some(route) => {
                // drilling into a repository remembers the list it came from
                if route.kind.repo().is_some() && self.route.kind.repo().is_none() {
                    self.history.push(self.route.clone());
                }
                self.show(route);
            }
            None => {
                let err = GerritError::Api(format!("not a list: {}", path));
                self.error = Some(err.to_string());
            }
        }
    }

    /// Make `route` current and load its page.
    fn show(&mut self, route: Route) {
        if route.kind != self.route.kind {
            self.list = new_controller(&route.kind, self.items_per_page, self.debounce)
                .continue_after(&self.list);
            self.filter_mode = false;
        }
        if route != self.route || self.list.items().is_empty() {
            self.selected = 0;
        }

        self.list.apply_route(route.filter.clone(), route.offset);
        let typed_ahead = self.filter_mode && route.filter.as_deref() != Some(&self.filter_input);
        if !self.filter_mode {
            self.filter_input = route.filter.clone().unwrap_or_default();
        }
        self.route = route;
        self.spawn_load();

        // keystrokes that arrived after the debounce fired still navigate
        if typed_ahead {
            self.schedule_filter();
        }
    }

    fn schedule_filter(&mut self) {
        let tx = self.action_tx.clone();
        let text = self.filter_input.clone();
        self.list.set_filter(Some(&text), move |url| {
            tx.send(Action::Navigate(url)).ok();
        });
    }

    /// Branches, tags or dashboards of the selected repository, or of the
    /// repository whose sub-list is showing.
    fn show_repo_list(&mut self, sub_list: fn(String) -> ListKind) {
        let repo = match (self.route.kind.repo(), self.selected_entry()) {
            (Some(repo), _) => repo.to_string(),
            (None, Some(ListEntry::Repo { name, .. })) => name.clone(),
            _ => return,
        };
        let kind = sub_list(repo);
        if kind != self.route.kind {
            self.navigate(&Route::new(kind).path());
        }
    }

    fn selected_url(&self) -> Option<String> {
        let entry = self.selected_entry()?;
        self.source.web_url(&self.route.kind, entry)
    }

    fn open_selected(&mut self) {
        let Some(url) = self.selected_url() else {
            return;
        };
        match open::that(&url) {
            Ok(()) => self.status = Some(format!("Opened {}", url)),
            Err(err) => self.error = Some(format!("Failed to open browser: {}", err)),
        }
    }

    fn switch_server(&mut self, index: usize) {
        if index == self.server_index {
            return;
        }
        let Some(server) = self.servers.get(index).cloned() else {
            return;
        };
        self.status = Some(format!("Connecting to {}...", server.name));

        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            let name = server.name.clone();
            // password commands may block
            let connected = tokio::task::spawn_blocking(move || {
                GerritClient::connect(&server, Arc::new(FetchCache::new()))
            })
            .await;
            let action = match connected {
                Ok(Ok(client)) => Action::SourceReady(Arc::new(client), name),
                Ok(Err(err)) => err.into(),
                Err(err) => Action::Error(err.to_string()),
            };
            tx.send(action).ok();
        });
    }

    fn spawn_load(&mut self) {
        let load_id = self.list.begin_load();
        let source = Arc::clone(&self.source);
        let kind = self.route.kind.clone();
        let query = self.list.query().clone();
        let cancel: CancelCondition = Arc::new(self.list.superseded_check(load_id));
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            let action = match source.fetch_page(&kind, &query, Some(cancel)).await {
                Ok(entries) => Action::ListLoaded { entries, load_id },
                Err(error) => Action::ListFailed { error, load_id },
            };
            tx.send(action).ok();
        });
    }

    fn spawn_load_user(&self) {
        let source = Arc::clone(&self.source);
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            match source.current_user().await {
                Ok(Some(name)) => {
                    tx.send(Action::AccountLoaded(name)).ok();
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(%err, "could not load account"),
            }
        });
    }
}

fn new_controller(kind: &ListKind, items_per_page: u32, debounce: Duration) -> ListController<ListEntry> {
    let list = ListController::new(kind.base_path(), items_per_page, debounce);
    if kind.is_paged() {
        list
    } else {
        list.unpaged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    use crate::error::Result;
    use crate::list_view::ListQueryState;

    #[derive(Debug, Default)]
    struct FakeSource {
        total: usize,
        fail_status: Option<u16>,
        /// Answered only after 500 ms.
        slow_kind: Option<ListKind>,
        requests: Mutex<Vec<(ListKind, ListQueryState)>>,
        invalidated: Mutex<Vec<ListKind>>,
        /// What each load's cancel condition said once its rows were ready.
        cancel_checks: Mutex<Vec<bool>>,
    }

    impl FakeSource {
        fn with_items(total: usize) -> Arc<Self> {
            Arc::new(Self {
                total,
                ..Default::default()
            })
        }

        fn last_request(&self) -> (ListKind, ListQueryState) {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ListSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        fn web_url(&self, kind: &ListKind, entry: &ListEntry) -> Option<String> {
            Some(format!("https://fake{}/{}", kind.base_path(), entry.label()))
        }

        async fn fetch_page(
            &self,
            kind: &ListKind,
            query: &ListQueryState,
            cancel: Option<CancelCondition>,
        ) -> Result<Vec<ListEntry>> {
            self.requests
                .lock()
                .unwrap()
                .push((kind.clone(), query.clone()));
            if self.slow_kind.as_ref() == Some(kind) {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            if let Some(cancel) = cancel {
                self.cancel_checks.lock().unwrap().push(cancel());
            }
            if let Some(status) = self.fail_status {
                return Err(GerritError::Http {
                    status,
                    url: "/projects/".to_string(),
                });
            }
            let start = (query.offset as usize).min(self.total);
            let end = (start + query.items_per_page as usize + 1).min(self.total);
            Ok((start..end)
                .map(|i| match kind {
                    ListKind::Groups => ListEntry::Group {
                        id: i.to_string(),
                        name: format!("group-{}", i),
                        owner: None,
                        description: None,
                        visible_to_all: false,
                    },
                    _ => ListEntry::Repo {
                        name: format!("repo-{}", i),
                        description: None,
                        state: None,
                    },
                })
                .collect())
        }

        fn invalidate(&self, kind: &ListKind) {
            self.invalidated.lock().unwrap().push(kind.clone());
        }
    }

    fn app_with(source: Arc<FakeSource>, path: &str) -> (App, mpsc::UnboundedReceiver<Action>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let general = GeneralConfig {
            items_per_page: 10,
            ..Default::default()
        };
        let servers = vec![ServerConfig {
            name: "fake".to_string(),
            url: "https://fake".to_string(),
            username: None,
            password_env: None,
            password_command: None,
        }];
        let route = Route::parse(path).unwrap();
        (App::new(source, servers, &general, route, tx), rx)
    }

    async fn pump(app: &mut App, rx: &mut mpsc::UnboundedReceiver<Action>) {
        let action = rx.recv().await.unwrap();
        app.update(action);
    }

    fn labels(app: &App) -> Vec<String> {
        app.list
            .visible_items()
            .iter()
            .map(|e| e.label().to_string())
            .collect()
    }

    #[tokio::test]
    async fn init_loads_first_page() {
        let source = FakeSource::with_items(25);
        let (mut app, mut rx) = app_with(Arc::clone(&source), "/admin/repos");

        app.update(Action::Init);
        assert!(app.list.is_loading());
        pump(&mut app, &mut rx).await;

        assert!(!app.list.is_loading());
        assert_eq!(app.list.visible_items().len(), 10);
        assert_eq!(app.list.next_link().as_deref(), Some("/admin/repos,10"));
        assert_eq!(app.list.prev_link(), None);
        assert_eq!(source.last_request().1.offset, 0);
    }

    #[tokio::test]
    async fn paging_forward_and_back() {
        let source = FakeSource::with_items(25);
        let (mut app, mut rx) = app_with(Arc::clone(&source), "/admin/repos");
        app.update(Action::Init);
        pump(&mut app, &mut rx).await;

        app.update(Action::NextPage);
        pump(&mut app, &mut rx).await;
        assert_eq!(app.route.offset, 10);
        assert_eq!(app.list.page_number(), 2);

        app.update(Action::NextPage);
        pump(&mut app, &mut rx).await;
        assert_eq!(app.route.offset, 20);
        assert_eq!(labels(&app).len(), 5);
        assert!(app.list.hide_next_arrow());

        // no next page: nothing happens
        app.update(Action::NextPage);
        assert_eq!(app.route.offset, 20);

        app.update(Action::PrevPage);
        pump(&mut app, &mut rx).await;
        assert_eq!(app.route.offset, 10);
        assert_eq!(labels(&app)[0], "repo-10");
    }

    #[tokio::test]
    async fn superseded_load_is_ignored() {
        let source = FakeSource::with_items(25);
        let (mut app, mut rx) = app_with(source, "/admin/repos");

        app.update(Action::Init);
        app.update(Action::Navigate("/admin/repos,10".to_string()));
        pump(&mut app, &mut rx).await;
        pump(&mut app, &mut rx).await;

        assert_eq!(labels(&app)[0], "repo-10");
        assert!(!app.list.is_loading());
    }

    #[tokio::test]
    async fn enter_opens_branches_and_back_returns() {
        let source = FakeSource::with_items(3);
        let (mut app, mut rx) = app_with(Arc::clone(&source), "/admin/repos");
        app.update(Action::Init);
        pump(&mut app, &mut rx).await;

        app.update(Action::ScrollDown);
        app.update(Action::Select);
        assert_eq!(app.route.kind, ListKind::Branches("repo-1".to_string()));
        pump(&mut app, &mut rx).await;
        assert_eq!(source.last_request().0, ListKind::Branches("repo-1".to_string()));

        // switching to tags stays inside the repository
        app.update(Action::ShowTags);
        assert_eq!(app.route.kind, ListKind::Tags("repo-1".to_string()));
        pump(&mut app, &mut rx).await;

        app.update(Action::Back);
        assert_eq!(app.route, Route::new(ListKind::Repos));
        assert!(!app.should_quit);

        app.update(Action::Back);
        assert!(app.should_quit);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_a_filter_navigates_after_debounce() {
        let source = FakeSource::with_items(50);
        let (mut app, mut rx) = app_with(Arc::clone(&source), "/admin/groups,20");
        app.update(Action::Init);
        pump(&mut app, &mut rx).await;

        app.update(Action::EnterFilterMode);
        app.update(Action::FilterInput('a'));
        app.update(Action::FilterInput('x'));
        app.update(Action::FilterBackspace);
        app.update(Action::FilterInput('d'));
        assert_eq!(app.filter_input, "ad");
        assert_eq!(app.route.offset, 20);

        let action = rx.recv().await.unwrap();
        assert!(matches!(&action, Action::Navigate(url) if url == "/admin/groups/q/filter:ad"));
        app.update(action);
        pump(&mut app, &mut rx).await;

        assert_eq!(app.route.filter.as_deref(), Some("ad"));
        assert_eq!(app.route.offset, 0);
        let (kind, query) = source.last_request();
        assert_eq!(kind, ListKind::Groups);
        assert_eq!(query.filter.as_deref(), Some("ad"));
        assert!(app.filter_mode);

        app.update(Action::ExitFilterMode);
        assert_eq!(app.input_mode(), InputMode::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn late_load_from_previous_list_is_dropped() {
        let source = Arc::new(FakeSource {
            total: 3,
            slow_kind: Some(ListKind::Repos),
            ..Default::default()
        });
        let (mut app, mut rx) = app_with(Arc::clone(&source), "/admin/repos");

        app.update(Action::Init);
        app.update(Action::NextList);
        assert_eq!(app.route.kind, ListKind::Groups);

        // groups answer first, the repository page half a second later
        pump(&mut app, &mut rx).await;
        pump(&mut app, &mut rx).await;

        assert_eq!(labels(&app), vec!["group-0", "group-1", "group-2"]);
        assert!(!app.list.is_loading());
        assert_eq!(*source.cancel_checks.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn dashboards_of_selected_repository() {
        let source = FakeSource::with_items(2);
        let (mut app, mut rx) = app_with(Arc::clone(&source), "/admin/repos");
        app.update(Action::Init);
        pump(&mut app, &mut rx).await;

        app.update(Action::ShowDashboards);
        pump(&mut app, &mut rx).await;
        let kind = ListKind::Dashboards("repo-0".to_string());
        assert_eq!(app.route.kind, kind);
        assert_eq!(app.route.path(), "/admin/repos/repo-0,dashboards");
        assert_eq!(source.last_request().0, kind);
        assert!(app.list.hide_next_arrow());

        app.update(Action::ShowBranches);
        assert_eq!(app.route.kind, ListKind::Branches("repo-0".to_string()));
        pump(&mut app, &mut rx).await;

        app.update(Action::Back);
        assert_eq!(app.route, Route::new(ListKind::Repos));
    }

    #[tokio::test]
    async fn forbidden_load_hints_at_credentials() {
        let source = Arc::new(FakeSource {
            fail_status: Some(403),
            ..Default::default()
        });
        let (mut app, mut rx) = app_with(source, "/admin/groups");
        app.update(Action::Init);
        pump(&mut app, &mut rx).await;

        assert_eq!(
            app.error.as_deref(),
            Some("HTTP 403 for /projects/ (not permitted, check credentials)")
        );
    }

    #[tokio::test]
    async fn failed_load_reports_error() {
        let source = Arc::new(FakeSource {
            fail_status: Some(500),
            ..Default::default()
        });
        let (mut app, mut rx) = app_with(source, "/admin/plugins");
        app.update(Action::Init);
        pump(&mut app, &mut rx).await;

        assert_eq!(app.error.as_deref(), Some("HTTP 500 for /projects/"));
        assert!(!app.list.is_loading());
    }

    #[tokio::test]
    async fn refresh_invalidates_and_reloads() {
        let source = FakeSource::with_items(5);
        let (mut app, mut rx) = app_with(Arc::clone(&source), "/admin/repos");
        app.update(Action::Init);
        pump(&mut app, &mut rx).await;

        app.update(Action::Refresh);
        pump(&mut app, &mut rx).await;
        assert_eq!(*source.invalidated.lock().unwrap(), vec![ListKind::Repos]);
        assert_eq!(source.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_path_is_an_error() {
        let source = FakeSource::with_items(5);
        let (mut app, _rx) = app_with(source, "/admin/repos");
        app.update(Action::Navigate("/c/gerrit/+/1".to_string()));
        assert_eq!(app.error.as_deref(), Some("API error: not a list: /c/gerrit/+/1"));
    }

    #[tokio::test]
    async fn documentation_is_unpaged() {
        let source = FakeSource::with_items(40);
        let (mut app, mut rx) = app_with(source, "/admin/plugins");
        app.update(Action::Navigate("/Documentation/q/filter:rest".to_string()));
        pump(&mut app, &mut rx).await;

        assert_eq!(app.route.kind, ListKind::Documentation);
        assert_eq!(app.list.visible_items().len(), 11);
        assert!(app.list.hide_next_arrow());
        assert!(app.list.hide_prev_arrow());

        app.update(Action::NextList);
        assert_eq!(app.route, Route::new(ListKind::Repos));
    }

    #[tokio::test]
    async fn server_popup_closes_on_back() {
        let source = FakeSource::with_items(1);
        let (mut app, _rx) = app_with(source, "/admin/repos");
        app.update(Action::ShowServerSelect);
        assert_eq!(app.input_mode(), InputMode::Popup);
        app.update(Action::PopupDown);
        assert_eq!(app.server_popup, Some(0));

        app.update(Action::Back);
        assert_eq!(app.server_popup, None);
        assert!(!app.should_quit);
    }
}
