//! List routes: `<base>[/q/filter:<filter>][,<offset>]`.

use std::fmt;

use crate::rest::url::{decode_url, encode_url};

const FILTER_SEGMENT: &str = "/q/filter:";

/// Which list screen a route shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListKind {
    Repos,
    Groups,
    Plugins,
    Branches(String),
    Tags(String),
    Dashboards(String),
    Documentation,
}

impl ListKind {
    /// Top-level lists reachable with Tab.
    pub const TOP_LEVEL: [ListKind; 4] = [
        ListKind::Repos,
        ListKind::Groups,
        ListKind::Plugins,
        ListKind::Documentation,
    ];

    pub fn base_path(&self) -> String {
        match self {
            ListKind::Repos => "/admin/repos".to_string(),
            ListKind::Groups => "/admin/groups".to_string(),
            ListKind::Plugins => "/admin/plugins".to_string(),
            ListKind::Branches(repo) => format!("/admin/repos/{},branches", encode_url(repo, true)),
            ListKind::Tags(repo) => format!("/admin/repos/{},tags", encode_url(repo, true)),
            ListKind::Dashboards(repo) => {
                format!("/admin/repos/{},dashboards", encode_url(repo, true))
            }
            ListKind::Documentation => "/Documentation".to_string(),
        }
    }

    /// Documentation search and dashboards return every hit at once.
    pub fn is_paged(&self) -> bool {
        !matches!(self, ListKind::Documentation | ListKind::Dashboards(_))
    }

    pub fn repo(&self) -> Option<&str> {
        match self {
            ListKind::Branches(repo) | ListKind::Tags(repo) | ListKind::Dashboards(repo) => {
                Some(repo)
            }
            _ => None,
        }
    }

    pub fn title(&self) -> String {
        match self {
            ListKind::Repos => "Repositories".to_string(),
            ListKind::Groups => "Groups".to_string(),
            ListKind::Plugins => "Plugins".to_string(),
            ListKind::Branches(repo) => format!("{} - Branches", repo),
            ListKind::Tags(repo) => format!("{} - Tags", repo),
            ListKind::Dashboards(repo) => format!("{} - Dashboards", repo),
            ListKind::Documentation => "Documentation".to_string(),
        }
    }

    /// Next top-level list (Tab). Repository sub-lists go back to Repos.
    pub fn next_top_level(&self) -> ListKind {
        self.cycle_top_level(1)
    }

    pub fn prev_top_level(&self) -> ListKind {
        self.cycle_top_level(Self::TOP_LEVEL.len() - 1)
    }

    fn cycle_top_level(&self, step: usize) -> ListKind {
        let len = Self::TOP_LEVEL.len();
        match Self::TOP_LEVEL.iter().position(|k| k == self) {
            Some(i) => Self::TOP_LEVEL[(i + step) % len].clone(),
            None => ListKind::Repos,
        }
    }
}

/// A parsed list route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: ListKind,
    pub filter: Option<String>,
    pub offset: u32,
}

impl Route {
    pub fn new(kind: ListKind) -> Self {
        Self {
            kind,
            filter: None,
            offset: 0,
        }
    }

    pub fn path(&self) -> String {
        list_url(&self.kind.base_path(), self.filter.as_deref(), self.offset)
    }

    /// Parse a list path. Returns `None` for anything that is not a list.
    pub fn parse(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let path = path.strip_suffix('/').unwrap_or(path);

        if let Some(rest) = path.strip_prefix("/Documentation") {
            return match rest {
                "" | "/q" => Some(Route::new(ListKind::Documentation)),
                _ => {
                    let filter = rest.strip_prefix(FILTER_SEGMENT)?;
                    Some(Route {
                        kind: ListKind::Documentation,
                        filter: non_empty(decode_url(filter)),
                        offset: 0,
                    })
                }
            };
        }

        if let Some(rest) = path.strip_prefix("/admin/groups") {
            return with_query(ListKind::Groups, rest);
        }
        if let Some(rest) = path.strip_prefix("/admin/plugins") {
            return with_query(ListKind::Plugins, rest);
        }

        let rest = path.strip_prefix("/admin/repos")?;
        if rest.is_empty() || rest.starts_with(',') || rest.starts_with(FILTER_SEGMENT) {
            return with_query(ListKind::Repos, rest);
        }

        let rest = rest.strip_prefix('/')?;
        if let Some((repo, tail)) = rest.split_once(",branches") {
            return with_query(ListKind::Branches(decode_url(repo)), tail);
        }
        if let Some((repo, tail)) = rest.split_once(",tags") {
            return with_query(ListKind::Tags(decode_url(repo)), tail);
        }
        if let Some((repo, tail)) = rest.split_once(",dashboards") {
            return with_query(ListKind::Dashboards(decode_url(repo)), tail);
        }
        None
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// `rest` is what follows the base path: empty, `,<offset>`,
/// `/q/filter:<f>` or `/q/filter:<f>,<offset>`.
fn with_query(kind: ListKind, rest: &str) -> Option<Route> {
    if rest.is_empty() {
        return Some(Route::new(kind));
    }

    if let Some(offset) = rest.strip_prefix(',') {
        return Some(Route {
            kind,
            filter: None,
            offset: offset.parse().ok()?,
        });
    }

    let filter = rest.strip_prefix(FILTER_SEGMENT)?;
    // an encoded filter never contains a raw comma
    let (filter, offset) = match filter.rsplit_once(',') {
        Some((filter, offset)) => (filter, offset.parse().ok()?),
        None => (filter, 0),
    };
    Some(Route {
        kind,
        filter: non_empty(decode_url(filter)),
        offset,
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// `base`, plus `/q/filter:<encoded>` for a non-empty filter, plus
/// `,<offset>` when the offset is past the first page.
pub fn list_url(base: &str, filter: Option<&str>, offset: u32) -> String {
    let mut href = base.to_string();
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        href.push_str(FILTER_SEGMENT);
        href.push_str(&encode_url(filter, false));
    }
    if offset > 0 {
        href.push_str(&format!(",{}", offset));
    }
    href
}
