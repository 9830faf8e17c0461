use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gerrit REST `ProjectInfo`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub id: String,
    /// Only present when the projects list was requested as a query.
    pub name: Option<String>,
    pub description: Option<String>,
    pub state: Option<ProjectState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectState {
    Active,
    ReadOnly,
    Hidden,
}

impl fmt::Display for ProjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectState::Active => write!(f, "Active"),
            ProjectState::ReadOnly => write!(f, "Read only"),
            ProjectState::Hidden => write!(f, "Hidden"),
        }
    }
}

/// Gerrit REST `GroupInfo`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub group_id: Option<u64>,
    pub options: Option<GroupOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupOptions {
    pub visible_to_all: Option<bool>,
}

/// Gerrit REST `PluginInfo`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    #[serde(default)]
    pub id: String,
    pub version: Option<String>,
    pub index_url: Option<String>,
    pub filename: Option<String>,
    pub disabled: Option<bool>,
}

/// Gerrit REST `BranchInfo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchInfo {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub revision: Option<String>,
    pub can_delete: Option<bool>,
}

/// Gerrit REST `TagInfo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagInfo {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub revision: Option<String>,
    pub object: Option<String>,
    pub message: Option<String>,
    pub tagger: Option<GitPersonInfo>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitPersonInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<String>,
}

/// Gerrit REST `DashboardInfo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardInfo {
    pub id: String,
    pub project: Option<String>,
    pub defining_project: Option<String>,
    /// Ref under `refs/meta/dashboards/`, without that prefix.
    #[serde(rename = "ref")]
    pub ref_name: Option<String>,
    pub path: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Documentation search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocResult {
    pub title: String,
    pub url: String,
}

/// Gerrit REST `AccountInfo` (the fields we show)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "_account_id")]
    pub account_id: Option<u64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
}

impl AccountInfo {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.username.clone())
            .or_else(|| self.email.clone())
            .or_else(|| self.account_id.map(|id| id.to_string()))
            .unwrap_or_else(|| "anonymous".to_string())
    }
}

/// Parse Gerrit's `2013-02-01 09:59:32.126000000` UTC timestamps.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// One row of a list screen.
#[derive(Debug, Clone, PartialEq)]
pub enum ListEntry {
    Repo {
        name: String,
        description: Option<String>,
        state: Option<ProjectState>,
    },
    Group {
        id: String,
        name: String,
        owner: Option<String>,
        description: Option<String>,
        visible_to_all: bool,
    },
    Plugin {
        id: String,
        version: Option<String>,
        index_url: Option<String>,
        disabled: bool,
    },
    Branch {
        ref_name: String,
        revision: Option<String>,
    },
    Tag {
        ref_name: String,
        revision: Option<String>,
        message: Option<String>,
        created: Option<DateTime<Utc>>,
    },
    Dashboard {
        id: String,
        title: Option<String>,
        description: Option<String>,
        /// Project the dashboard is inherited from, if not the listed one.
        inherited_from: Option<String>,
        is_default: bool,
        url: Option<String>,
    },
    Doc {
        title: String,
        url: String,
    },
}

impl ListEntry {
    /// `name` is used when the response omits one; it may be the
    /// URL-encoded project id.
    pub fn from_project(name: String, info: ProjectInfo) -> Self {
        let name = info.name.unwrap_or_else(|| match urlencoding::decode(&name) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => name,
        });
        ListEntry::Repo {
            name,
            description: info.description.filter(|d| !d.is_empty()),
            state: info.state,
        }
    }

    pub fn from_group(name: String, info: GroupInfo) -> Self {
        ListEntry::Group {
            id: info.id,
            name: info.name.unwrap_or(name),
            owner: info.owner,
            description: info.description.filter(|d| !d.is_empty()),
            visible_to_all: info
                .options
                .and_then(|o| o.visible_to_all)
                .unwrap_or(false),
        }
    }

    pub fn from_plugin(id: String, info: PluginInfo) -> Self {
        ListEntry::Plugin {
            id: if info.id.is_empty() { id } else { info.id },
            version: info.version,
            index_url: info.index_url,
            disabled: info.disabled.unwrap_or(false),
        }
    }

    pub fn from_branch(info: BranchInfo) -> Self {
        ListEntry::Branch {
            ref_name: info.ref_name,
            revision: info.revision,
        }
    }

    pub fn from_tag(info: TagInfo) -> Self {
        let created = info
            .created
            .as_deref()
            .or_else(|| info.tagger.as_ref().and_then(|t| t.date.as_deref()))
            .and_then(parse_timestamp);
        ListEntry::Tag {
            ref_name: info.ref_name,
            revision: info.object.or(info.revision),
            message: info.message,
            created,
        }
    }

    pub fn from_dashboard(info: DashboardInfo) -> Self {
        let inherited_from = match (&info.project, info.defining_project) {
            (Some(project), Some(defining)) if *project != defining => Some(defining),
            _ => None,
        };
        ListEntry::Dashboard {
            id: info.id,
            title: info.title.filter(|t| !t.is_empty()),
            description: info.description.filter(|d| !d.is_empty()),
            inherited_from,
            is_default: info.is_default,
            url: info.url,
        }
    }

    pub fn from_doc(doc: DocResult) -> Self {
        ListEntry::Doc {
            title: doc.title,
            url: doc.url,
        }
    }

    /// Primary column: the name a user filters on.
    pub fn label(&self) -> &str {
        match self {
            ListEntry::Repo { name, .. } | ListEntry::Group { name, .. } => name,
            ListEntry::Plugin { id, .. } => id,
            ListEntry::Branch { ref_name, .. } => short_ref(ref_name, "refs/heads/"),
            ListEntry::Tag { ref_name, .. } => short_ref(ref_name, "refs/tags/"),
            ListEntry::Dashboard { title, id, .. } => title.as_deref().unwrap_or(id),
            ListEntry::Doc { title, .. } => title,
        }
    }

    /// Secondary column.
    pub fn detail(&self) -> String {
        match self {
            ListEntry::Repo {
                description, state, ..
            } => match (state, description) {
                (Some(state), _) if *state != ProjectState::Active => format!(
                    "[{}] {}",
                    state,
                    description.as_deref().unwrap_or_default()
                ),
                _ => description.clone().unwrap_or_default(),
            },
            ListEntry::Group {
                owner, description, ..
            } => match (owner, description) {
                (Some(owner), Some(desc)) => format!("{} (owner: {})", desc, owner),
                (Some(owner), None) => format!("owner: {}", owner),
                (None, desc) => desc.clone().unwrap_or_default(),
            },
            ListEntry::Plugin {
                version, disabled, ..
            } => {
                let version = version.as_deref().unwrap_or("");
                if *disabled {
                    format!("{} (disabled)", version)
                } else {
                    version.to_string()
                }
            }
            ListEntry::Branch { revision, .. } => short_sha(revision.as_deref()),
            ListEntry::Tag {
                revision,
                message,
                created,
                ..
            } => {
                let mut parts = vec![short_sha(revision.as_deref())];
                if let Some(created) = created {
                    parts.push(created.format("%Y-%m-%d").to_string());
                }
                if let Some(line) = message.as_deref().and_then(|m| m.lines().next()) {
                    parts.push(line.to_string());
                }
                parts.retain(|p| !p.is_empty());
                parts.join("  ")
            }
            ListEntry::Dashboard {
                id,
                title,
                description,
                inherited_from,
                is_default,
                ..
            } => {
                let mut parts = Vec::new();
                if title.is_some() {
                    parts.push(id.clone());
                }
                if let Some(desc) = description {
                    parts.push(desc.clone());
                }
                if *is_default {
                    parts.push("(default)".to_string());
                }
                if let Some(project) = inherited_from {
                    parts.push(format!("inherited from {}", project));
                }
                parts.join("  ")
            }
            ListEntry::Doc { url, .. } => url.clone(),
        }
    }
}

fn short_ref<'a>(ref_name: &'a str, prefix: &str) -> &'a str {
    ref_name.strip_prefix(prefix).unwrap_or(ref_name)
}

fn short_sha(revision: Option<&str>) -> String {
    revision
        .map(|r| r.chars().take(7).collect())
        .unwrap_or_default()
}
