use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ITEMS_PER_PAGE: u32 = 25;
pub const DEFAULT_FILTER_DEBOUNCE_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub url: String,
    pub username: Option<String>,
    pub password_env: Option<String>,
    pub password_command: Option<String>,
}

impl ServerConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub fn host(&self) -> Option<String> {
        extract_host(&self.url)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub default_server: Option<String>,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,
    #[serde(default = "default_filter_debounce_ms")]
    pub filter_debounce_ms: u64,
}

fn default_items_per_page() -> u32 {
    DEFAULT_ITEMS_PER_PAGE
}

fn default_filter_debounce_ms() -> u64 {
    DEFAULT_FILTER_DEBOUNCE_MS
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_server: None,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            filter_debounce_ms: DEFAULT_FILTER_DEBOUNCE_MS,
        }
    }
}

impl GeneralConfig {
    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            servers: vec![ServerConfig {
                name: "gerrit-review".to_string(),
                url: "https://gerrit-review.googlesource.com".to_string(),
                username: None,
                password_env: None,
                password_command: None,
            }],
        }
    }
}

pub fn config_dir() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("gerrit-lists"))
}

fn config_path() -> Option<PathBuf> {
    Some(config_dir()?.join("config.toml"))
}

impl Config {
    /// Load from `path`, or from the default location. Falls back to the
    /// default config when the file is missing or unreadable.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(config_path) else {
            return Config::default();
        };

        let Ok(content) = std::fs::read_to_string(&path) else {
            return Config::default();
        };

        Self::parse(&content).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), %err, "ignoring invalid config");
            Config::default()
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config = toml::from_str::<Config>(content)?;
        if config.servers.is_empty() {
            config.servers = Config::default().servers;
        }
        if config.general.items_per_page == 0 {
            config.general.items_per_page = DEFAULT_ITEMS_PER_PAGE;
        }
        Ok(config)
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Pick the server to start with: explicit name, git remote, configured
    /// default, then the first entry.
    pub fn select_server(&self, requested: Option<&str>) -> Option<&ServerConfig> {
        if let Some(name) = requested {
            return self.server(name);
        }
        detect_server(self)
            .or_else(|| {
                self.general
                    .default_server
                    .as_deref()
                    .and_then(|name| self.server(name))
            })
            .or_else(|| self.servers.first())
    }
}

/// Detect which server to use based on the current git remote origin.
pub fn detect_server(config: &Config) -> Option<&ServerConfig> {
    let output = std::process::Command::new("git")
        .args(["remote", "get-url", "origin"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let host = extract_host(&url)?;

    config
        .servers
        .iter()
        .find(|s| s.host().as_deref() == Some(host.as_str()))
}

/// Extract hostname from SSH (user@host:...), ssh:// and http(s):// URLs
fn extract_host(url: &str) -> Option<String> {
    if url.starts_with("https://") || url.starts_with("http://") || url.starts_with("ssh://") {
        // Gerrit SSH remotes carry a port: ssh://user@host:29418/project
        let without_scheme = url.split("://").nth(1)?;
        let authority = without_scheme.split('/').next()?;
        let after_at = authority.split('@').next_back()?;
        let host = after_at.split(':').next()?;
        if host.is_empty() {
            return None;
        }
        Some(host.to_string())
    } else if let Some((user_host, _)) = url.split_once(':') {
        // scp-like: user@host:project
        let host = user_host.split('@').next_back()?;
        if host.is_empty() || !user_host.contains('@') {
            return None;
        }
        Some(host.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_config() {
        let toml_str = r#"
[general]
default_server = "work"
items_per_page = 50

[[servers]]
name = "public"
url = "https://gerrit-review.googlesource.com/"

[[servers]]
name = "work"
url = "https://review.company.com"
username = "jdoe"
password_env = "GERRIT_HTTP_PASSWORD"
password_command = "pass show gerrit"
"#;
        let config = Config::parse(toml_str).unwrap();
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.general.items_per_page, 50);
        assert_eq!(config.general.filter_debounce_ms, 200);
        assert_eq!(
            config.servers[0].base_url(),
            "https://gerrit-review.googlesource.com"
        );
        assert_eq!(config.servers[1].username.as_deref(), Some("jdoe"));
        assert_eq!(
            config.server("work").map(|s| s.url.as_str()),
            Some("https://review.company.com")
        );
    }

    #[test]
    fn empty_server_list_uses_default() {
        let config = Config::parse("[general]\nitems_per_page = 0\n").unwrap();
        assert_eq!(config.servers, Config::default().servers);
        assert_eq!(config.general.items_per_page, DEFAULT_ITEMS_PER_PAGE);
    }

    #[test]
    fn missing_file_uses_default() {
        let config = Config::load(Some(Path::new("/nonexistent/gerrit-lists.toml")));
        assert_eq!(config.servers[0].name, "gerrit-review");
        assert_eq!(
            config.general.filter_debounce(),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn explicit_server_wins() {
        let config = Config::parse(
            r#"
[[servers]]
name = "a"
url = "https://a.example.com"

[[servers]]
name = "b"
url = "https://b.example.com"
"#,
        )
        .unwrap();
        assert_eq!(config.select_server(Some("b")).map(|s| s.name.as_str()), Some("b"));
        assert!(config.select_server(Some("missing")).is_none());
    }

    #[test]
    fn extract_host_https() {
        assert_eq!(
            extract_host("https://review.example.com/a/project"),
            Some("review.example.com".to_string())
        );
    }

    #[test]
    fn extract_host_ssh_scheme_with_port() {
        assert_eq!(
            extract_host("ssh://jdoe@review.example.com:29418/project"),
            Some("review.example.com".to_string())
        );
    }

    #[test]
    fn extract_host_scp_like() {
        assert_eq!(
            extract_host("jdoe@review.example.com:project.git"),
            Some("review.example.com".to_string())
        );
    }

    #[test]
    fn extract_host_invalid() {
        assert_eq!(extract_host("not-a-url"), None);
        assert_eq!(extract_host("c:/windows/path"), None);
    }
}
