use std::fmt;
use std::path::PathBuf;

use crate::config::{config_dir, ServerConfig};

/// Username and HTTP password for Gerrit's authenticated `/a/` endpoints.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Try to run a CLI command and capture stdout as a password
fn try_cli_password(command: &str) -> Option<String> {
    let output = std::process::Command::new("sh")
        .args(["-c", command])
        .output()
        .ok()?;

    if output.status.success() {
        let password = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !password.is_empty() {
            return Some(password);
        }
    }
    None
}

/// Passwords remembered per server, one file each.
#[derive(Debug, Clone)]
pub struct PasswordStore {
    dir: PathBuf,
}

impl PasswordStore {
    /// `~/.config/gerrit-lists/passwords`
    pub fn open() -> Option<Self> {
        Some(Self::at(config_dir()?.join("passwords")))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, server_name: &str) -> PathBuf {
        self.dir.join(server_name)
    }

    fn load(&self, server_name: &str) -> Option<String> {
        let password = std::fs::read_to_string(self.path(server_name)).ok()?;
        let password = password.trim().to_string();
        if password.is_empty() {
            None
        } else {
            Some(password)
        }
    }

    fn save(&self, server_name: &str, password: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(server_name), password)
    }
}

/// Credentials for `server` using the default password store.
pub fn load_credentials(server: &ServerConfig) -> Option<Credentials> {
    resolve_credentials(server, PasswordStore::open().as_ref())
}

/// Resolve credentials for a server, trying:
/// 1. `password_env`
/// 2. the password stored for the server
/// 3. `password_command` (stored for next time)
///
/// Returns `None` (anonymous access) when no username is configured or no
/// password could be found.
pub fn resolve_credentials(server: &ServerConfig, store: Option<&PasswordStore>) -> Option<Credentials> {
    let username = server.username.clone().filter(|u| !u.is_empty())?;

    let password = password_from_env(server)
        .or_else(|| store?.load(&server.name))
        .or_else(|| {
            let password = try_cli_password(server.password_command.as_deref()?)?;
            if let Some(store) = store {
                if let Err(err) = store.save(&server.name, &password) {
                    tracing::warn!(server = %server.name, %err, "could not store password");
                }
            }
            Some(password)
        });

    match password {
        Some(password) => Some(Credentials { username, password }),
        None => {
            tracing::warn!(
                server = %server.name,
                "no HTTP password found, continuing anonymously"
            );
            None
        }
    }
}

fn password_from_env(server: &ServerConfig) -> Option<String> {
    let var = server.password_env.as_deref()?;
    std::env::var(var).ok().filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(username: Option<&str>) -> ServerConfig {
        ServerConfig {
            name: "auth-test-server-that-has-no-stored-password".to_string(),
            url: "https://review.example.com".to_string(),
            username: username.map(str::to_string),
            password_env: Some("GERRIT_LISTS_TEST_PASSWORD_UNSET".to_string()),
            password_command: None,
        }
    }

    #[test]
    fn no_username_means_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let store = PasswordStore::at(dir.path());
        assert!(resolve_credentials(&server(None), Some(&store)).is_none());
        assert!(resolve_credentials(&server(Some("")), Some(&store)).is_none());
    }

    #[test]
    fn password_command_supplies_and_stores_password() {
        let dir = tempfile::tempdir().unwrap();
        let store = PasswordStore::at(dir.path().join("passwords"));
        let mut cfg = server(Some("jdoe"));
        cfg.password_command = Some("echo s3cret".to_string());

        let creds = resolve_credentials(&cfg, Some(&store)).unwrap();
        assert_eq!(creds.username, "jdoe");
        assert_eq!(creds.password, "s3cret");
        assert_eq!(store.load(&cfg.name).as_deref(), Some("s3cret"));

        // the stored copy wins over the command next time
        cfg.password_command = Some("echo changed".to_string());
        let creds = resolve_credentials(&cfg, Some(&store)).unwrap();
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn missing_password_is_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let store = PasswordStore::at(dir.path());
        assert!(resolve_credentials(&server(Some("jdoe")), Some(&store)).is_none());
    }

    #[test]
    fn blank_stored_password_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = PasswordStore::at(dir.path());
        let cfg = server(Some("jdoe"));
        store.save(&cfg.name, "  \n").unwrap();
        assert_eq!(store.load(&cfg.name), None);
    }

    #[test]
    fn debug_hides_password() {
        let creds = Credentials {
            username: "jdoe".to_string(),
            password: "hunter2".to_string(),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("jdoe"));
        assert!(!shown.contains("hunter2"));
    }
}
