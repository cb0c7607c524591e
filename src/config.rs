//! Configuration: flat `key=value` files and the typed views built on them.
//!
//! Two files live next to the installed binary:
//! - `email_config.ini`: `imap_server`, `imap_username`, `imap_password`
//! - `github_config.ini`: `token`, `username`, `repo`
//!
//! A missing or unreadable file is an empty map, not an error. Required keys
//! are checked when the typed views are built.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use tracing::{debug, warn};

use crate::error::{self, ConfigError};

/// File name of the mailbox configuration.
pub const MAILBOX_CONFIG_FILE: &str = "email_config.ini";

/// Environment variable naming the directory of both config files.
pub const CONFIG_DIR_VAR: &str = "ISSUE_BOT_CONFIG_DIR";

/// Environment variable enabling a non-zero exit status on failed runs.
pub const STRICT_EXIT_VAR: &str = "ISSUE_BOT_STRICT_EXIT";

/// File name of the issue tracker configuration.
pub const TRACKER_CONFIG_FILE: &str = "github_config.ini";

/// Default implicit-TLS IMAP port.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Folder polled when `imap_folder` is not set.
pub const DEFAULT_IMAP_FOLDER: &str = "Inbox";

/// Tracker API base used when `api_url` is not set.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Socket timeout for the IMAP session.
pub const IMAP_TIMEOUT: Duration = Duration::from_secs(30);

/// Total request timeout for tracker calls.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for tracker calls.
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── Raw key/value map ───────────────────────────────────────────────

/// Immutable string → string mapping read from a `key=value` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    entries: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Parse `key=value` lines.
    ///
    /// Splits on the first `=`; key and value are trimmed. Blank lines are
    /// ignored, lines without `=` or with an empty key are skipped with a
    /// warning. A repeated key keeps its last value.
    pub fn parse(content: &str) -> Self {
        let mut entries = BTreeMap::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!(line = lineno + 1, "Skipping config line without '='");
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                warn!(line = lineno + 1, "Skipping config line with empty key");
                continue;
            }
            entries.insert(key.to_string(), value.trim().to_string());
        }
        Self { entries }
    }

    /// Load a config file. Missing or unreadable files yield an empty map.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let map = Self::parse(&content);
                debug!(path = %path.display(), keys = map.len(), "Loaded config file");
                map
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config file unavailable, using empty configuration");
                Self::default()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up a key that has no default.
    pub fn require(&self, key: &str, hint: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ── Typed views ─────────────────────────────────────────────────────

/// Mailbox access settings.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub folder: String,
}

impl MailboxConfig {
    pub fn from_map(map: &ConfigMap) -> Result<Self, ConfigError> {
        let hint = format!("Set it in {MAILBOX_CONFIG_FILE}");
        let port = match map.get("imap_port") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "imap_port".into(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => DEFAULT_IMAP_PORT,
        };

        Ok(Self {
            server: map.require("imap_server", &hint)?.to_string(),
            port,
            username: map.require("imap_username", &hint)?.to_string(),
            password: SecretString::from(map.require("imap_password", &hint)?.to_string()),
            folder: map
                .get("imap_folder")
                .unwrap_or(DEFAULT_IMAP_FOLDER)
                .to_string(),
        })
    }
}

/// Issue tracker settings.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub token: SecretString,
    pub username: String,
    pub repo: String,
    pub api_url: String,
}

impl TrackerConfig {
    pub fn from_map(map: &ConfigMap) -> Result<Self, ConfigError> {
        let hint = format!("Set it in {TRACKER_CONFIG_FILE}");
        Ok(Self {
            token: SecretString::from(map.require("token", &hint)?.to_string()),
            username: map.require("username", &hint)?.to_string(),
            repo: map.require("repo", &hint)?.to_string(),
            api_url: map.get("api_url").unwrap_or(DEFAULT_API_URL).to_string(),
        })
    }

    /// `owner/repo` label used in logs and errors.
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.username, self.repo)
    }
}

// ── Providers ───────────────────────────────────────────────────────

/// Source of the two configuration maps for a pipeline run.
pub trait ConfigProvider: Send + Sync {
    fn mailbox_config(&self) -> ConfigMap;
    fn tracker_config(&self) -> ConfigMap;
}

/// Reads both config files from one directory.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    dir: PathBuf,
}

impl FileConfigProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory from `ISSUE_BOT_CONFIG_DIR`, else the executable's directory.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(CONFIG_DIR_VAR).filter(|d| !d.trim().is_empty()) {
            return Self::new(dir);
        }
        let dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| {
                warn!("Could not resolve executable directory, reading config from cwd");
                PathBuf::from(".")
            });
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ConfigProvider for FileConfigProvider {
    fn mailbox_config(&self) -> ConfigMap {
        ConfigMap::load(&self.dir.join(MAILBOX_CONFIG_FILE))
    }

    fn tracker_config(&self) -> ConfigMap {
        ConfigMap::load(&self.dir.join(TRACKER_CONFIG_FILE))
    }
}

/// Process-level settings.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    /// Exit non-zero when any step of the run failed.
    pub strict_exit: bool,
}

impl RunSettings {
    /// Build from `ISSUE_BOT_STRICT_EXIT`. Unset means off; a value that is
    /// not a recognizable boolean is rejected.
    pub fn from_env() -> error::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> error::Result<Self> {
        let strict_exit = match lookup(STRICT_EXIT_VAR) {
            None => false,
            Some(raw) => parse_flag(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: STRICT_EXIT_VAR.into(),
                message: format!("{raw:?} is not a boolean"),
            })?,
        };
        Ok(Self { strict_exit })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    fn mailbox_map() -> ConfigMap {
        [
            ("imap_server", "imap.example.com"),
            ("imap_username", "bot@example.com"),
            ("imap_password", "hunter2"),
        ]
        .into_iter()
        .collect()
    }

    fn tracker_map() -> ConfigMap {
        [("token", "ghp_abc"), ("username", "octo"), ("repo", "widgets")]
            .into_iter()
            .collect()
    }

    // ── Parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_reads_exact_pairs_trimmed() {
        let map = ConfigMap::parse("token = abc \n  username=octo\nrepo=  widgets\n");
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("token"), Some("abc"));
        assert_eq!(map.get("username"), Some("octo"));
        assert_eq!(map.get("repo"), Some("widgets"));
    }

    #[test]
    fn parse_splits_on_first_equals() {
        let map = ConfigMap::parse("imap_password=a=b=c");
        assert_eq!(map.get("imap_password"), Some("a=b=c"));
    }

    #[test]
    fn parse_skips_blank_and_malformed_lines() {
        let map = ConfigMap::parse("\nno_equals_here\n=orphan\nkey=value\n\n");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("key"), Some("value"));
    }

    #[test]
    fn parse_last_duplicate_wins() {
        let map = ConfigMap::parse("repo=one\nrepo=two");
        assert_eq!(map.get("repo"), Some("two"));
    }

    #[test]
    fn parse_handles_crlf() {
        let map = ConfigMap::parse("token=abc\r\nrepo=widgets\r\n");
        assert_eq!(map.get("token"), Some("abc"));
        assert_eq!(map.get("repo"), Some("widgets"));
    }

    #[test]
    fn load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("github_config.ini");
        std::fs::write(&path, "token=abc\nusername=octo\nrepo=widgets\n").unwrap();

        let map = ConfigMap::load(&path);
        let pairs: Vec<_> = map.iter().collect();
        assert_eq!(
            pairs,
            vec![("repo", "widgets"), ("token", "abc"), ("username", "octo")]
        );
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let map = ConfigMap::load(&dir.path().join("nope.ini"));
        assert!(map.is_empty());
    }

    #[test]
    fn load_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigMap::load(dir.path()).is_empty());
    }

    // ── Typed views ─────────────────────────────────────────────────

    #[test]
    fn mailbox_config_defaults() {
        let cfg = MailboxConfig::from_map(&mailbox_map()).unwrap();
        assert_eq!(cfg.server, "imap.example.com");
        assert_eq!(cfg.port, DEFAULT_IMAP_PORT);
        assert_eq!(cfg.username, "bot@example.com");
        assert_eq!(cfg.password.expose_secret(), "hunter2");
        assert_eq!(cfg.folder, "Inbox");
    }

    #[test]
    fn mailbox_config_optional_overrides() {
        let base = mailbox_map();
        let mut pairs: Vec<(&str, &str)> = base.iter().collect();
        pairs.push(("imap_port", "1993"));
        pairs.push(("imap_folder", "Support"));
        let map: ConfigMap = pairs.into_iter().collect();

        let cfg = MailboxConfig::from_map(&map).unwrap();
        assert_eq!(cfg.port, 1993);
        assert_eq!(cfg.folder, "Support");
    }

    #[test]
    fn mailbox_config_bad_port() {
        let base = mailbox_map();
        let mut pairs: Vec<(&str, &str)> = base.iter().collect();
        pairs.push(("imap_port", "imaps"));
        let map: ConfigMap = pairs.into_iter().collect();

        let err = MailboxConfig::from_map(&map).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "imap_port"));
    }

    #[test]
    fn mailbox_config_missing_key() {
        let err = MailboxConfig::from_map(&ConfigMap::default()).unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "imap_server")
        );
        assert!(err.to_string().contains(MAILBOX_CONFIG_FILE));
    }

    #[test]
    fn mailbox_config_debug_redacts_password() {
        let cfg = MailboxConfig::from_map(&mailbox_map()).unwrap();
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }

    #[test]
    fn tracker_config_from_map() {
        let cfg = TrackerConfig::from_map(&tracker_map()).unwrap();
        assert_eq!(cfg.token.expose_secret(), "ghp_abc");
        assert_eq!(cfg.repo_slug(), "octo/widgets");
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn tracker_config_missing_repo() {
        let map: ConfigMap = [("token", "t"), ("username", "octo")].into_iter().collect();
        let err = TrackerConfig::from_map(&map).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "repo"));
    }

    // ── Provider ────────────────────────────────────────────────────

    #[test]
    fn file_provider_reads_both_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(MAILBOX_CONFIG_FILE),
            "imap_server=imap.example.com\nimap_username=bot\nimap_password=pw\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(TRACKER_CONFIG_FILE),
            "token=t\nusername=octo\nrepo=widgets\n",
        )
        .unwrap();

        let provider = FileConfigProvider::new(dir.path());
        assert_eq!(provider.mailbox_config().len(), 3);
        assert_eq!(provider.tracker_config().get("repo"), Some("widgets"));
    }

    #[test]
    fn file_provider_missing_files_are_empty() {
        let dir = TempDir::new().unwrap();
        let provider = FileConfigProvider::new(dir.path());
        assert!(provider.mailbox_config().is_empty());
        assert!(provider.tracker_config().is_empty());
    }

    #[test]
    fn file_provider_uses_config_dir_override() {
        let provider = FileConfigProvider::from_lookup(|key| {
            (key == CONFIG_DIR_VAR).then(|| "/etc/issue-bot".to_string())
        });
        assert_eq!(provider.dir(), Path::new("/etc/issue-bot"));
    }

    #[test]
    fn file_provider_defaults_to_executable_dir() {
        let exe_dir = std::env::current_exe()
            .unwrap()
            .parent()
            .unwrap()
            .to_path_buf();
        assert_eq!(FileConfigProvider::from_lookup(|_| None).dir(), exe_dir);

        let blank = FileConfigProvider::from_lookup(|_| Some("  ".to_string()));
        assert_eq!(blank.dir(), exe_dir);
    }

    // ── Run settings ────────────────────────────────────────────────

    #[test]
    fn parse_flag_values() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("yes"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("sometimes"), None);
    }

    #[test]
    fn strict_exit_off_when_unset() {
        let settings = RunSettings::from_lookup(|_| None).unwrap();
        assert!(!settings.strict_exit);
    }

    #[test]
    fn strict_exit_from_variable() {
        let settings = RunSettings::from_lookup(|key| {
            (key == STRICT_EXIT_VAR).then(|| "true".to_string())
        })
        .unwrap();
        assert!(settings.strict_exit);
    }

    #[test]
    fn strict_exit_rejects_unknown_value() {
        let err = RunSettings::from_lookup(|_| Some("maybe".to_string())).unwrap_err();
        assert!(matches!(
            err,
            error::Error::Config(ConfigError::InvalidValue { ref key, .. })
                if key == STRICT_EXIT_VAR
        ));
    }
}
