//! TOML configuration.
//!
//! ```toml
//! [keys]
//! default = ["id_ed25519", "/srv/deploy/id_rsa"]
//!
//! [prompt]
//! question = "Enter passphrase for {{path}}: "
//! attempts = 3
//!
//! [agent]
//! socket = "/run/user/1000/ssh-agent.sock"
//! ```
//!
//! Every field has a default, so an empty or missing file is valid.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::keypair::ssh_dir;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Keys used when a command is given none.  Bare names are looked up in
    /// `~/.ssh`; anything with a path separator is used as written.
    #[serde(default)]
    pub default: Vec<String>,
}

impl KeysConfig {
    pub fn resolve(&self) -> Vec<PathBuf> {
        self.default.iter().map(|k| resolve_key_path(k)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Question shown when a key needs a password.  `{{path}}` and
    /// `{{name}}` are substituted.
    #[serde(default = "default_question")]
    pub question: String,
    /// How many passwords to try before giving up.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            question: default_question(),
            attempts: default_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent socket; overrides `SSH_AUTH_SOCK` when set.
    #[serde(default)]
    pub socket: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Load `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            match std::fs::metadata(path) {
                Ok(meta) if meta.mode() & 0o077 != 0 => {
                    warn!(
                        path = %path.display(),
                        mode = format!("{:o}", meta.mode() & 0o777),
                        "config file is readable by group or others"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("could not check config file permissions: {e}"),
            }
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `$XDG_CONFIG_HOME/sshcred/config.toml`, else `~/.config/sshcred/config.toml`.
pub fn default_config_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| {
            warn!("neither XDG_CONFIG_HOME nor a home directory is available; using current directory for config");
            PathBuf::from(".")
        });
    base.join("sshcred").join("config.toml")
}

/// Interpret a key argument: `~/...` expands to the home directory, anything
/// else containing a path separator is taken literally, and a bare name is
/// resolved inside `~/.ssh`.
pub fn resolve_key_path(key: &str) -> PathBuf {
    if let Some(rest) = key.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    if key.contains(std::path::MAIN_SEPARATOR) || key.contains('/') {
        return PathBuf::from(key);
    }
    ssh_dir(key)
}

fn default_question() -> String {
    "Enter passphrase for {{path}}: ".to_string()
}

fn default_attempts() -> u32 {
    3
}
