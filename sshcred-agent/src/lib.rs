//! Client side of the SSH agent protocol.
//!
//! ```text
//! SigningIdentity ──► AgentClient::add_identity ──► $SSH_AUTH_SOCK ──► ssh-agent
//! ```
//!
//! The connection is a plain blocking Unix socket; every call is one
//! request/response round trip.

use std::path::{Path, PathBuf};

use ssh_agent_client_rs::{Client, Identity};
use ssh_key::{PublicKey, Signature};
use sshcred_core::SigningIdentity;
use tracing::debug;

/// Environment variable naming the agent socket.
pub const SSH_AUTH_SOCK: &str = "SSH_AUTH_SOCK";

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("SSH_AUTH_SOCK is not set")]
    SocketUnset,

    #[error("failed to connect to SSH agent at {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: ssh_agent_client_rs::Error,
    },

    #[error("SSH agent request failed: {0}")]
    Request(#[from] ssh_agent_client_rs::Error),
}

/// Connect to the agent listening on `path`.
pub fn agent_with_socket(path: impl AsRef<Path>) -> Result<AgentClient, AgentError> {
    let path = path.as_ref();
    let client = Client::connect(path).map_err(|source| AgentError::Connect {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(socket = %path.display(), "connected to SSH agent");
    Ok(AgentClient {
        client,
        socket: path.to_path_buf(),
    })
}

/// Connect to the agent named by `SSH_AUTH_SOCK`.
pub fn std_agent() -> Result<AgentClient, AgentError> {
    let socket = std::env::var_os(SSH_AUTH_SOCK)
        .filter(|s| !s.is_empty())
        .ok_or(AgentError::SocketUnset)?;
    agent_with_socket(PathBuf::from(socket))
}

/// An open agent connection.
pub struct AgentClient {
    client: Client,
    socket: PathBuf,
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("socket", &self.socket)
            .finish_non_exhaustive()
    }
}

impl AgentClient {
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Hand `identity` to the agent.  The agent keeps its own copy; the
    /// comment shown by `ssh-add -l` is the identity's comment.
    pub fn add_identity(&mut self, identity: &SigningIdentity) -> Result<(), AgentError> {
        debug!(
            fingerprint = %identity.fingerprint(),
            comment = identity.comment(),
            "adding identity to SSH agent"
        );
        self.client.add_identity(identity.private_key())?;
        Ok(())
    }

    /// Plain keys held by the agent.  Certificates are skipped.
    pub fn list_identities(&mut self) -> Result<Vec<PublicKey>, AgentError> {
        let keys: Vec<PublicKey> = self
            .client
            .list_all_identities()?
            .into_iter()
            .filter_map(|identity| match identity {
                Identity::PublicKey(key) => Some((*key).into_owned()),
                Identity::Certificate(_) => None,
            })
            .collect();
        debug!(count = keys.len(), "listed SSH agent identities");
        Ok(keys)
    }

    /// Ask the agent to sign `data` with the key matching `public_key`.
    pub fn sign(&mut self, public_key: &PublicKey, data: &[u8]) -> Result<Signature, AgentError> {
        Ok(self.client.sign(public_key, data)?)
    }
}

/// Serializes tests that modify `SSH_AUTH_SOCK`.
#[cfg(test)]
pub(crate) static TEST_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixListener;

    use super::*;

    #[test]
    fn connects_to_listening_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        let agent = agent_with_socket(&path).unwrap();
        assert_eq!(agent.socket(), path);
    }

    #[test]
    fn missing_socket_is_a_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nobody-home.sock");

        let err = agent_with_socket(&path).unwrap_err();
        assert!(matches!(err, AgentError::Connect { .. }), "{err:?}");
        assert!(err.to_string().contains("nobody-home.sock"));
    }

    #[test]
    fn std_agent_uses_env() {
        let _guard = TEST_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        let saved = std::env::var_os(SSH_AUTH_SOCK);
        // SAFETY: env access is serialized by TEST_ENV_MUTEX.
        unsafe { std::env::set_var(SSH_AUTH_SOCK, &path) };
        let result = std_agent();
        match saved {
            Some(v) => unsafe { std::env::set_var(SSH_AUTH_SOCK, v) },
            None => unsafe { std::env::remove_var(SSH_AUTH_SOCK) },
        }

        assert_eq!(result.unwrap().socket(), path);
    }

    #[test]
    fn std_agent_without_env_fails() {
        let _guard = TEST_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let saved = std::env::var_os(SSH_AUTH_SOCK);
        // SAFETY: env access is serialized by TEST_ENV_MUTEX.
        unsafe { std::env::remove_var(SSH_AUTH_SOCK) };
        let result = std_agent();
        if let Some(v) = saved {
            unsafe { std::env::set_var(SSH_AUTH_SOCK, v) };
        }

        assert!(matches!(result, Err(AgentError::SocketUnset)));
    }
}
