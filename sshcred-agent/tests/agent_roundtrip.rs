//! Add a loaded key to an in-process agent, list it back and sign with it.
//!
//! The agent side is a minimal `ssh_agent_lib` session holding keys in
//! memory; the client side is the blocking `AgentClient`.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use signature::{Signer as _, Verifier};
use ssh_agent_lib::agent::{Session, listen};
use ssh_agent_lib::error::AgentError;
use ssh_agent_lib::proto::{AddIdentity, Credential, Identity, SignRequest};
use ssh_key::{HashAlg, PrivateKey, Signature};
use sshcred_agent::agent_with_socket;
use sshcred_core::KeyPair;

#[derive(Clone, Debug, Default)]
struct MemoryAgent {
    keys: Arc<RwLock<Vec<PrivateKey>>>,
}

fn other_err(msg: impl Into<String>) -> AgentError {
    AgentError::other(io::Error::other(msg.into()))
}

#[ssh_agent_lib::async_trait]
impl Session for MemoryAgent {
    async fn request_identities(&mut self) -> Result<Vec<Identity>, AgentError> {
        let keys = self
            .keys
            .read()
            .map_err(|_| other_err("key list lock poisoned"))?;
        Ok(keys
            .iter()
            .map(|key| Identity {
                pubkey: key.public_key().key_data().clone(),
                comment: key.comment().to_string(),
            })
            .collect())
    }

    async fn add_identity(&mut self, identity: AddIdentity) -> Result<(), AgentError> {
        let Credential::Key { privkey, comment } = identity.credential else {
            return Err(other_err("certificates are not supported"));
        };
        let key = PrivateKey::new(privkey, comment).map_err(AgentError::other)?;
        self.keys
            .write()
            .map_err(|_| other_err("key list lock poisoned"))?
            .push(key);
        Ok(())
    }

    async fn sign(&mut self, request: SignRequest) -> Result<Signature, AgentError> {
        let fingerprint = request.pubkey.fingerprint(HashAlg::Sha256);
        let keys = self
            .keys
            .read()
            .map_err(|_| other_err("key list lock poisoned"))?;
        let key = keys
            .iter()
            .find(|k| k.public_key().fingerprint(HashAlg::Sha256) == fingerprint)
            .ok_or_else(|| other_err("key not found"))?;
        key.try_sign(&request.data)
            .map_err(|e| other_err(format!("signing failed: {e}")))
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("sshcred-core")
        .join("testdata")
        .join("keys")
        .join(name)
}

#[tokio::test(flavor = "multi_thread")]
async fn add_list_and_sign() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("agent.sock");
    let listener = tokio::net::UnixListener::bind(&socket).unwrap();
    let server = tokio::spawn(listen(listener, MemoryAgent::default()));

    let key_path = fixture("ecdsa_enc");
    let (listed, signature, public) = tokio::task::spawn_blocking(move || {
        let identity = KeyPair::encrypted_key(&key_path, "hunter2")
            .signer()
            .unwrap();
        let mut agent = agent_with_socket(&socket).unwrap();

        assert!(agent.list_identities().unwrap().is_empty());
        agent.add_identity(&identity).unwrap();

        let listed = agent.list_identities().unwrap();
        let signature = agent.sign(identity.public_key(), b"challenge").unwrap();
        (listed, signature, identity.public_key().clone())
    })
    .await
    .unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key_data(), public.key_data());
    assert!(Verifier::verify(&public, b"challenge", &signature).is_ok());

    server.abort();
}
