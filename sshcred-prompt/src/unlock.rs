use std::path::{Path, PathBuf};

use sshcred_core::config::PromptConfig;
use sshcred_core::{KeyError, KeyErrorKind, KeyPair, SigningIdentity};
use tracing::{debug, warn};

use crate::template::{PromptContext, render_template};
use crate::{PromptError, Prompter};

/// How [`unlock_signer`] asks for passwords.
#[derive(Debug, Clone)]
pub struct UnlockOptions {
    /// Question template; see [`render_template`].
    pub question: String,
    /// Passwords tried before giving up.  Zero is treated as one.
    pub attempts: u32,
}

impl Default for UnlockOptions {
    fn default() -> Self {
        PromptConfig::default().into()
    }
}

impl From<PromptConfig> for UnlockOptions {
    fn from(config: PromptConfig) -> Self {
        Self {
            question: config.question,
            attempts: config.attempts,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UnlockError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("password prompt for {path:?} failed: {source}")]
    Prompt {
        path: PathBuf,
        #[source]
        source: PromptError,
    },
}

/// Load the key at `path`, asking `prompter` for a password if it is
/// encrypted.
///
/// The key is first tried without a password.  Only a missing password leads
/// to a prompt; a wrong one is asked for again until `options.attempts` runs
/// out.  Every other failure is returned as soon as it happens.
pub fn unlock_signer<P: Prompter + ?Sized>(
    path: &Path,
    prompter: &mut P,
    options: &UnlockOptions,
) -> Result<SigningIdentity, UnlockError> {
    match KeyPair::key(path).signer() {
        Ok(identity) => return Ok(identity),
        Err(e) if matches!(e.kind(), KeyErrorKind::NoPasswordSupplied) => {
            debug!(path = %path.display(), "key is encrypted, prompting for password");
        }
        Err(e) => return Err(e.into()),
    }

    let question = render_template(&options.question, &PromptContext::for_key(path));
    let attempts = options.attempts.max(1);

    let mut attempt = 1;
    loop {
        let password = prompter
            .prompt(&question, false)
            .map_err(|source| UnlockError::Prompt {
                path: path.to_path_buf(),
                source,
            })?;

        match KeyPair::encrypted_key(path, password.as_bytes()).signer() {
            Ok(identity) => return Ok(identity),
            Err(e) if matches!(e.kind(), KeyErrorKind::DecryptionFailed) && attempt < attempts => {
                warn!(
                    path = %path.display(),
                    attempt,
                    attempts,
                    "incorrect password"
                );
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
