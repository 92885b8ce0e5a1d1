//! Signing identities.
//!
//! A [`SigningIdentity`] owns a decrypted [`ssh_key::PrivateKey`] and exposes
//! the public half plus a sign operation.  The signature scheme follows from
//! the key type (RSA signs with `rsa-sha2-512`, DSA with SHA-1, ECDSA with the
//! curve's hash, Ed25519 natively); there is nothing to configure.
//!
//! RSA is signed here with the `rsa` crate from the key's own PKCS#1
//! components; every other algorithm goes through `ssh_key`.

use num_bigint::BigUint;
use rsa::pkcs1v15;
use sha2::Sha512;
use signature::{SignatureEncoding as _, Signer};
use ssh_key::private::{KeypairData, RsaKeypair};
use ssh_key::{Algorithm, HashAlg, LineEnding, Mpint, PrivateKey, PublicKey, Signature, SshSig};
use tracing::debug;

/// Hash used for every fingerprint shown to users.
pub const FINGERPRINT_HASH: HashAlg = HashAlg::Sha256;

/// A private key ready to sign.
///
/// Key material is zeroized when the identity is dropped (via
/// `ssh_key::PrivateKey`).
#[derive(Clone)]
pub struct SigningIdentity {
    private_key: PrivateKey,
    rsa: Option<rsa::RsaPrivateKey>,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("algorithm", &self.algorithm())
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

impl SigningIdentity {
    /// Wrap parsed key material.  `comment` ends up in the public key line and
    /// in agent listings.
    pub fn new(key_data: KeypairData, comment: impl Into<String>) -> Result<Self, ssh_key::Error> {
        let private_key = PrivateKey::new(key_data, comment)?;
        Self::from_private_key(private_key)
    }

    /// Fails only if an RSA key's components are inconsistent.
    pub fn from_private_key(private_key: PrivateKey) -> Result<Self, ssh_key::Error> {
        let rsa = match private_key.key_data() {
            KeypairData::Rsa(keypair) => Some(rsa_private_key(keypair)?),
            _ => None,
        };
        let identity = Self { private_key, rsa };
        debug!(
            algorithm = %identity.algorithm(),
            fingerprint = %identity.fingerprint(),
            "signing identity ready"
        );
        Ok(identity)
    }

    /// The public key, derived from the private key's own parameters.
    pub fn public_key(&self) -> &PublicKey {
        self.private_key.public_key()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.private_key.algorithm()
    }

    /// SHA-256 fingerprint string (e.g. `"SHA256:abc123…"`).
    pub fn fingerprint(&self) -> String {
        self.public_key().fingerprint(FINGERPRINT_HASH).to_string()
    }

    pub fn comment(&self) -> &str {
        self.private_key.comment()
    }

    /// OpenSSH `authorized_keys` line for the public key.
    pub fn public_key_openssh(&self) -> Result<String, ssh_key::Error> {
        self.public_key().to_openssh()
    }

    /// Sign `data` with the key's native scheme.
    pub fn sign(&self, data: &[u8]) -> Result<Signature, signature::Error> {
        let Some(key) = &self.rsa else {
            return self.private_key.try_sign(data);
        };
        let signing_key = pkcs1v15::SigningKey::<Sha512>::new(key.clone());
        let raw = signing_key.try_sign(data)?;
        Signature::new(
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha512),
            },
            raw.to_vec(),
        )
        .map_err(|_| signature::Error::new())
    }

    /// Produce an armored OpenSSH `SSHSIG` over `msg` (as `ssh-keygen -Y sign`).
    pub fn sign_sshsig(&self, namespace: &str, msg: &[u8]) -> Result<String, ssh_key::Error> {
        let hash_alg = HashAlg::Sha512;
        let signed = SshSig::signed_data(namespace, hash_alg, msg)?;
        let signature = self.sign(&signed).map_err(|_| ssh_key::Error::Crypto)?;
        SshSig::new(
            self.public_key().key_data().clone(),
            namespace,
            hash_alg,
            signature,
        )?
        .to_pem(LineEnding::LF)
    }

    /// The underlying key, for handing to an SSH agent.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

fn rsa_private_key(keypair: &RsaKeypair) -> Result<rsa::RsaPrivateKey, ssh_key::Error> {
    let uint = |m: &Mpint| {
        m.as_positive_bytes()
            .map(BigUint::from_bytes_be)
            .ok_or(ssh_key::Error::Crypto)
    };
    rsa::RsaPrivateKey::from_components(
        uint(&keypair.public.n)?,
        uint(&keypair.public.e)?,
        uint(&keypair.private.d)?,
        vec![uint(&keypair.private.p)?, uint(&keypair.private.q)?],
    )
    .map_err(|_| ssh_key::Error::Crypto)
}

impl Signer<Signature> for SigningIdentity {
    fn try_sign(&self, msg: &[u8]) -> Result<Signature, signature::Error> {
        self.sign(msg)
    }
}
