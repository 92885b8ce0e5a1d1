//! Private key structure parsers, selected by PEM label.
//!
//! The three legacy OpenSSL labels map onto a closed [`PemKeyType`]; the
//! label is authoritative and decryption never changes which parser runs.
//! Unencrypted `OPENSSH PRIVATE KEY` and PKCS#8 `PRIVATE KEY` blocks take the
//! generic path in [`parse_openssh`] / [`parse_pkcs8`].

use der::Decode as _;
use der::asn1::{OctetStringRef, UintRef};
use num_bigint::BigUint;
use pkcs8::{DecodePrivateKey as _, ObjectIdentifier, PrivateKeyInfo};
use rsa::pkcs1::DecodeRsaPrivateKey as _;
use ssh_key::PrivateKey;
use ssh_key::private::{DsaKeypair, EcdsaKeypair, Ed25519Keypair, KeypairData, RsaKeypair};
use zeroize::Zeroizing;

use crate::error::KeyErrorKind;

pub const RSA_LABEL: &str = "RSA PRIVATE KEY";
pub const EC_LABEL: &str = "EC PRIVATE KEY";
pub const DSA_LABEL: &str = "DSA PRIVATE KEY";
pub const OPENSSH_LABEL: &str = "OPENSSH PRIVATE KEY";
pub const PKCS8_LABEL: &str = "PRIVATE KEY";

const RSA_ENCRYPTION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const ED25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// Key structures reachable through the legacy PEM labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemKeyType {
    /// PKCS#1 `RSAPrivateKey`.
    Rsa,
    /// SEC1 `ECPrivateKey` on P-256, P-384 or P-521.
    Ec,
    /// OpenSSL's `SEQUENCE { version, p, q, g, y, x }`.
    Dsa,
}

impl PemKeyType {
    /// Exact, case-sensitive match on the PEM label.
    pub fn from_label(label: &str) -> Result<Self, KeyErrorKind> {
        match label {
            RSA_LABEL => Ok(Self::Rsa),
            EC_LABEL => Ok(Self::Ec),
            DSA_LABEL => Ok(Self::Dsa),
            other => Err(KeyErrorKind::UnsupportedKeyType(other.to_string())),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Rsa => RSA_LABEL,
            Self::Ec => EC_LABEL,
            Self::Dsa => DSA_LABEL,
        }
    }

    /// Parse plaintext DER into key material.
    pub fn parse(self, der: &[u8]) -> Result<KeypairData, KeyErrorKind> {
        match self {
            Self::Rsa => parse_rsa(der),
            Self::Ec => parse_ec(der),
            Self::Dsa => parse_dsa(der),
        }
    }
}

fn parse_rsa(der: &[u8]) -> Result<KeypairData, KeyErrorKind> {
    let key = rsa::RsaPrivateKey::from_pkcs1_der(der)
        .map_err(|e| KeyErrorKind::malformed(RSA_LABEL, e))?;
    rsa_keypair(key, RSA_LABEL)
}

fn rsa_keypair(key: rsa::RsaPrivateKey, label: &str) -> Result<KeypairData, KeyErrorKind> {
    RsaKeypair::try_from(key)
        .map(KeypairData::Rsa)
        .map_err(|e| KeyErrorKind::malformed(label, e))
}

fn parse_ec(der: &[u8]) -> Result<KeypairData, KeyErrorKind> {
    // `from_sec1_der` rejects a key whose named-curve parameter is for a
    // different curve, so at most one of these succeeds.
    if let Ok(key) = p256::SecretKey::from_sec1_der(der) {
        return Ok(ecdsa_p256(key));
    }
    if let Ok(key) = p384::SecretKey::from_sec1_der(der) {
        return Ok(ecdsa_p384(key));
    }
    if let Ok(key) = p521::SecretKey::from_sec1_der(der) {
        return Ok(ecdsa_p521(key));
    }
    Err(KeyErrorKind::malformed(
        EC_LABEL,
        "not a P-256, P-384 or P-521 SEC1 private key",
    ))
}

fn ecdsa_p256(key: p256::SecretKey) -> KeypairData {
    KeypairData::Ecdsa(EcdsaKeypair::NistP256 {
        public: key.public_key().into(),
        private: key.into(),
    })
}

fn ecdsa_p384(key: p384::SecretKey) -> KeypairData {
    KeypairData::Ecdsa(EcdsaKeypair::NistP384 {
        public: key.public_key().into(),
        private: key.into(),
    })
}

fn ecdsa_p521(key: p521::SecretKey) -> KeypairData {
    KeypairData::Ecdsa(EcdsaKeypair::NistP521 {
        public: key.public_key().into(),
        private: key.into(),
    })
}

#[derive(der::Sequence)]
struct OpenSslDsaKey<'a> {
    version: UintRef<'a>,
    p: UintRef<'a>,
    q: UintRef<'a>,
    g: UintRef<'a>,
    y: UintRef<'a>,
    x: UintRef<'a>,
}

fn parse_dsa(der: &[u8]) -> Result<KeypairData, KeyErrorKind> {
    let malformed = |e: &dyn std::fmt::Display| KeyErrorKind::malformed(DSA_LABEL, e);

    let key = OpenSslDsaKey::from_der(der).map_err(|e| malformed(&e))?;
    if key.version.as_bytes().iter().any(|b| *b != 0) {
        return Err(malformed(&"unsupported version"));
    }

    let uint = |v: &UintRef<'_>| BigUint::from_bytes_be(v.as_bytes());
    // ssh-dss signatures are two 20-byte integers.
    if uint(&key.q).bits() != 160 {
        return Err(malformed(&"DSA subgroup order must be 160 bits"));
    }
    let components = dsa::Components::from_components(uint(&key.p), uint(&key.q), uint(&key.g))
        .map_err(|e| malformed(&e))?;
    let verifying = dsa::VerifyingKey::from_components(components, uint(&key.y))
        .map_err(|e| malformed(&e))?;
    let signing =
        dsa::SigningKey::from_components(verifying, uint(&key.x)).map_err(|e| malformed(&e))?;

    DsaKeypair::try_from(signing)
        .map(KeypairData::Dsa)
        .map_err(|e| malformed(&e))
}

/// Parse the decoded body of an `OPENSSH PRIVATE KEY` block
/// (`openssh-key-v1` binary format).
///
/// Keys protected by OpenSSH's own passphrase scheme are rejected as
/// unsupported, whatever password the caller holds.
pub fn parse_openssh(body: &[u8]) -> Result<PrivateKey, KeyErrorKind> {
    let key = PrivateKey::from_bytes(body).map_err(|e| KeyErrorKind::malformed(OPENSSH_LABEL, e))?;
    if key.is_encrypted() {
        return Err(KeyErrorKind::UnsupportedKeyType(OPENSSH_LABEL.to_string()));
    }
    Ok(key)
}

/// Parse an unencrypted PKCS#8 `PrivateKeyInfo`.
pub fn parse_pkcs8(der: &[u8]) -> Result<KeypairData, KeyErrorKind> {
    let info = PrivateKeyInfo::try_from(der).map_err(|e| KeyErrorKind::malformed(PKCS8_LABEL, e))?;
    let oid = info.algorithm.oid;

    if oid == RSA_ENCRYPTION_OID {
        let key = rsa::RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| KeyErrorKind::malformed(PKCS8_LABEL, e))?;
        return rsa_keypair(key, PKCS8_LABEL);
    }

    if oid == EC_PUBLIC_KEY_OID {
        if let Ok(key) = p256::SecretKey::from_pkcs8_der(der) {
            return Ok(ecdsa_p256(key));
        }
        if let Ok(key) = p384::SecretKey::from_pkcs8_der(der) {
            return Ok(ecdsa_p384(key));
        }
        if let Ok(key) = p521::SecretKey::from_pkcs8_der(der) {
            return Ok(ecdsa_p521(key));
        }
        return Err(KeyErrorKind::malformed(
            PKCS8_LABEL,
            "not a P-256, P-384 or P-521 EC key",
        ));
    }

    if oid == ED25519_OID {
        // RFC 8410: the private key is itself an OCTET STRING holding the seed.
        let seed = OctetStringRef::from_der(info.private_key)
            .map_err(|e| KeyErrorKind::malformed(PKCS8_LABEL, e))?;
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
            seed.as_bytes()
                .try_into()
                .map_err(|_| KeyErrorKind::malformed(PKCS8_LABEL, "Ed25519 seed is not 32 bytes"))?,
        );
        return Ok(KeypairData::Ed25519(Ed25519Keypair::from_seed(&seed)));
    }

    Err(KeyErrorKind::UnsupportedKeyType(format!(
        "{PKCS8_LABEL} ({oid})"
    )))
}
