//! Legacy OpenSSL PEM decryption (`Proc-Type: 4,ENCRYPTED` + `DEK-Info`).
//!
//! The symmetric key is derived with OpenSSL's `EVP_BytesToKey` (MD5, one
//! round, salt = first 8 bytes of the IV) and the body is decrypted in CBC
//! mode with PKCS#7 padding.
//!
//! Every failure, from an unparseable `DEK-Info` header to a padding mismatch
//! caused by a wrong password, is reported as the same
//! [`KeyErrorKind::DecryptionFailed`].

use aes::{Aes128, Aes192, Aes256};
use block_padding::Pkcs7;
use cbc::Decryptor;
use cbc::cipher::{BlockCipher, BlockDecryptMut, KeyInit, KeyIvInit};
use des::{Des, TdesEde3};
use md5::{Digest, Md5};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::KeyErrorKind;
use crate::pem::{DEK_INFO, PemBlock};

const SALT_LEN: usize = 8;
const MD5_LEN: usize = 16;

/// Ciphers accepted in a `DEK-Info` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemCipher {
    DesCbc,
    DesEde3Cbc,
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl PemCipher {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DES-CBC" => Some(Self::DesCbc),
            "DES-EDE3-CBC" => Some(Self::DesEde3Cbc),
            "AES-128-CBC" => Some(Self::Aes128Cbc),
            "AES-192-CBC" => Some(Self::Aes192Cbc),
            "AES-256-CBC" => Some(Self::Aes256Cbc),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::DesCbc => "DES-CBC",
            Self::DesEde3Cbc => "DES-EDE3-CBC",
            Self::Aes128Cbc => "AES-128-CBC",
            Self::Aes192Cbc => "AES-192-CBC",
            Self::Aes256Cbc => "AES-256-CBC",
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            Self::DesCbc => 8,
            Self::Aes128Cbc => 16,
            Self::DesEde3Cbc | Self::Aes192Cbc => 24,
            Self::Aes256Cbc => 32,
        }
    }

    /// Block size, which is also the required IV length.
    pub fn block_len(self) -> usize {
        match self {
            Self::DesCbc | Self::DesEde3Cbc => 8,
            Self::Aes128Cbc | Self::Aes192Cbc | Self::Aes256Cbc => 16,
        }
    }

    fn decrypt(self, key: &[u8], iv: &[u8], data: &[u8]) -> Option<Vec<u8>> {
        match self {
            Self::DesCbc => cbc_decrypt::<Des>(key, iv, data),
            Self::DesEde3Cbc => cbc_decrypt::<TdesEde3>(key, iv, data),
            Self::Aes128Cbc => cbc_decrypt::<Aes128>(key, iv, data),
            Self::Aes192Cbc => cbc_decrypt::<Aes192>(key, iv, data),
            Self::Aes256Cbc => cbc_decrypt::<Aes256>(key, iv, data),
        }
    }
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], data: &[u8]) -> Option<Vec<u8>>
where
    C: BlockCipher + BlockDecryptMut + KeyInit,
{
    let cipher = Decryptor::<C>::new_from_slices(key, iv).ok()?;
    cipher.decrypt_padded_vec_mut::<Pkcs7>(data).ok()
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single round.
pub fn derive_key(password: &[u8], salt: &[u8], key_len: usize) -> Zeroizing<Vec<u8>> {
    // Sized up front so the buffer never reallocates and leaves copies behind.
    let mut key = Zeroizing::new(Vec::with_capacity(key_len + MD5_LEN));
    while key.len() < key_len {
        let mut hasher = Md5::new();
        // The previous digest is the tail of what has been produced so far.
        hasher.update(&key[key.len().saturating_sub(MD5_LEN)..]);
        hasher.update(password);
        hasher.update(salt);
        key.extend_from_slice(&hasher.finalize());
    }
    key.truncate(key_len);
    key
}

/// Decrypt the body of an encrypted PEM block with `password`.
pub fn decrypt_block(
    block: &PemBlock,
    password: &[u8],
) -> Result<Zeroizing<Vec<u8>>, KeyErrorKind> {
    let dek = block.header(DEK_INFO).ok_or(KeyErrorKind::DecryptionFailed)?;

    let Some((name, iv_hex)) = dek.split_once(',') else {
        debug!(label = %block.label, "DEK-Info header has no IV");
        return Err(KeyErrorKind::DecryptionFailed);
    };

    let Some(cipher) = PemCipher::from_name(name.trim()) else {
        debug!(label = %block.label, cipher = %name, "unknown PEM cipher");
        return Err(KeyErrorKind::DecryptionFailed);
    };

    let iv = match hex::decode(iv_hex.trim()) {
        Ok(iv) if iv.len() == cipher.block_len() => iv,
        _ => {
            debug!(label = %block.label, cipher = cipher.name(), "invalid DEK-Info IV");
            return Err(KeyErrorKind::DecryptionFailed);
        }
    };

    if block.body.is_empty() || block.body.len() % cipher.block_len() != 0 {
        debug!(
            label = %block.label,
            cipher = cipher.name(),
            "encrypted body is not a whole number of blocks"
        );
        return Err(KeyErrorKind::DecryptionFailed);
    }

    debug!(label = %block.label, cipher = cipher.name(), "decrypting PEM body");

    let key = derive_key(password, &iv[..SALT_LEN], cipher.key_len());
    cipher
        .decrypt(&key, &iv, &block.body)
        .map(Zeroizing::new)
        .ok_or(KeyErrorKind::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const IV: &str = "00112233445566778899AABBCCDDEEFF";
    // AES-128-CBC("hello world"), password "hunter2", IV above.
    const CIPHERTEXT: &str = "776fe684c9497fbb9ecba4470ed44180";

    fn block(dek: &str, body: Vec<u8>) -> PemBlock {
        let mut headers = HashMap::new();
        headers.insert("Proc-Type".to_string(), "4,ENCRYPTED".to_string());
        headers.insert(DEK_INFO.to_string(), dek.to_string());
        PemBlock {
            label: "RSA PRIVATE KEY".to_string(),
            headers,
            body: Zeroizing::new(body),
        }
    }

    fn aes_block() -> PemBlock {
        block(
            &format!("AES-128-CBC,{IV}"),
            hex::decode(CIPHERTEXT).unwrap(),
        )
    }

    #[test]
    fn derive_key_matches_openssl() {
        let salt = hex::decode("0102030405060708").unwrap();
        let key = derive_key(b"password", &salt, 32);
        assert_eq!(
            hex::encode(&*key),
            "e7b0971e52ca5cc8d0539fb3412f6316f7ba2e6ee293d9f3457b99436b51ce02"
        );
        let short = derive_key(b"password", &salt, 8);
        assert_eq!(hex::encode(&*short), "e7b0971e52ca5cc8");
    }

    #[test]
    fn cipher_names_roundtrip() {
        for cipher in [
            PemCipher::DesCbc,
            PemCipher::DesEde3Cbc,
            PemCipher::Aes128Cbc,
            PemCipher::Aes192Cbc,
            PemCipher::Aes256Cbc,
        ] {
            assert_eq!(PemCipher::from_name(cipher.name()), Some(cipher));
        }
        assert_eq!(PemCipher::from_name("aes-128-cbc"), None);
        assert_eq!(PemCipher::from_name("AES-128-GCM"), None);
    }

    #[test]
    fn decrypts_with_correct_password() {
        let plain = decrypt_block(&aes_block(), b"hunter2").unwrap();
        assert_eq!(plain.as_slice(), b"hello world");
    }

    #[test]
    fn wrong_password_is_decryption_failure() {
        let err = decrypt_block(&aes_block(), b"hunter3").unwrap_err();
        assert!(matches!(err, KeyErrorKind::DecryptionFailed));
    }

    #[test]
    fn malformed_headers_are_decryption_failures() {
        let body = hex::decode(CIPHERTEXT).unwrap();
        for dek in [
            "AES-128-CBC",
            "FOO-256-CBC,00112233445566778899AABBCCDDEEFF",
            "AES-128-CBC,not-hex",
            "AES-128-CBC,0011223344556677",
        ] {
            let err = decrypt_block(&block(dek, body.clone()), b"hunter2").unwrap_err();
            assert!(matches!(err, KeyErrorKind::DecryptionFailed), "{dek}");
        }
    }

    #[test]
    fn partial_block_is_decryption_failure() {
        let mut body = hex::decode(CIPHERTEXT).unwrap();
        body.pop();
        let err = decrypt_block(&block(&format!("AES-128-CBC,{IV}"), body), b"hunter2")
            .unwrap_err();
        assert!(matches!(err, KeyErrorKind::DecryptionFailed));
    }

    #[test]
    fn empty_body_is_decryption_failure() {
        let err = decrypt_block(&block(&format!("AES-128-CBC,{IV}"), Vec::new()), b"hunter2")
            .unwrap_err();
        assert!(matches!(err, KeyErrorKind::DecryptionFailed));
    }
}
