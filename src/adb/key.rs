//! ADB host key.
//!
//! The device authenticates the host by asking it to sign a random 20-byte
//! token. The token is signed as if it were a SHA-1 digest (PKCS#1 v1.5 with
//! the SHA-1 DigestInfo prefix). If the device does not know the key yet it
//! asks for the public half, which ADB transfers in the mincrypt layout used
//! by Android, base64 encoded:
//!
//! ```text
//! u32 len (words) │ u32 n0inv │ u32 n[len] │ u32 rr[len] │ u32 e
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TOKEN_SIZE: usize = 20;

const MODULUS_BITS: usize = 2048;
const MODULUS_WORDS: usize = MODULUS_BITS / 32;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Failed to read key file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key file {0} is neither a PKCS#8 nor a PKCS#1 PEM private key")]
    Format(PathBuf),

    #[error("ADB requires a {MODULUS_BITS}-bit RSA key, got {0} bits")]
    ModulusSize(usize),

    #[error("Auth token must be {TOKEN_SIZE} bytes, got {0}")]
    TokenSize(usize),

    #[error("Signing failed: {0}")]
    Sign(#[from] rsa::Error),
}

pub struct AdbKey {
    private: RsaPrivateKey,
    /// `<base64 key> <name>` as sent in AUTH RSAPUBLICKEY, without the NUL
    public: String,
}

impl AdbKey {
    /// Load `path` and its `<path>.pub` companion if one exists
    pub fn load(path: &Path) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path).map_err(|source| KeyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let private = RsaPrivateKey::from_pkcs8_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
            .map_err(|_| KeyError::Format(path.to_path_buf()))?;

        let mut pub_path = path.as_os_str().to_owned();
        pub_path.push(".pub");
        let pub_path = PathBuf::from(pub_path);

        let public = match std::fs::read_to_string(&pub_path) {
            Ok(contents) => {
                debug!("Using public key from {}", pub_path.display());
                contents.trim_end_matches(['\0', '\n', '\r']).to_string()
            }
            Err(_) => {
                debug!("No {}, deriving public key", pub_path.display());
                format!("{} snes-link@{}", android_public_key(&private)?, host_name())
            }
        };

        info!("Loaded ADB key {}", path.display());
        Ok(Self { private, public })
    }

    pub fn sign_token(&self, token: &[u8]) -> Result<Vec<u8>, KeyError> {
        if token.len() != TOKEN_SIZE {
            return Err(KeyError::TokenSize(token.len()));
        }
        Ok(self.private.sign(Pkcs1v15Sign::new::<Sha1>(), token)?)
    }

    /// Payload of AUTH RSAPUBLICKEY
    pub fn public_key_payload(&self) -> Vec<u8> {
        let mut payload = self.public.clone().into_bytes();
        payload.push(0);
        payload
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }
}

/// Encode the public half of `key` in Android's mincrypt layout, base64
pub fn android_public_key(key: &RsaPrivateKey) -> Result<String, KeyError> {
    let n = key.n();
    let bits = n.bits();
    if bits != MODULUS_BITS {
        return Err(KeyError::ModulusSize(bits));
    }

    let n_words = le_words(n);
    let n0inv = inverse_mod_2_32(n_words[0]).wrapping_neg();

    let rr = (BigUint::from(1u8) << (2 * MODULUS_BITS)) % n;
    let rr_words = le_words(&rr);
    let e_words = le_words(key.e());

    let mut blob = Vec::with_capacity(4 * (3 + 2 * MODULUS_WORDS));
    blob.extend_from_slice(&(MODULUS_WORDS as u32).to_le_bytes());
    blob.extend_from_slice(&n0inv.to_le_bytes());
    for word in n_words.iter().chain(rr_words.iter()) {
        blob.extend_from_slice(&word.to_le_bytes());
    }
    blob.extend_from_slice(&e_words[0].to_le_bytes());

    Ok(STANDARD.encode(blob))
}

/// `value` as exactly `MODULUS_WORDS` little-endian u32 words
fn le_words(value: &BigUint) -> Vec<u32> {
    let mut bytes = value.to_bytes_le();
    bytes.resize(MODULUS_WORDS * 4, 0);
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Multiplicative inverse of an odd `a` modulo 2^32 (Newton iteration)
fn inverse_mod_2_32(a: u32) -> u32 {
    let mut x = a;
    for _ in 0..5 {
        x = x.wrapping_mul(2u32.wrapping_sub(a.wrapping_mul(x)));
    }
    x
}

fn host_name() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
