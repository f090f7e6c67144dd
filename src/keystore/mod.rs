//! In-memory store of Ed25519 signing keys indexed by key id (`kid`).
//!
//! Keys are loaded once from a directory of PKCS#8 PEM files, one file per key,
//! where the file name minus its `.pem` extension is the key id:
//!
//! ```text
//! zarf/keys/54bb2165-71e1-41a6-af3e-7da4a0e1e2c1.pem
//! ```
//!
//! The store is immutable after construction and is shared between request
//! tasks behind an `Arc` without any locking.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use thiserror::Error;
use zeroize::Zeroizing;

/// Largest key file accepted by [`KeyStore::load`].
///
/// Guards against pathological inputs such as a key path symlinked to `/dev/random`.
pub const MAX_KEY_FILE_BYTES: u64 = 1024 * 1024;

const KEY_FILE_EXTENSION: &str = ".pem";

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("loading key file {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("kid lookup failed: {0}")]
    NotFound(String),

    #[error("encoding key material: {0}")]
    Encoding(String),
}

impl KeyStoreError {
    fn load(path: &Path, reason: impl Into<String>) -> Self {
        KeyStoreError::Load {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// A signing key and the PEM text it was loaded from.
pub struct KeyPair {
    pub id: String,
    signing_key: SigningKey,
    pem: Zeroizing<String>,
}

impl KeyPair {
    fn from_pem(id: impl Into<String>, pem: &str) -> Result<Self, String> {
        let signing_key = SigningKey::from_pkcs8_pem(pem).map_err(|e| e.to_string())?;
        Ok(Self {
            id: id.into(),
            signing_key,
            pem: Zeroizing::new(pem.to_string()),
        })
    }

    /// PKCS#8 DER encoding of the private key, as expected by the token signer.
    pub fn private_der(&self) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
        let document = self
            .signing_key
            .to_pkcs8_der()
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// SPKI PEM encoding of the public half, derived from the private key.
    pub fn public_pem(&self) -> Result<String, KeyStoreError> {
        self.signing_key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Read-only map of key id to [`KeyPair`].
#[derive(Debug, Default)]
pub struct KeyStore {
    store: HashMap<String, KeyPair>,
}

impl KeyStore {
    /// Load every key file directly inside `dir`.
    ///
    /// Subdirectories are skipped. The load is all-or-nothing: the first file
    /// that cannot be read, exceeds [`MAX_KEY_FILE_BYTES`] or does not parse as
    /// an Ed25519 private key aborts the whole load.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, KeyStoreError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir)
            .map_err(|e| KeyStoreError::load(dir, format!("walking directory: {e}")))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| KeyStoreError::load(dir, format!("walking directory: {e}")))?;
            let path = entry.path();
            let metadata =
                fs::metadata(&path).map_err(|e| KeyStoreError::load(&path, e.to_string()))?;
            if metadata.is_dir() {
                continue;
            }
            files.push(path);
        }
        files.sort();

        let mut ks = KeyStore::default();
        for path in files {
            let pem = read_capped(&path)?;
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| KeyStoreError::load(&path, "file name is not valid UTF-8"))?;
            let kid = file_name.strip_suffix(KEY_FILE_EXTENSION).unwrap_or(file_name);

            let pair = KeyPair::from_pem(kid, &pem)
                .map_err(|e| KeyStoreError::load(&path, format!("parsing auth private key: {e}")))?;
            ks.insert(pair).map_err(|reason| KeyStoreError::load(&path, reason))?;
        }

        tracing::info!(
            keys = ks.len(),
            folder = %dir.display(),
            "key store loaded"
        );

        Ok(ks)
    }

    /// Build a store from in-memory `(kid, pem)` pairs with the same validation
    /// as [`KeyStore::load`].
    pub fn from_pems<I, K, P>(pems: I) -> Result<Self, KeyStoreError>
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: AsRef<str>,
    {
        let mut ks = KeyStore::default();
        for (kid, pem) in pems {
            let kid = kid.into();
            let path = PathBuf::from(format!("{kid}{KEY_FILE_EXTENSION}"));
            let pair = KeyPair::from_pem(kid, pem.as_ref())
                .map_err(|e| KeyStoreError::load(&path, format!("parsing auth private key: {e}")))?;
            ks.insert(pair).map_err(|reason| KeyStoreError::load(&path, reason))?;
        }
        Ok(ks)
    }

    fn insert(&mut self, pair: KeyPair) -> Result<(), String> {
        if self.store.contains_key(&pair.id) {
            return Err(format!("duplicate key id '{}'", pair.id));
        }
        self.store.insert(pair.id.clone(), pair);
        Ok(())
    }

    pub fn get(&self, kid: &str) -> Result<&KeyPair, KeyStoreError> {
        self.store
            .get(kid)
            .ok_or_else(|| KeyStoreError::NotFound(kid.to_string()))
    }

    /// PEM-encoded private key for `kid`.
    pub fn private_key(&self, kid: &str) -> Result<String, KeyStoreError> {
        Ok(self.get(kid)?.pem.to_string())
    }

    /// PEM-encoded public key for `kid`, derived from the private key on every call.
    pub fn public_key(&self, kid: &str) -> Result<String, KeyStoreError> {
        self.get(kid)?.public_pem()
    }

    /// Loaded key ids in sorted order.
    pub fn kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self.store.keys().cloned().collect();
        kids.sort();
        kids
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

fn read_capped(path: &Path) -> Result<String, KeyStoreError> {
    let file = fs::File::open(path)
        .map_err(|e| KeyStoreError::load(path, format!("opening key file: {e}")))?;

    let mut buf = Vec::new();
    file.take(MAX_KEY_FILE_BYTES + 1)
        .read_to_end(&mut buf)
        .map_err(|e| KeyStoreError::load(path, format!("reading auth private key: {e}")))?;

    if buf.len() as u64 > MAX_KEY_FILE_BYTES {
        return Err(KeyStoreError::load(
            path,
            format!("key file exceeds {MAX_KEY_FILE_BYTES} bytes"),
        ));
    }

    String::from_utf8(buf).map_err(|_| KeyStoreError::load(path, "key file is not valid UTF-8"))
}

/// Generate a fresh Ed25519 private key encoded as PKCS#8 PEM.
pub fn generate_private_key_pem() -> Result<Zeroizing<String>, KeyStoreError> {
    let signing_key = SigningKey::generate(&mut OsRng);
    signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyStoreError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_key(dir: &Path, name: &str) -> String {
        let pem = generate_private_key_pem().unwrap();
        fs::write(dir.join(name), pem.as_bytes()).unwrap();
        pem.to_string()
    }

    #[test]
    fn test_load_strips_extension_and_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_key(dir.path(), "first.pem");
        write_key(dir.path(), "second.pem");
        fs::create_dir(dir.path().join("nested")).unwrap();
        write_key(&dir.path().join("nested"), "ignored.pem");

        let ks = KeyStore::load(dir.path()).unwrap();
        assert_eq!(ks.kids(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_public_keys_are_distinct_per_kid() {
        let dir = tempfile::tempdir().unwrap();
        write_key(dir.path(), "a.pem");
        write_key(dir.path(), "b.pem");

        let ks = KeyStore::load(dir.path()).unwrap();
        let a = ks.public_key("a").unwrap();
        let b = ks.public_key("b").unwrap();

        assert!(a.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_ne!(a, b);
        // Re-derived on each call, but stable.
        assert_eq!(a, ks.public_key("a").unwrap());
    }

    #[test]
    fn test_private_key_round_trips_pem() {
        let dir = tempfile::tempdir().unwrap();
        let pem = write_key(dir.path(), "k1.pem");

        let ks = KeyStore::load(dir.path()).unwrap();
        assert_eq!(ks.private_key("k1").unwrap(), pem);
    }

    #[test]
    fn test_unknown_kid_is_not_found() {
        let ks = KeyStore::default();
        assert!(matches!(ks.private_key("unknown"), Err(KeyStoreError::NotFound(_))));
        assert!(matches!(ks.public_key("unknown"), Err(KeyStoreError::NotFound(_))));
    }

    #[test]
    fn test_garbage_file_aborts_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        write_key(dir.path(), "good.pem");
        fs::write(dir.path().join("bad.pem"), "not a key").unwrap();

        let err = KeyStore::load(dir.path()).unwrap_err();
        match err {
            KeyStoreError::Load { path, .. } => assert!(path.ends_with("bad.pem")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let big = vec![b'a'; (MAX_KEY_FILE_BYTES + 1) as usize];
        fs::write(dir.path().join("big.pem"), big).unwrap();

        let err = KeyStore::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{err}");
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(KeyStore::load(missing), Err(KeyStoreError::Load { .. })));
    }

    #[test]
    fn test_from_pems_rejects_duplicates() {
        let pem = generate_private_key_pem().unwrap();
        let result = KeyStore::from_pems(vec![("dup", pem.as_str()), ("dup", pem.as_str())]);
        assert!(matches!(result, Err(KeyStoreError::Load { .. })));
    }
}
