// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Oracle signer keystore.
//!
//! One Ed25519 key per oracle node, kept in `data_dir/oracle_signer.key`.
//! Every signature is throttled and leaves a digest-only line in
//! `data_dir/signer_audit.log`.
//!
//! ### Sealed key file
//! With `OMNISUPPLY_KEY_PASSPHRASE` set, new keys are sealed as
//! `MAGIC(8) || SALT(16) || NONCE(12) || AES-256-GCM(PKCS#8) || TAG(16)`.
//! The magic is bound as associated data, so a rewritten header fails to open.
//! PBKDF2-HMAC-SHA256 derives the key; `OMNISUPPLY_PBKDF2_ITERS` overrides the
//! iteration count within `[10_000, 10_000_000]`.

use ring::{
    aead, pbkdf2,
    rand::{SecureRandom, SystemRandom},
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use std::{
    fs,
    io::Write,
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::core::types::{Address, Signature, H256};

/// Signer key file name inside the data directory.
pub const KEY_FILE_NAME: &str = "oracle_signer.key";
/// Audit log file name inside the data directory.
pub const AUDIT_FILE_NAME: &str = "signer_audit.log";

const PASSPHRASE_ENV: &str = "OMNISUPPLY_KEY_PASSPHRASE";
const PBKDF2_ITERS_ENV: &str = "OMNISUPPLY_PBKDF2_ITERS";

const SEALED_MAGIC: &[u8; 8] = b"OMNIKEY1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = aead::NONCE_LEN;
const TAG_LEN: usize = 16;
const SEALED_HEADER_LEN: usize = SEALED_MAGIC.len() + SALT_LEN + NONCE_LEN;

const AUDIT_MAX_BYTES: u64 = 32 * 1024 * 1024;
const AUDIT_GENERATIONS: usize = 3;

const SIGNATURES_PER_WINDOW: u32 = 1_000;
const THROTTLE_WINDOW: Duration = Duration::from_secs(1);

/// Keystore errors.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Filesystem failure.
    #[error("keystore io: {0}")]
    Io(String),
    /// Key file is neither PKCS#8 nor a well-formed sealed file.
    #[error("invalid key encoding")]
    InvalidKey,
    /// Sealed key file without a passphrase in the environment.
    #[error("sealed key needs OMNISUPPLY_KEY_PASSPHRASE")]
    MissingPassphrase,
    /// Seal, open or randomness failure (wrong passphrase included).
    #[error("crypto")]
    Crypto,
    /// Signing throttle exhausted.
    #[error("signing rate limited")]
    RateLimited,
    /// Signature does not verify.
    #[error("bad signature")]
    BadSignature,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> KeystoreError + '_ {
    move |e| KeystoreError::Io(format!("{}: {e}", path.display()))
}

fn passphrase() -> Option<Zeroizing<String>> {
    std::env::var(PASSPHRASE_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(Zeroizing::new)
}

fn pbkdf2_rounds() -> NonZeroU32 {
    let rounds = std::env::var(PBKDF2_ITERS_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(100_000)
        .clamp(10_000, 10_000_000);
    NonZeroU32::new(rounds).unwrap_or(NonZeroU32::MIN)
}

/// Signer backend abstraction (HSM compatible).
pub trait SignerBackend: Send + Sync {
    /// Ed25519 public key.
    fn public_key(&self) -> [u8; 32];
    /// Sign message bytes.
    fn sign(&self, msg: &[u8]) -> Result<Signature, KeystoreError>;
}

// ---- sealed key file ----

fn sealing_key(pass: &[u8], salt: &[u8]) -> Result<aead::LessSafeKey, KeystoreError> {
    let mut raw = Zeroizing::new([0u8; 32]);
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, pbkdf2_rounds(), salt, pass, &mut raw[..]);
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, &raw[..])
        .map_err(|_| KeystoreError::Crypto)?;
    Ok(aead::LessSafeKey::new(unbound))
}

fn seal(pass: &[u8], pkcs8: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    let rng = SystemRandom::new();
    let mut header = [0u8; SEALED_HEADER_LEN];
    header[..SEALED_MAGIC.len()].copy_from_slice(SEALED_MAGIC);
    rng.fill(&mut header[SEALED_MAGIC.len()..]).map_err(|_| KeystoreError::Crypto)?;

    let (salt, nonce) = header[SEALED_MAGIC.len()..].split_at(SALT_LEN);
    let nonce = aead::Nonce::try_assume_unique_for_key(nonce).map_err(|_| KeystoreError::Crypto)?;
    let key = sealing_key(pass, salt)?;

    let mut body = pkcs8.to_vec();
    key.seal_in_place_append_tag(nonce, aead::Aad::from(SEALED_MAGIC), &mut body)
        .map_err(|_| KeystoreError::Crypto)?;

    let mut out = header.to_vec();
    out.append(&mut body);
    Ok(out)
}

fn unseal(pass: &[u8], file: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    if file.len() < SEALED_HEADER_LEN + TAG_LEN || !file.starts_with(SEALED_MAGIC) {
        return Err(KeystoreError::InvalidKey);
    }
    let (header, sealed) = file.split_at(SEALED_HEADER_LEN);
    let (salt, nonce) = header[SEALED_MAGIC.len()..].split_at(SALT_LEN);
    let nonce = aead::Nonce::try_assume_unique_for_key(nonce).map_err(|_| KeystoreError::Crypto)?;
    let key = sealing_key(pass, salt)?;

    let mut buf = Zeroizing::new(sealed.to_vec());
    let plain_len = key
        .open_in_place(nonce, aead::Aad::from(SEALED_MAGIC), &mut buf[..])
        .map_err(|_| KeystoreError::Crypto)?
        .len();
    buf.truncate(plain_len);
    Ok(buf)
}

// ---- filesystem ----

fn restrict_to_owner(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Write through a sibling temp file and rename, so a crash never leaves a
/// half-written key.
fn write_key_file(path: &Path, bytes: &[u8]) -> Result<(), KeystoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_err(dir))?;
    }
    let tmp = path.with_extension("tmp");
    let mut f = fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp)
        .map_err(io_err(&tmp))?;
    restrict_to_owner(&tmp);
    f.write_all(bytes).map_err(io_err(&tmp))?;
    f.sync_all().map_err(io_err(&tmp))?;
    drop(f);
    fs::rename(&tmp, path).map_err(io_err(path))
}

/// File-backed Ed25519 backend.
pub struct FileEd25519Backend {
    keypair: Ed25519KeyPair,
}

impl FileEd25519Backend {
    /// Load the key at `path`, generating one if the file does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, KeystoreError> {
        let pass = passphrase();
        if path.exists() {
            let file = Zeroizing::new(fs::read(path).map_err(io_err(path))?);
            let pkcs8 = if file.starts_with(SEALED_MAGIC) {
                let pass = pass.ok_or(KeystoreError::MissingPassphrase)?;
                unseal(pass.as_bytes(), &file)?
            } else {
                file
            };
            let keypair =
                Ed25519KeyPair::from_pkcs8(&pkcs8).map_err(|_| KeystoreError::InvalidKey)?;
            debug!(path = %path.display(), "signer key loaded");
            return Ok(Self { keypair });
        }

        let doc = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new())
            .map_err(|_| KeystoreError::Crypto)?;
        let pkcs8 = Zeroizing::new(doc.as_ref().to_vec());
        match pass.as_deref() {
            Some(p) => write_key_file(path, &seal(p.as_bytes(), &pkcs8)?)?,
            None => write_key_file(path, &pkcs8)?,
        }
        let keypair = Ed25519KeyPair::from_pkcs8(&pkcs8).map_err(|_| KeystoreError::InvalidKey)?;
        info!(path = %path.display(), sealed = pass.is_some(), "signer key generated");
        Ok(Self { keypair })
    }
}

impl SignerBackend for FileEd25519Backend {
    fn public_key(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.keypair.public_key().as_ref());
        out
    }

    fn sign(&self, msg: &[u8]) -> Result<Signature, KeystoreError> {
        Ok(Signature(self.keypair.sign(msg).as_ref().to_vec()))
    }
}

// ---- throttle and audit ----

/// At most `budget` signatures per fixed window.
#[derive(Debug)]
struct SigningThrottle {
    opened: Instant,
    used: u32,
    budget: u32,
    window: Duration,
}

impl SigningThrottle {
    fn new(budget: u32, window: Duration) -> Self {
        Self { opened: Instant::now(), used: 0, budget, window }
    }

    fn take(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.opened) >= self.window {
            self.opened = now;
            self.used = 0;
        }
        if self.used >= self.budget {
            return false;
        }
        self.used += 1;
        true
    }
}

/// Shift `log`, `log.1`, .. one generation up once `log` passes the size cap.
fn rotate_audit(path: &Path) {
    match fs::metadata(path) {
        Ok(md) if md.len() > AUDIT_MAX_BYTES => {}
        _ => return,
    }
    let generation = |n: usize| PathBuf::from(format!("{}.{n}", path.display()));
    for n in (1..AUDIT_GENERATIONS).rev() {
        let _ = fs::rename(generation(n), generation(n + 1));
    }
    let _ = fs::rename(path, generation(1));
}

fn write_audit(path: &Path, signer: &Address, msg: &[u8]) -> Result<(), KeystoreError> {
    rotate_audit(path);
    let ts = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let line = format!(
        "{{\"ts\":{ts},\"signer\":\"{signer}\",\"msg_sha256\":\"{}\"}}\n",
        H256::digest(msg)
    );
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;
    restrict_to_owner(path);
    f.write_all(line.as_bytes()).map_err(io_err(path))
}

/// Throttled, audited signer.
pub struct Keystore<B: SignerBackend> {
    backend: B,
    address: Address,
    throttle: Mutex<SigningThrottle>,
    audit_path: PathBuf,
}

impl Keystore<FileEd25519Backend> {
    /// Key and audit log under `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, KeystoreError> {
        let dir = data_dir.as_ref();
        let backend = FileEd25519Backend::load_or_create(&dir.join(KEY_FILE_NAME))?;
        Ok(Self::with_backend(backend, dir.join(AUDIT_FILE_NAME)))
    }
}

impl<B: SignerBackend> Keystore<B> {
    /// Wrap an arbitrary backend.
    pub fn with_backend(backend: B, audit_path: PathBuf) -> Self {
        let address = Address::from_public_key(&backend.public_key());
        Self {
            backend,
            address,
            throttle: Mutex::new(SigningThrottle::new(SIGNATURES_PER_WINDOW, THROTTLE_WINDOW)),
            audit_path,
        }
    }

    /// Ed25519 public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.backend.public_key()
    }

    /// Oracle signer address of this key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign `msg`. The audit line is best-effort and never blocks signing.
    pub fn sign(&self, msg: &[u8]) -> Result<Signature, KeystoreError> {
        let allowed = self
            .throttle
            .lock()
            .map(|mut t| t.take(Instant::now()))
            .map_err(|_| KeystoreError::RateLimited)?;
        if !allowed {
            return Err(KeystoreError::RateLimited);
        }
        if let Err(e) = write_audit(&self.audit_path, &self.address, msg) {
            debug!(error = %e, "signer audit write failed");
        }
        self.backend.sign(msg)
    }
}

/// Verify an Ed25519 signature against raw public key bytes.
pub fn verify_pubkey_bytes(
    pk_bytes: &[u8; 32],
    msg: &[u8],
    sig: &Signature,
) -> Result<(), KeystoreError> {
    if sig.0.len() != 64 {
        return Err(KeystoreError::BadSignature);
    }
    UnparsedPublicKey::new(&ED25519, pk_bytes)
        .verify(msg, &sig.0)
        .map_err(|_| KeystoreError::BadSignature)
}
