use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand_core::{OsRng, RngCore};
use realm_core::ItemId;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::session::{CredentialStore, Credentials};

const ENC_PREFIX: &str = "enc:";

/// Credential file with both tokens encrypted at rest.
///
/// Layout: `{"access_token": "enc:...", "refresh_token": "enc:...", "user_id": 7}`.
/// Plaintext tokens written by hand are accepted and re-encrypted on the next
/// save.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
    secret: String,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, secret: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            secret: secret.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_token(&self, raw: &str) -> Result<String> {
        match raw.strip_prefix(ENC_PREFIX) {
            Some(rest) => decrypt_token(&self.secret, rest),
            None => Ok(raw.to_string()),
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&self.path)
            .await
            .with_context(|| format!("read credentials file: {}", self.path.display()))?;
        let root: Value = serde_json::from_slice(&raw).context("parse credentials json")?;

        let access_raw = match root.get("access_token").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => s,
            _ => return Ok(None),
        };
        let access_token = self.open_token(access_raw)?;
        let refresh_token = root
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(|s| self.open_token(s))
            .transpose()?;
        let user_id = root.get("user_id").and_then(ItemId::from_value);

        Ok(Some(Credentials {
            access_token,
            refresh_token,
            user_id,
        }))
    }

    async fn save(&self, creds: &Credentials) -> Result<()> {
        let access = encrypt_token(&self.secret, &creds.access_token)?;
        let refresh = creds
            .refresh_token
            .as_deref()
            .map(|t| encrypt_token(&self.secret, t))
            .transpose()?;
        let root = json!({
            "access_token": format!("{}{}", ENC_PREFIX, access),
            "refresh_token": refresh.map(|r| format!("{}{}", ENC_PREFIX, r)),
            "user_id": creds.user_id,
        });
        write_atomic(&self.path, &root).await
    }

    async fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .await
                .with_context(|| format!("remove credentials file: {}", self.path.display()))?;
        }
        Ok(())
    }
}

fn encrypt_token(secret: &str, plaintext: &str) -> Result<String> {
    let cipher = build_cipher(secret);
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let mut ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|err| anyhow!("encrypt token: {}", err))?;

    let mut combined = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.append(&mut ciphertext);

    Ok(BASE64_STANDARD.encode(combined))
}

fn decrypt_token(secret: &str, encoded: &str) -> Result<String> {
    let cipher = build_cipher(secret);
    let data = BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map_err(|err| anyhow!("decode encrypted token: {}", err))?;
    if data.len() < 12 {
        return Err(anyhow!("encrypted token too short"));
    }
    let (nonce_bytes, ciphertext) = data.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| anyhow!("failed to decrypt token; check REALM_CONFIG_SECRET"))?;
    String::from_utf8(plaintext).map_err(|err| anyhow!("decrypted token not utf-8: {}", err))
}

fn build_cipher(secret: &str) -> ChaCha20Poly1305 {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    let key = Key::from_slice(&digest);
    ChaCha20Poly1305::new(key)
}

/// Writes pretty JSON through a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, value: &Value) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value).context("serialize json")?;
    bytes.push(b'\n');
    let tmp_path = temp_path(path);
    fs::write(&tmp_path, &bytes)
        .await
        .with_context(|| format!("write temp file: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("replace file: {}", path.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".tmp");
    os_string.into()
}
