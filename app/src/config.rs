use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use realm::{local_store::write_atomic, ClientConfig};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::info;

pub const ENV_BASE_URL: &str = "REALM_API_BASE_URL";
pub const ENV_SECRET: &str = "REALM_CONFIG_SECRET";
const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

/// Everything the binary needs, resolved from the config file and env.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub client: ClientConfig,
    /// Encrypted token file; relative paths resolve against the config dir.
    pub credentials_path: PathBuf,
    pub config_secret: String,
}

/// Reads `config_path` (a missing file means all defaults) and applies the
/// `REALM_API_BASE_URL` and `REALM_CONFIG_SECRET` overrides. When neither
/// the env nor the file carries a secret, a random one is generated and
/// written back to the file.
pub async fn load_config(config_path: &Path) -> Result<AppConfig> {
    load_config_with(config_path, |key| env::var(key).ok()).await
}

pub async fn load_config_with<F>(config_path: &Path, env_var: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut disk_cfg = if config_path.exists() {
        let raw = fs::read(config_path)
            .await
            .with_context(|| format!("read config file: {}", config_path.display()))?;
        serde_json::from_slice::<Value>(&raw).context("parse config json")?
    } else {
        Value::Object(Map::new())
    };
    let obj = disk_cfg
        .as_object_mut()
        .ok_or_else(|| anyhow!("config root must be a JSON object"))?;

    let mut client: ClientConfig = match obj.get("client") {
        Some(v) => serde_json::from_value(v.clone()).context("parse client section")?,
        None => ClientConfig::default(),
    };
    if let Some(url) = env_var(ENV_BASE_URL) {
        let trimmed = url.trim();
        if !trimmed.is_empty() {
            client.http.base_url = trimmed.to_string();
        }
    }

    let credentials_path = match obj.get("credentials_path") {
        Some(Value::String(p)) => PathBuf::from(p),
        Some(_) => return Err(anyhow!("credentials_path must be a string")),
        None => PathBuf::from(DEFAULT_CREDENTIALS_FILE),
    };
    let credentials_path = if credentials_path.is_relative() {
        config_path
            .parent()
            .map(|dir| dir.join(&credentials_path))
            .unwrap_or(credentials_path)
    } else {
        credentials_path
    };

    let (config_secret, generated) = match env_var(ENV_SECRET).filter(|s| !s.is_empty()) {
        Some(secret) => (secret, false),
        None => match obj.get("config_secret") {
            Some(Value::String(secret)) if !secret.is_empty() => (secret.clone(), false),
            Some(Value::String(_)) | None => {
                let secret = generate_secret();
                obj.insert("config_secret".to_string(), Value::String(secret.clone()));
                (secret, true)
            }
            Some(_) => return Err(anyhow!("config_secret must be a string")),
        },
    };

    if generated {
        write_atomic(config_path, &disk_cfg).await?;
        info!("persisted generated config secret: {}", config_path.display());
    }

    Ok(AppConfig {
        client,
        credentials_path,
        config_secret,
    })
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 24];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
