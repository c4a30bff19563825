use std::{net::SocketAddr, path::Path};

use anyhow::{anyhow, Context, Result};
use blob_store::{PrefixRouter, StorageConfig};
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use remote_reader::RemoteReaderConfig;
use serde::{Deserialize, Serialize};

use crate::upload::UploadToken;

/// `robots.txt` contents and the target of the `/` redirect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeoConfig {
    pub host_name: String,
    pub site_map: String,
}

/// Write-once uploads into one container of the storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadConfig {
    pub container: String,
    /// Bearer tokens allowed to upload.
    pub tokens: Vec<UploadToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub structured_logging: bool,
    pub storage: StorageConfig,
    pub remote_reader: Option<RemoteReaderConfig>,
    pub seo: Option<SeoConfig>,
    pub upload: Option<UploadConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: "0.0.0.0:8900".to_string(),
            structured_logging: false,
            storage: StorageConfig::default(),
            remote_reader: None,
            seo: None,
            upload: None,
        }
    }
}

impl ServerConfig {
    /// YAML file (if any), then `IMAGESTORE_*` environment variables with
    /// `__` between nested keys.
    pub fn load(path: Option<&Path>) -> Result<ServerConfig> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            let config_str = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            figment = figment.merge(Yaml::string(&config_str));
        }
        let config: ServerConfig = figment
            .merge(Env::prefixed("IMAGESTORE_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow!("invalid listen address: {}", self.listen_addr));
        }
        PrefixRouter::new(&self.storage.mappings).context("invalid storage mapping")?;
        self.storage.cache.validate()?;
        if let Some(remote_reader) = &self.remote_reader {
            remote_reader.validate().context("invalid remote_reader config")?;
        }
        if let Some(seo) = &self.seo {
            if seo.host_name.trim().is_empty() {
                return Err(anyhow!("seo.host_name cannot be empty"));
            }
        }
        if let Some(upload) = &self.upload {
            if upload.container.trim().is_empty() {
                return Err(anyhow!("upload.container cannot be empty"));
            }
            if upload.tokens.is_empty() || upload.tokens.iter().any(UploadToken::is_empty) {
                return Err(anyhow!("upload needs at least one non-empty token"));
            }
        }
        Ok(())
    }
}
