use parking_lot::RwLock;
use serde::Deserialize;
use std::{
    collections::HashSet,
    net::IpAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs;
use tracing::{error, info};

// -----------------------------------------------------------------------------
// ----- Allowlist -------------------------------------------------------------

/// Client IPs admitted by the gateway. Cheap to clone; clones share the set.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    inner: Arc<RwLock<HashSet<IpAddr>>>,
}

// -----------------------------------------------------------------------------
// ----- Allowlist: Static -----------------------------------------------------

impl Allowlist {
    pub fn new(ips: impl IntoIterator<Item = IpAddr>) -> Self {
        let set = ips.into_iter().map(|ip| ip.to_canonical()).collect();

        Self {
            inner: Arc::new(RwLock::new(set)),
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self, AllowlistError> {
        let set = Self::read(path).await?;

        Ok(Self {
            inner: Arc::new(RwLock::new(set)),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Allowlist: Public -----------------------------------------------------

impl Allowlist {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.inner.read().contains(&ip.to_canonical())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Reload: on error, DO NOT swap; keep the current set and log.
    pub async fn reload(&self, path: &Path) {
        let next = match Self::read(path).await {
            Ok(set) => set,
            Err(e) => {
                error!(
                    "reload failed; keeping previous allowlist. path={:?} error={}",
                    path, e
                );
                return;
            }
        };

        let count = next.len();
        *self.inner.write() = next;
        info!("allowlist reloaded: {count} entries");
    }
}

// -----------------------------------------------------------------------------
// ----- Allowlist: Private ----------------------------------------------------

impl Allowlist {
    async fn read(path: &Path) -> Result<HashSet<IpAddr>, AllowlistError> {
        let raw = fs::read_to_string(path)
            .await
            .map_err(|e| AllowlistError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Result<HashSet<IpAddr>, AllowlistError> {
        let doc: AllowlistFile =
            toml::from_str(raw).map_err(|e| AllowlistError::Toml { source: e })?;

        let mut set = HashSet::with_capacity(doc.ips.len());
        for entry in doc.ips {
            let ip: IpAddr = entry
                .trim()
                .parse()
                .map_err(|_| AllowlistError::InvalidIp(entry.clone()))?;

            if !set.insert(ip.to_canonical()) {
                return Err(AllowlistError::DuplicateIp(entry));
            }
        }

        Ok(set)
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct AllowlistFile {
    #[serde(default)]
    ips: Vec<String>,
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AllowlistError {
    #[error("invalid ip address '{0}'")]
    InvalidIp(String),

    #[error("duplicate allowlist entry '{0}'")]
    DuplicateIp(String),

    #[error("read error for {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
