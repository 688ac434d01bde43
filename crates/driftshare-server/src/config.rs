use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use driftshare_registry::{MemoryStore, ShareStore, SqliteStore, sweep_interval};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => bail!("unknown store {:?} (expected memory or sqlite)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store: StoreKind,
    pub db_path: PathBuf,
    pub sweep_interval: Duration,
}

impl Config {
    /// Read `DRIFTSHARE_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("DRIFTSHARE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("DRIFTSHARE_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("DRIFTSHARE_PORT is not a valid port")?;
        let store = match lookup("DRIFTSHARE_STORE") {
            Some(v) => v.parse()?,
            None => StoreKind::Memory,
        };
        let db_path: PathBuf = lookup("DRIFTSHARE_DB_PATH")
            .unwrap_or_else(|| "driftshare.db".into())
            .into();
        let sweep_secs: u64 = lookup("DRIFTSHARE_SWEEP_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        Ok(Self {
            host,
            port,
            store,
            db_path,
            sweep_interval: sweep_interval(sweep_secs),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn open_store(&self) -> Result<Arc<dyn ShareStore>> {
        Ok(match self.store {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::Sqlite => Arc::new(
                SqliteStore::open(&self.db_path)
                    .with_context(|| format!("opening {}", self.db_path.display()))?,
            ),
        })
    }
}
