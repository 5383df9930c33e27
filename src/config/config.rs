use clap::Parser;
use parking_lot::RwLock;
use std::{
    fs,
    path::Path,
    sync::{Arc, OnceLock},
};

use super::{
    cli::Args,
    types::{LogLevel, Mode},
};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static ROOT_CONFIG: OnceLock<Arc<RwLock<Config>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: LogLevel,
    pub mode: Mode,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Parse CLI/ENV once. Panics on bad input; there is nothing to run without it.
    pub fn init() {
        ROOT_CONFIG.get_or_init(|| {
            let cfg = Self::from_args();
            cfg.validate();
            Arc::new(RwLock::new(cfg))
        });
    }

    pub fn snapshot() -> Config {
        Self::handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    fn from_args() -> Self {
        let args = Args::try_parse().unwrap_or_else(|e| e.exit());

        Self {
            log_level: args.log_level,
            mode: args.into_mode(),
        }
    }

    fn validate(&self) {
        match &self.mode {
            Mode::Gateway(g) => {
                must_exist_file(&g.tls_cert, "--tls-cert");
                must_exist_file(&g.tls_key, "--tls-key");
                if let Some(path) = &g.allowlist_file {
                    must_exist_file(path, "--allowlist");
                }
            }
            Mode::Client(c) => {
                if let Some(path) = &c.ca_file {
                    must_exist_file(path, "--ca-file");
                }
                if c.ca_file.is_none() && !c.insecure {
                    panic!("--ca-file is required unless --insecure is given");
                }
            }
        }
    }

    fn handle() -> Arc<RwLock<Config>> {
        ROOT_CONFIG
            .get()
            .expect("Config not initialized; call Config::init() first")
            .clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn must_exist_file(path: &Path, hint: &str) {
    let md = fs::metadata(path).unwrap_or_else(|_| {
        panic!("required file missing: {} (from {hint})", path.display());
    });

    if !md.is_file() {
        panic!("path is not a file: {} (from {hint})", path.display());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
