/// Resource retrieval
///
/// Turns a registered URL into raw bytes. `http(s)://` goes over the network,
/// `file://` and bare paths are read from disk.
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::FetchError;

/// Retrieves raw bytes for a URL
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher for HTTP(S) URLs and local files
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
    base_dir: Option<PathBuf>,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            base_dir: None,
            user_agent: format!("soundbus/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Resolve relative paths against `dir`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = match ureq::get(url)
            .set("User-Agent", &self.user_agent)
            .timeout(self.timeout)
            .call()
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, _)) => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                })
            }
            Err(e) => return Err(FetchError::Network(e.to_string())),
        };

        let mut bytes = Vec::new();
        response.into_reader().read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn fetch_file(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve_path(path);
        if !path.exists() {
            return Err(FetchError::NotFound(path.display().to_string()));
        }
        Ok(std::fs::read(&path)?)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_http(url)?
        } else {
            self.fetch_file(url.strip_prefix("file://").unwrap_or(url))?
        };

        tracing::debug!("Fetched {} ({} bytes)", url, bytes.len());
        Ok(bytes)
    }
}

/// Fetcher serving bytes from memory, for embedded assets
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `url`, replacing any previous entry
    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.entries.write().insert(url.into(), bytes);
    }

    pub fn remove(&self, url: &str) {
        self.entries.write().remove(url);
    }
}

impl ResourceFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.entries
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}
