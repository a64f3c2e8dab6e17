//! Remote and dynamic resources.
//!
//! Both go through a [`Fetch`] implementation and a bounded timeout, so a
//! hung endpoint or generator surfaces as [`ResourceError::TimedOut`]
//! instead of blocking a request thread forever.

use crossbeam::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{ResourceError, ResourceMode, ResourceSource};

/// Produces the bytes of a remote URL or generated document.
pub trait Fetch: Send + Sync {
    fn fetch(&self, target: &str) -> Result<Vec<u8>, String>;
}

impl<F> Fetch for F
where
    F: Fn(&str) -> Result<Vec<u8>, String> + Send + Sync,
{
    fn fetch(&self, target: &str) -> Result<Vec<u8>, String> {
        self(target)
    }
}

// ============================================================================
// HttpFetcher
// ============================================================================

/// Blocking HTTP GET via reqwest.
///
/// With an origin, relative targets (dynamic resources served by the same
/// application) are joined onto it.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    origin: Option<url::Url>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            origin: None,
        })
    }

    pub fn with_origin(mut self, origin: url::Url) -> Self {
        self.origin = Some(origin);
        self
    }

    fn target_url(&self, target: &str) -> Result<url::Url, String> {
        match &self.origin {
            Some(origin) => origin
                .join(target.trim_start_matches('~'))
                .map_err(|e| e.to_string()),
            None => url::Url::parse(target).map_err(|e| e.to_string()),
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, target: &str) -> Result<Vec<u8>, String> {
        let url = self.target_url(target)?;
        let response = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| e.to_string())?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| e.to_string())
    }
}

// ============================================================================
// FetchSource
// ============================================================================

/// [`ResourceSource`] adapter running a [`Fetch`] under a timeout.
pub struct FetchSource {
    fetch: Arc<dyn Fetch>,
    timeout: Duration,
    mode: ResourceMode,
}

impl FetchSource {
    /// Source for [`ResourceMode::Remote`] resources.
    pub fn remote(fetch: Arc<dyn Fetch>, timeout: Duration) -> Self {
        Self {
            fetch,
            timeout,
            mode: ResourceMode::Remote,
        }
    }

    /// Source for [`ResourceMode::Dynamic`] resources.
    pub fn dynamic(fetch: Arc<dyn Fetch>, timeout: Duration) -> Self {
        Self {
            fetch,
            timeout,
            mode: ResourceMode::Dynamic,
        }
    }
}

impl ResourceSource for FetchSource {
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let (tx, rx) = channel::bounded(1);
        let fetch = Arc::clone(&self.fetch);
        let target = path.to_string();
        // Detached: an overrunning fetch finishes into a dropped channel.
        thread::spawn(move || {
            let _ = tx.send(fetch.fetch(&target));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(reason)) if self.mode == ResourceMode::Dynamic => Err(ResourceError::Generator {
                path: path.to_string(),
                reason,
            }),
            Ok(Err(reason)) => Err(ResourceError::unavailable(path, reason)),
            Err(channel::RecvTimeoutError::Timeout) => Err(ResourceError::TimedOut {
                path: path.to_string(),
                timeout: self.timeout,
            }),
            Err(channel::RecvTimeoutError::Disconnected) => {
                Err(ResourceError::unavailable(path, "fetch worker panicked"))
            }
        }
    }
}
