//! HTTP responses for engine outcomes.
//!
//! Handlers build a [`Reply`]; [`send`] turns it into a tiny_http response.

use anyhow::{Result, anyhow};
use std::time::SystemTime;
use tiny_http::{Header, Request, Response, StatusCode};

use crate::compress::Encoding;
use crate::utils::date::DateTimeUtc;
use crate::utils::mime::types::{JSON, PLAIN};
use crate::vary::RequestContext;
use crate::workflow::{DebugListing, ProcessError, Served};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn with_body(mut self, content_type: &'static str, body: Vec<u8>) -> Self {
        self.body = body;
        self.with_header("Content-Type", content_type)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 200 with the artifact, or 304 when the request's validators match.
    pub fn artifact(served: &Served, cx: &RequestContext) -> Self {
        let artifact = &served.artifact;
        // Weak: gzip and identity bodies of one version share the tag.
        let etag = format!("W/\"{}\"", artifact.version);
        let status = if is_not_modified(&artifact.version, artifact.last_modified, cx) {
            304
        } else {
            200
        };

        let mut reply = Self::new(status)
            .with_header("ETag", etag)
            .with_header(
                "Cache-Control",
                format!("public, max-age={}", served.max_age.as_secs()),
            )
            .with_header("Vary", "Accept-Encoding");
        if let Some(modified) = artifact.last_modified {
            reply = reply.with_header(
                "Last-Modified",
                DateTimeUtc::from_system_time(modified).to_rfc2822(),
            );
        }
        if status == 304 {
            return reply;
        }
        if artifact.encoding != Encoding::Identity {
            reply = reply.with_header("Content-Encoding", artifact.encoding.as_str());
        }
        reply.with_body(artifact.content_type, artifact.content.to_vec())
    }

    /// Debug bypass listing; never cached by clients.
    pub fn listing(listing: &DebugListing) -> Self {
        match serde_json::to_vec_pretty(listing) {
            Ok(body) => Self::new(200)
                .with_header("Cache-Control", "no-cache")
                .with_body(JSON, body),
            Err(e) => Self::plain(500, &format!("cannot encode listing: {e}")),
        }
    }

    pub fn redirect(location: String) -> Self {
        Self::new(302)
            .with_header("Location", location)
            .with_header("Cache-Control", "no-cache")
    }

    pub fn error(error: &ProcessError) -> Self {
        let reply = Self::plain(error.status_code(), &error.to_string());
        if error.is_retryable() {
            reply.with_header("Retry-After", "1")
        } else {
            reply
        }
    }

    pub fn not_found() -> Self {
        Self::plain(404, "404 Not Found")
    }

    pub fn method_not_allowed() -> Self {
        Self::plain(405, "405 Method Not Allowed").with_header("Allow", "GET, HEAD")
    }

    pub fn unavailable() -> Self {
        Self::plain(503, "503 Service Unavailable")
    }

    fn plain(status: u16, message: &str) -> Self {
        Self::new(status).with_body(PLAIN, message.as_bytes().to_vec())
    }
}

/// `If-None-Match` decides when present (weak comparison); otherwise
/// `If-Modified-Since`.
fn is_not_modified(version: &str, last_modified: Option<SystemTime>, cx: &RequestContext) -> bool {
    if let Some(tags) = cx.header("if-none-match") {
        return tags
            .split(',')
            .map(|t| t.trim())
            .any(|t| t == "*" || t.trim_start_matches("W/").trim_matches('"') == version);
    }
    match (cx.header("if-modified-since"), last_modified) {
        (Some(since), Some(modified)) => DateTimeUtc::parse_http(since)
            .is_some_and(|since| DateTimeUtc::from_system_time(modified) <= since),
        _ => false,
    }
}

pub fn send(request: Request, reply: Reply, head_only: bool) -> Result<()> {
    let mut headers = Vec::with_capacity(reply.headers.len());
    for (name, value) in &reply.headers {
        let header = Header::from_bytes(*name, value.as_str())
            .map_err(|()| anyhow!("invalid header {name}: {value}"))?;
        headers.push(header);
    }

    let status = StatusCode(reply.status);
    if head_only || reply.status == 304 {
        let mut response = Response::empty(status);
        for header in headers {
            response.add_header(header);
        }
        request.respond(response)?;
    } else {
        let mut response = Response::from_data(reply.body).with_status_code(status);
        for header in headers {
            response.add_header(header);
        }
        request.respond(response)?;
    }
    Ok(())
}
