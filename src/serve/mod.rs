//! HTTP front-end: maps `GET {url}/{name}/{version}/{vary...}` onto
//! [`Engine::process`].
//!
//! | Outcome                  | Response                                 |
//! |--------------------------|------------------------------------------|
//! | artifact                 | 200, or 304 on matching validators       |
//! | debug bypass             | 200 JSON listing of resource URLs        |
//! | stale version            | 302 to the current URL                   |
//! | unknown set / path       | 404                                      |
//! | anything else            | [`ProcessError::status_code`]            |

mod lifecycle;
mod response;
mod route;

pub use lifecycle::setup_shutdown_handler;
pub use response::Reply;
pub use route::Route;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tiny_http::{Method, Request, Server};

use crate::config::ServeSection;
use crate::vary::RequestContext;
use crate::workflow::{Engine, Outcome, ProcessError, ProcessRequest};
use crate::{debug, log, watch};

/// Request handler threads.
const WORKERS: usize = 4;

/// Bound server ready to accept requests
pub struct BoundServer {
    server: Arc<Server>,
    addr: SocketAddr,
    watch: bool,
}

/// Bind the HTTP server without starting the request loop.
pub fn bind(section: &ServeSection) -> Result<BoundServer> {
    let (server, addr) = lifecycle::bind_with_retry(section.interface, section.port)?;
    let server = Arc::new(server);
    lifecycle::register_server(Arc::clone(&server));
    log!("serve"; "http://{}", addr);

    Ok(BoundServer {
        server,
        addr,
        watch: section.watch,
    })
}

impl BoundServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the request loop (blocking until shutdown).
    pub fn run(self, engine: Arc<Engine>) -> Result<()> {
        let watcher = if self.watch {
            match watch::spawn(Arc::clone(&engine)) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log!("watch"; "disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        run_request_loop(&self.server, &engine)?;

        if let Some(watcher) = watcher {
            watcher.stop();
        }
        Ok(())
    }
}

fn run_request_loop(server: &Server, engine: &Arc<Engine>) -> Result<()> {
    // Builds can be slow; a pool keeps one cold set from blocking others.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(WORKERS)
        .thread_name(|i| format!("combiner-http-{i}"))
        .build()
        .context("failed to create request thread pool")?;

    for request in server.incoming_requests() {
        let engine = Arc::clone(engine);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &engine) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

/// Handle a single HTTP request
fn handle_request(request: Request, engine: &Engine) -> Result<()> {
    if lifecycle::is_shutdown() {
        return response::send(request, Reply::unavailable(), false);
    }

    let head_only = match request.method() {
        Method::Get => false,
        Method::Head => true,
        _ => return response::send(request, Reply::method_not_allowed(), false),
    };

    let cx = request
        .headers()
        .iter()
        .fold(RequestContext::new(), |cx, h| {
            cx.with_header(h.field.as_str().as_str(), h.value.as_str())
        });
    let reply = dispatch(engine, request.url(), cx);
    debug!("serve"; "{} {}", reply.status, request.url());
    response::send(request, reply, head_only)
}

/// Answer a request for `url`; `cx` carries the request headers.
pub fn dispatch(engine: &Engine, url: &str, cx: RequestContext) -> Reply {
    let Some(route) = route::parse(url, engine.settings().url_prefix()) else {
        return Reply::not_found();
    };

    let accept_encoding = cx.header("accept-encoding").unwrap_or_default().to_string();
    let request = ProcessRequest::new(route.set, route.version)
        .context(cx.with_vary_segments(route.vary))
        .accept_encoding(accept_encoding);

    match engine.process(&request) {
        Ok(Outcome::Artifact(served)) => Reply::artifact(&served, &request.context),
        Ok(Outcome::Debug(listing)) => Reply::listing(&listing),
        Err(ProcessError::VersionMismatch { .. }) => {
            match engine.resolve_url(&request.set, &request.context) {
                Ok(location) => Reply::redirect(location),
                Err(e) => error_reply(&e),
            }
        }
        Err(e) => error_reply(&e),
    }
}

fn error_reply(error: &ProcessError) -> Reply {
    if error.status_code() >= 500 {
        log!("serve"; "{}", error);
    }
    Reply::error(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::{Compressor, Encoding, GzipCompressor, IdentityCompressor};
    use crate::resource::{EmbeddedSource, Resource, ResourceMode};
    use crate::set::{ResourceSet, ResourceType, SetRegistry};
    use crate::vary::AcceptLanguageVary;
    use crate::workflow::Settings;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::time::{Duration, SystemTime};

    fn engine(source: &Arc<EmbeddedSource>) -> Engine {
        let embedded = |path: &str| Resource::new(path, ResourceMode::Embedded, source.clone());
        let app = ResourceSet::builder("app.js", ResourceType::Script)
            .resource(embedded("a.js"))
            .resource(embedded("b.js"))
            .compressors(vec![
                Arc::new(GzipCompressor::default()) as Arc<dyn Compressor>,
                Arc::new(IdentityCompressor),
            ])
            .max_age(Duration::from_secs(120))
            .build()
            .unwrap();
        let site = ResourceSet::builder("site.css", ResourceType::Stylesheet)
            .resource(embedded("site.css"))
            .vary(Arc::new(AcceptLanguageVary::new("en", ["en", "fr"])))
            .build()
            .unwrap();
        let debug = ResourceSet::builder("debug.js", ResourceType::Script)
            .resource(embedded("a.js"))
            .debug(true, true)
            .build()
            .unwrap();
        Engine::new(
            Settings::default(),
            SetRegistry::try_from(vec![app, site, debug]).unwrap(),
        )
    }

    fn source() -> Arc<EmbeddedSource> {
        Arc::new(
            EmbeddedSource::new()
                .with("a.js", b"var a=1;".to_vec())
                .with("b.js", b"var b=2;".to_vec())
                .with("site.css", b"body{}".to_vec()),
        )
    }

    #[test]
    fn test_dispatch_artifact_headers() {
        let source = source();
        let engine = engine(&source);
        let url = engine.resolve_url("app.js", &RequestContext::new()).unwrap();

        let reply = dispatch(&engine, &url, RequestContext::new());
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, b"var a=1;var b=2;");
        assert_eq!(reply.header("content-type"), Some("text/javascript; charset=utf-8"));
        assert_eq!(reply.header("cache-control"), Some("public, max-age=120"));
        assert_eq!(reply.header("vary"), Some("Accept-Encoding"));
        assert_eq!(reply.header("content-encoding"), None);

        let version = url.trim_end_matches('/').rsplit('/').next().unwrap();
        assert_eq!(reply.header("etag"), Some(format!("W/\"{version}\"").as_str()));
    }

    #[test]
    fn test_dispatch_gzip() {
        let source = source();
        let engine = engine(&source);
        let url = engine.resolve_url("app.js", &RequestContext::new()).unwrap();

        let cx = RequestContext::new().with_header("Accept-Encoding", "gzip, deflate");
        let reply = dispatch(&engine, &url, cx);
        assert_eq!(reply.header("content-encoding"), Some(Encoding::Gzip.as_str()));

        let mut body = String::new();
        GzDecoder::new(reply.body.as_slice())
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "var a=1;var b=2;");
    }

    #[test]
    fn test_dispatch_not_modified() {
        let source = source();
        let engine = engine(&source);
        let url = engine.resolve_url("app.js", &RequestContext::new()).unwrap();
        let etag = dispatch(&engine, &url, RequestContext::new())
            .header("etag")
            .unwrap()
            .to_string();

        let cx = RequestContext::new().with_header("If-None-Match", format!("W/\"x\", {etag}"));
        let reply = dispatch(&engine, &url, cx);
        assert_eq!(reply.status, 304);
        assert!(reply.body.is_empty());
        assert_eq!(reply.header("etag"), Some(etag.as_str()));

        // Strong form of the same tag matches under weak comparison.
        let strong = etag.trim_start_matches("W/").to_string();
        let cx = RequestContext::new()
            .with_header("If-None-Match", strong)
            .with_header("Accept-Encoding", "gzip");
        let reply = dispatch(&engine, &url, cx);
        assert_eq!(reply.status, 304);
        assert_eq!(reply.header("etag"), Some(etag.as_str()));
    }

    #[test]
    fn test_dispatch_if_modified_since_without_mtime() {
        let source = source();
        let engine = engine(&source);
        let url = engine.resolve_url("app.js", &RequestContext::new()).unwrap();

        // Embedded resources carry no modification time.
        assert_eq!(dispatch(&engine, &url, RequestContext::new()).header("last-modified"), None);
        let since = crate::utils::date::DateTimeUtc::from_system_time(SystemTime::now());
        let cx = RequestContext::new().with_header("If-Modified-Since", since.to_rfc2822());
        assert_eq!(dispatch(&engine, &url, cx).status, 200);
    }

    #[test]
    fn test_dispatch_stale_version_redirects() {
        let source = source();
        let engine = engine(&source);
        let old = engine.resolve_url("app.js", &RequestContext::new()).unwrap();

        source.insert("a.js", b"var a=2;".to_vec());
        let reply = dispatch(&engine, &old, RequestContext::new());
        assert_eq!(reply.status, 302);
        let location = reply.header("location").unwrap();
        assert_ne!(location, old);
        assert_eq!(dispatch(&engine, location, RequestContext::new()).body, b"var a=2;var b=2;");
    }

    #[test]
    fn test_dispatch_redirect_keeps_vary_segments() {
        let source = source();
        let engine = engine(&source);
        let reply = dispatch(&engine, "/combres/site.css/bogus/fr", RequestContext::new());
        assert_eq!(reply.status, 302);
        assert!(reply.header("location").unwrap().ends_with("/fr"));
    }

    #[test]
    fn test_dispatch_not_found() {
        let source = source();
        let engine = engine(&source);
        assert_eq!(dispatch(&engine, "/combres/nope.js/v1/", RequestContext::new()).status, 404);
        assert_eq!(dispatch(&engine, "/elsewhere", RequestContext::new()).status, 404);
        assert_eq!(engine.stats().misses, 0);
    }

    #[test]
    fn test_dispatch_debug_listing() {
        let source = source();
        let engine = engine(&source);
        let reply = dispatch(&engine, "/combres/debug.js/", RequestContext::new());
        assert_eq!(reply.status, 200);
        assert_eq!(reply.header("content-type"), Some("application/json"));

        let json: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(json["set"], "debug.js");
        assert_eq!(json["type"], "js");
        assert_eq!(json["resources"][0]["path"], "a.js");
    }

    #[test]
    fn test_dispatch_unavailable_is_retryable() {
        let source = source();
        let engine = engine(&source);
        source.remove("b.js");
        let reply = dispatch(&engine, "/combres/app.js/v1/", RequestContext::new());
        assert_eq!(reply.status, 503);
        assert_eq!(reply.header("retry-after"), Some("1"));
    }
}
