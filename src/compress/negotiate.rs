//! Accept-Encoding parsing and compressor selection.

use std::sync::Arc;

use super::{Compressor, Encoding, IdentityCompressor};

/// A parsed Accept-Encoding header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptEncoding {
    entries: Vec<(String, f32)>,
}

impl AcceptEncoding {
    /// Parse a header such as `gzip;q=0.8, deflate, *;q=0`.
    ///
    /// Entries with an unparsable q-value keep the default weight of 1.
    pub fn parse(header: &str) -> Self {
        let entries = header
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.split(';');
                let coding = parts.next()?.trim().to_ascii_lowercase();
                if coding.is_empty() {
                    return None;
                }
                let quality = parts
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .unwrap_or(1.0)
                    .clamp(0.0, 1.0);
                Some((coding, quality))
            })
            .collect();
        Self { entries }
    }

    /// Weight the client gives `encoding`; explicit entries beat `*`.
    ///
    /// Identity is acceptable unless explicitly refused.
    pub fn quality(&self, encoding: Encoding) -> f32 {
        let name = encoding.as_str();
        if let Some((_, q)) = self.entries.iter().find(|(c, _)| c == name) {
            return *q;
        }
        if let Some((_, q)) = self.entries.iter().find(|(c, _)| c == "*") {
            return *q;
        }
        if encoding == Encoding::Identity { 1.0 } else { 0.0 }
    }
}

/// Pick the compressor to use for a request.
///
/// The highest positive weight wins, ties go to declaration order and
/// identity is the fallback.
pub fn negotiate(accept_encoding: &str, compressors: &[Arc<dyn Compressor>]) -> Arc<dyn Compressor> {
    let accept = AcceptEncoding::parse(accept_encoding);
    let mut best: Option<(&Arc<dyn Compressor>, f32)> = None;
    for compressor in compressors {
        let q = accept.quality(compressor.encoding());
        if q <= 0.0 {
            continue;
        }
        if best.is_none_or(|(_, current)| q > current) {
            best = Some((compressor, q));
        }
    }
    match best {
        Some((compressor, _)) => Arc::clone(compressor),
        None => Arc::new(IdentityCompressor),
    }
}
