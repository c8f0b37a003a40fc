//! Endpoint parsing and transport kind selection.

use crate::error::{StreamError, StreamResult};
use std::fmt;

/// Which concrete transport drives a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Bidirectional WebSocket.
    Duplex,
    /// Unidirectional server push (Server-Sent Events over HTTP).
    Push,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplex => write!(f, "duplex"),
            Self::Push => write!(f, "push"),
        }
    }
}

/// A live-update endpoint with its transport kind resolved once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    kind: TransportKind,
}

impl Endpoint {
    /// Parse an endpoint URL or an origin-relative path.
    ///
    /// `ws://` / `wss://` schemes and any `/ws/` path segment select the
    /// duplex transport. Everything else is served as a push stream.
    /// A `/ws/` path on an `http(s)` URL is rewritten to the matching
    /// `ws(s)` scheme so it can be dialled directly. Relative paths keep
    /// their kind and must be joined with [`Endpoint::with_base`] before a
    /// network transport can dial them.
    pub fn parse(url: impl Into<String>) -> StreamResult<Self> {
        let url = url.into();
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(StreamError::InvalidEndpoint("empty url".to_string()));
        }

        if trimmed.starts_with('/') {
            let kind = if has_ws_hint(trimmed) {
                TransportKind::Duplex
            } else {
                TransportKind::Push
            };
            return Ok(Self {
                url: trimmed.to_string(),
                kind,
            });
        }

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => {
                return Err(StreamError::InvalidEndpoint(format!(
                    "missing scheme: {trimmed}"
                )))
            }
        };
        let path = rest.find('/').map(|idx| &rest[idx..]).unwrap_or("");

        let (url, kind) = match scheme.as_str() {
            "ws" | "wss" => (format!("{scheme}://{rest}"), TransportKind::Duplex),
            "http" | "https" if has_ws_hint(path) => {
                let ws_scheme = if scheme == "https" { "wss" } else { "ws" };
                (format!("{ws_scheme}://{rest}"), TransportKind::Duplex)
            }
            "http" | "https" => (format!("{scheme}://{rest}"), TransportKind::Push),
            other => {
                return Err(StreamError::InvalidEndpoint(format!(
                    "unsupported scheme: {other}"
                )))
            }
        };

        Ok(Self { url, kind })
    }

    /// Join a relative endpoint onto a base URL (e.g. `https://host:8080`).
    ///
    /// Absolute endpoints are returned unchanged.
    pub fn with_base(self, base: &str) -> StreamResult<Self> {
        if !self.is_relative() {
            return Ok(self);
        }
        let joined = format!("{}{}", base.trim_end_matches('/'), self.url);
        let resolved = Self::parse(joined)?;
        Ok(Self {
            url: resolved.url,
            kind: self.kind,
        })
    }

    /// Whether this endpoint is an origin-relative path.
    pub fn is_relative(&self) -> bool {
        self.url.starts_with('/')
    }

    /// Endpoint URL as it will be dialled.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Transport kind selected for this endpoint.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }
}

fn has_ws_hint(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.contains("/ws/") || path.ends_with("/ws")
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_scheme_selects_duplex() {
        let ep = Endpoint::parse("wss://example.com/telemetry").unwrap();
        assert_eq!(ep.kind(), TransportKind::Duplex);
        assert_eq!(ep.url(), "wss://example.com/telemetry");
    }

    #[test]
    fn test_ws_path_hint_selects_duplex_and_rewrites_scheme() {
        let ep = Endpoint::parse("https://example.com/ws/telemetry").unwrap();
        assert_eq!(ep.kind(), TransportKind::Duplex);
        assert_eq!(ep.url(), "wss://example.com/ws/telemetry");

        let ep = Endpoint::parse("http://127.0.0.1:9000/api/ws/feed").unwrap();
        assert_eq!(ep.kind(), TransportKind::Duplex);
        assert_eq!(ep.url(), "ws://127.0.0.1:9000/api/ws/feed");
    }

    #[test]
    fn test_plain_http_selects_push() {
        let ep = Endpoint::parse("https://example.com/api/stream").unwrap();
        assert_eq!(ep.kind(), TransportKind::Push);
        assert_eq!(ep.url(), "https://example.com/api/stream");
    }

    #[test]
    fn test_ws_substring_without_segment_is_push() {
        let ep = Endpoint::parse("https://example.com/news/feed").unwrap();
        assert_eq!(ep.kind(), TransportKind::Push);
    }

    #[test]
    fn test_relative_paths_resolve_kind() {
        let ep = Endpoint::parse("/ws/telemetry").unwrap();
        assert!(ep.is_relative());
        assert_eq!(ep.kind(), TransportKind::Duplex);

        let ep = Endpoint::parse("/api/events").unwrap();
        assert_eq!(ep.kind(), TransportKind::Push);
    }

    #[test]
    fn test_with_base_joins_relative_paths() {
        let ep = Endpoint::parse("/ws/telemetry")
            .unwrap()
            .with_base("http://127.0.0.1:8080/")
            .unwrap();
        assert!(!ep.is_relative());
        assert_eq!(ep.kind(), TransportKind::Duplex);
        assert_eq!(ep.url(), "ws://127.0.0.1:8080/ws/telemetry");

        let ep = Endpoint::parse("/api/events")
            .unwrap()
            .with_base("https://dash.example.com")
            .unwrap();
        assert_eq!(ep.kind(), TransportKind::Push);
        assert_eq!(ep.url(), "https://dash.example.com/api/events");
    }

    #[test]
    fn test_invalid_endpoints() {
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("example.com/ws/telemetry").is_err());
        assert!(Endpoint::parse("ftp://example.com/ws/").is_err());
    }
}
