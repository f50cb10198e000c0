//! Server endpoint addressing.
//!
//! The endpoint is external input: it is persisted by whatever configuration
//! store the application uses and handed to
//! [`ConnectionManager::connect`](crate::ConnectionManager::connect).

use std::{fmt, str::FromStr};

/// Errors produced when parsing a `host:port` string.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    /// The input did not contain a `:` separating host and port.
    #[error("expected host:port, got {0:?}")]
    MissingPort(String),
    /// The host part was empty.
    #[error("endpoint host is empty")]
    EmptyHost,
    /// The port was not a valid `u16`.
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

/// Host and port of the monitoring server.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerEndpoint {
    host: String,
    port: u16,
}

impl ServerEndpoint {
    /// Create an endpoint from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ServerEndpoint {
    type Err = EndpointParseError;

    /// Parse `host:port`; IPv6 hosts must be bracketed (`[::1]:8080`).
    ///
    /// # Examples
    ///
    /// ```
    /// use netview::ServerEndpoint;
    ///
    /// let endpoint: ServerEndpoint = "monitor.local:9100".parse().expect("valid endpoint");
    /// assert_eq!(endpoint.host(), "monitor.local");
    /// assert_eq!(endpoint.port(), 9100);
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingPort(s.to_owned()))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(EndpointParseError::EmptyHost);
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| EndpointParseError::InvalidPort(port.to_owned()))?;
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{EndpointParseError, ServerEndpoint};

    #[rstest]
    #[case("localhost:8080", "localhost", 8080)]
    #[case("10.0.0.5:1", "10.0.0.5", 1)]
    #[case("[::1]:9000", "::1", 9000)]
    fn parses_valid_endpoints(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let endpoint: ServerEndpoint = input.parse().expect("valid endpoint");
        assert_eq!(endpoint, ServerEndpoint::new(host, port));
        assert_eq!(endpoint.to_string(), input);
    }

    #[rstest]
    #[case("localhost", EndpointParseError::MissingPort("localhost".into()))]
    #[case(":80", EndpointParseError::EmptyHost)]
    #[case("host:http", EndpointParseError::InvalidPort("http".into()))]
    #[case("host:70000", EndpointParseError::InvalidPort("70000".into()))]
    fn rejects_invalid_endpoints(#[case] input: &str, #[case] expected: EndpointParseError) {
        assert_eq!(input.parse::<ServerEndpoint>(), Err(expected));
    }
}
