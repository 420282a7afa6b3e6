//! Host specifier parsing

use std::fmt;

use serde::Serialize;

use crate::error::CoreError;

/// A resolved `(hostname, port)` pair
///
/// `hostname` is the key used for every per-host map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HostAddr {
    pub hostname: String,
    pub port: u16,
}

impl HostAddr {
    /// Parse `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 literal
    ///
    /// # Errors
    /// Returns `CoreError::InvalidHost` for an empty hostname, a bad port or
    /// an unterminated bracket.
    pub fn parse(spec: &str, default_port: u16) -> Result<Self, CoreError> {
        let trimmed = spec.trim();

        let (hostname, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (inner, after) = rest
                .split_once(']')
                .ok_or_else(|| CoreError::invalid_host(spec, "missing closing bracket"))?;
            let port = match after {
                "" => None,
                _ => Some(
                    after
                        .strip_prefix(':')
                        .ok_or_else(|| CoreError::invalid_host(spec, "junk after bracket"))?,
                ),
            };
            (inner, port)
        } else if trimmed.matches(':').count() > 1 {
            // bare IPv6 literal, cannot carry a port
            (trimmed, None)
        } else if let Some((host, port)) = trimmed.split_once(':') {
            (host, Some(port))
        } else {
            (trimmed, None)
        };

        if hostname.is_empty() {
            return Err(CoreError::invalid_host(spec, "empty hostname"));
        }

        let port = match port {
            None => default_port,
            Some(raw) => match raw.parse::<u16>() {
                Ok(0) | Err(_) => {
                    return Err(CoreError::invalid_host(
                        spec,
                        format!("invalid port {raw:?}"),
                    ));
                }
                Ok(port) => port,
            },
        };

        Ok(Self {
            hostname: hostname.to_string(),
            port,
        })
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hostname.contains(':') {
            write!(f, "[{}]:{}", self.hostname, self.port)
        } else {
            write!(f, "{}:{}", self.hostname, self.port)
        }
    }
}

/// Split a comma separated host list, dropping empty entries
#[must_use]
pub fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_only() {
        let addr = HostAddr::parse("example.com", 22).unwrap();
        assert_eq!(addr.hostname, "example.com");
        assert_eq!(addr.port, 22);
    }

    #[test]
    fn test_parse_host_with_port() {
        let addr = HostAddr::parse("example.com:2222", 22).unwrap();
        assert_eq!(addr.hostname, "example.com");
        assert_eq!(addr.port, 2222);
    }

    #[test]
    fn test_default_port_applied() {
        let addr = HostAddr::parse("10.0.0.5", 2200).unwrap();
        assert_eq!(addr.port, 2200);
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let addr = HostAddr::parse("[fe80::1]:2022", 22).unwrap();
        assert_eq!(addr.hostname, "fe80::1");
        assert_eq!(addr.port, 2022);

        let addr = HostAddr::parse("[::1]", 22).unwrap();
        assert_eq!(addr.hostname, "::1");
        assert_eq!(addr.port, 22);
    }

    #[test]
    fn test_parse_bare_ipv6() {
        let addr = HostAddr::parse("2001:db8::7", 22).unwrap();
        assert_eq!(addr.hostname, "2001:db8::7");
        assert_eq!(addr.port, 22);
    }

    #[test]
    fn test_whitespace_trimmed() {
        let addr = HostAddr::parse("  web-1:22 ", 2222).unwrap();
        assert_eq!(addr.hostname, "web-1");
        assert_eq!(addr.port, 22);
    }

    #[test]
    fn test_malformed_specifiers() {
        for spec in ["", "   ", ":22", "host:", "host:abc", "host:70000", "host:0", "[::1", "[::1]x"] {
            assert!(
                matches!(HostAddr::parse(spec, 22), Err(CoreError::InvalidHost { .. })),
                "{spec:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(HostAddr::parse("a", 22).unwrap().to_string(), "a:22");
        assert_eq!(HostAddr::parse("[::1]:2", 22).unwrap().to_string(), "[::1]:2");
    }

    #[test]
    fn test_parse_host_list() {
        assert_eq!(
            parse_host_list("web-1, web-2,,db-1:2222 ,"),
            vec!["web-1", "web-2", "db-1:2222"]
        );
        assert!(parse_host_list(" , ").is_empty());
    }
}
