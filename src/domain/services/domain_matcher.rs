//! Host to alias matching
//!
//! The `Host` header is split into hostname and port before matching. Both
//! modes match on the hostname; the exact fallback tries the raw host first so
//! an alias registered with a port still matches literally.

/// How a request host is turned into a route alias.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DomainMatcher {
    /// The first label of any host is the alias.
    #[default]
    AnyDomain,
    /// Only hosts under one of these suffixes are matched, in order.
    Suffixes(Vec<String>),
}

impl DomainMatcher {
    /// Build from configured domains. An empty list matches any domain.
    pub fn from_domains<S: AsRef<str>>(domains: &[S]) -> Self {
        let suffixes: Vec<String> = domains
            .iter()
            .map(|d| d.as_ref().trim())
            .filter(|d| !d.is_empty())
            .map(|d| {
                if d.starts_with('.') {
                    d.to_string()
                } else {
                    tracing::warn!("domain suffix {:?} should start with '.', prefixing it", d);
                    format!(".{}", d)
                }
            })
            .collect();

        if suffixes.is_empty() {
            Self::AnyDomain
        } else {
            Self::Suffixes(suffixes)
        }
    }

    /// Resolve `host` with `lookup`, trying candidate aliases in order.
    pub fn find<T>(&self, host: &str, lookup: impl Fn(&str) -> Option<T>) -> Option<T> {
        let (hostname, _) = split_host_port(host);

        let found = match self {
            Self::AnyDomain => {
                let alias = hostname.split('.').next().unwrap_or(hostname);
                lookup(alias)
            }
            Self::Suffixes(suffixes) => suffixes.iter().find_map(|suffix| {
                let alias = hostname.strip_suffix(suffix.as_str())?;
                if alias.is_empty() {
                    return None;
                }
                lookup(alias)
            }),
        };

        found.or_else(|| lookup(host)).or_else(|| {
            if hostname != host {
                lookup(hostname)
            } else {
                None
            }
        })
    }
}

/// Split `host[:port]`, including bracketed IPv6 literals.
pub fn split_host_port(host: &str) -> (&str, Option<u16>) {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((ip, after)) = rest.split_once(']') {
            let port = after.strip_prefix(':').and_then(|p| p.parse().ok());
            return (ip, port);
        }
        return (host, None);
    }

    match host.rsplit_once(':') {
        // a bare IPv6 literal has more than one colon
        Some((name, port)) if !name.contains(':') => match port.parse() {
            Ok(port) => (name, Some(port)),
            Err(_) => (host, None),
        },
        _ => (host, None),
    }
}
