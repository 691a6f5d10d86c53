use crate::application::EntrypointConfig;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Listener settings
    pub listen_host: String,
    pub http_port: u16,
    pub https_port: u16,
    pub match_domains: Vec<String>,
    pub debug: bool,

    // Short links
    pub short_link_host: String,
    pub short_link_default_domain: String,

    // TLS settings
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub tls_self_signed: bool,
    pub tls_domain: String,

    // Responses and logging
    pub error_page_dir: Option<String>,
    pub access_log: bool,
    pub shutdown_drain_secs: u64,

    // Management API settings
    pub api_enabled: bool,
    pub api_listen_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            http_port: 80,
            https_port: 443,
            match_domains: Vec::new(),
            debug: false,
            short_link_host: "go".to_string(),
            short_link_default_domain: String::new(),
            tls_cert_path: None,
            tls_key_path: None,
            tls_self_signed: false,
            tls_domain: "localhost".to_string(),
            error_page_dir: None,
            access_log: true,
            shutdown_drain_secs: 10,
            api_enabled: false,
            api_listen_addr: "0.0.0.0:8081".to_string(),
        }
    }
}

impl Config {
    pub fn entrypoint_config(&self) -> EntrypointConfig {
        EntrypointConfig {
            listen_host: self.listen_host.clone(),
            http_port: self.http_port,
            https_port: self.https_port,
            match_domains: self.match_domains.clone(),
            short_link_host: self.short_link_host.clone(),
            short_link_default_domain: self.short_link_default_domain.clone(),
            error_page_dir: self.error_page_dir.as_ref().map(PathBuf::from),
        }
    }

    /// Whether TLS material is configured, either as files or self-signed.
    pub fn tls_enabled(&self) -> bool {
        self.tls_self_signed || (self.tls_cert_path.is_some() && self.tls_key_path.is_some())
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Build the configuration from `lookup`, falling back to defaults for
/// missing or unparsable values.
pub fn load_config_from(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
    let defaults = Config::default();
    let flag = |key: &str, default: bool| {
        lookup(key)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(default)
    };

    let listen_host = lookup("GATEWAY_LISTEN_HOST").unwrap_or(defaults.listen_host);

    let http_port = lookup("GATEWAY_HTTP_PORT")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.http_port);

    let https_port = lookup("GATEWAY_HTTPS_PORT")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.https_port);

    let match_domains = lookup("GATEWAY_MATCH_DOMAINS")
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let debug = lookup("DEBUG").is_some();

    // Short links
    let short_link_host = lookup("GATEWAY_SHORT_LINK_HOST").unwrap_or(defaults.short_link_host);
    let short_link_default_domain =
        lookup("GATEWAY_SHORT_LINK_DEFAULT_DOMAIN").unwrap_or_default();

    // TLS settings
    let tls_cert_path = lookup("GATEWAY_TLS_CERT");
    let tls_key_path = lookup("GATEWAY_TLS_KEY");
    let tls_self_signed = flag("GATEWAY_TLS_SELF_SIGNED", false);
    let tls_domain = lookup("GATEWAY_TLS_DOMAIN").unwrap_or(defaults.tls_domain);

    let error_page_dir = lookup("GATEWAY_ERROR_PAGE_DIR");
    let access_log = flag("GATEWAY_ACCESS_LOG", true);
    let shutdown_drain_secs = lookup("GATEWAY_SHUTDOWN_DRAIN_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.shutdown_drain_secs);

    // Management API settings
    let api_enabled = flag("GATEWAY_API_ENABLED", false);
    let api_listen_addr = lookup("GATEWAY_API_LISTEN_ADDR").unwrap_or(defaults.api_listen_addr);

    if tls_cert_path.is_some() != tls_key_path.is_some() {
        anyhow::bail!("GATEWAY_TLS_CERT and GATEWAY_TLS_KEY must be set together");
    }

    Ok(Config {
        listen_host,
        http_port,
        https_port,
        match_domains,
        debug,
        short_link_host,
        short_link_default_domain,
        tls_cert_path,
        tls_key_path,
        tls_self_signed,
        tls_domain,
        error_page_dir,
        access_log,
        shutdown_drain_secs,
        api_enabled,
        api_listen_addr,
    })
}
