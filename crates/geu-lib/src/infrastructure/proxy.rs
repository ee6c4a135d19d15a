//! Outbound proxy selection for the decision service.
//!
//! The desktop's manual proxy settings win. Otherwise the HTTP client falls back to its
//! own handling of `http_proxy`, `https_proxy`, `all_proxy` and `no_proxy`.

use log::{debug, warn};
use reqwest::Url;

use super::gsettings::GSettings;

/// Schema holding the proxy mode and ignore list.
const PROXY_SCHEMA: &str = "org.gnome.system.proxy";
/// Schema holding the HTTP proxy host and port.
const HTTP_PROXY_SCHEMA: &str = "org.gnome.system.proxy.http";
/// Schema holding the HTTPS proxy host and port.
const HTTPS_PROXY_SCHEMA: &str = "org.gnome.system.proxy.https";

/// How to reach a destination URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyChoice {
    /// Connect without any proxy, ignoring the environment.
    Direct,
    /// Go through an explicit proxy.
    Via {
        /// Proxy URL, e.g. `http://proxy.example:3128`.
        proxy: String,
        /// Comma-separated hosts, domains and CIDR blocks that bypass the proxy.
        no_proxy: String,
    },
    /// Let the HTTP client read the proxy environment variables.
    Environment,
}

/// Picks the outbound proxy for a destination URL.
pub trait ProxyResolver {
    /// Proxy to use when connecting to `url`.
    fn lookup(&self, url: &str) -> ProxyChoice;
}

/// `org.gnome.system.proxy` mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GnomeProxyMode {
    /// No desktop proxy configured.
    None,
    /// Host and port per scheme.
    Manual,
    /// Proxy auto-configuration; not evaluated here.
    Auto,
}

/// Desktop proxy configuration as stored in GSettings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GnomeProxySettings {
    /// Selected mode.
    pub mode: GnomeProxyMode,
    /// Proxy for `http` URLs.
    pub http: Option<(String, u16)>,
    /// Proxy for `https` URLs.
    pub https: Option<(String, u16)>,
    /// Hosts that bypass the proxy, in GNOME's pattern syntax.
    pub ignore_hosts: Vec<String>,
}

impl GnomeProxySettings {
    /// Read the desktop proxy settings; `None` if they cannot be read.
    #[must_use]
    pub fn read() -> Option<Self> {
        let proxy = GSettings::new(PROXY_SCHEMA);
        let mode = match proxy.get_string("mode") {
            Ok(mode) => mode,
            Err(e) => {
                debug!("Desktop proxy settings unavailable: {e}");
                return None;
            }
        };
        let mode = match mode.as_str() {
            "manual" => GnomeProxyMode::Manual,
            "auto" => GnomeProxyMode::Auto,
            _ => GnomeProxyMode::None,
        };
        Some(Self {
            mode,
            http: read_host_port(&GSettings::new(HTTP_PROXY_SCHEMA)),
            https: read_host_port(&GSettings::new(HTTPS_PROXY_SCHEMA)),
            ignore_hosts: proxy.get_strv("ignore-hosts").unwrap_or_default(),
        })
    }

    /// The desktop's answer for `url`, or `None` when the environment should decide.
    #[must_use]
    pub fn choose(&self, url: &Url) -> Option<ProxyChoice> {
        match self.mode {
            GnomeProxyMode::None => None,
            GnomeProxyMode::Auto => {
                warn!("Automatic proxy configuration is not supported; using environment");
                None
            }
            GnomeProxyMode::Manual => {
                let server = if url.scheme() == "https" {
                    self.https.as_ref()
                } else {
                    self.http.as_ref()
                };
                Some(server.map_or(ProxyChoice::Direct, |(host, port)| ProxyChoice::Via {
                    proxy: format!("http://{host}:{port}"),
                    no_proxy: self.no_proxy_list(),
                }))
            }
        }
    }

    /// `ignore-hosts` in the comma-separated `no_proxy` syntax.
    ///
    /// GNOME's `*.example.com` becomes `.example.com`; other entries pass through.
    #[must_use]
    pub fn no_proxy_list(&self) -> String {
        self.ignore_hosts
            .iter()
            .map(|host| {
                let host = host.trim();
                host.strip_prefix('*')
                    .filter(|rest| rest.starts_with('.'))
                    .unwrap_or(host)
            })
            .filter(|host| !host.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Host and port of one per-scheme proxy schema, if both are set.
fn read_host_port(schema: &GSettings) -> Option<(String, u16)> {
    let host = schema.get_string("host").ok().filter(|h| !h.is_empty())?;
    let port = schema
        .get_int("port")
        .ok()
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0)?;
    Some((host, port))
}

/// Desktop proxy settings first, then the environment.
#[derive(Debug, Clone, Default)]
pub struct SystemProxyResolver {
    /// Settings read at start-up; `None` outside a GNOME session.
    desktop: Option<GnomeProxySettings>,
}

impl SystemProxyResolver {
    /// Read the desktop settings once.
    #[must_use]
    pub fn detect() -> Self {
        Self::new(GnomeProxySettings::read())
    }

    /// Resolver over already-read desktop settings.
    #[must_use]
    pub fn new(desktop: Option<GnomeProxySettings>) -> Self {
        Self { desktop }
    }
}

impl ProxyResolver for SystemProxyResolver {
    fn lookup(&self, url: &str) -> ProxyChoice {
        let Ok(parsed) = Url::parse(url) else {
            return ProxyChoice::Environment;
        };
        let choice = self
            .desktop
            .as_ref()
            .and_then(|desktop| desktop.choose(&parsed))
            .unwrap_or(ProxyChoice::Environment);
        debug!("Proxy for {url}: {choice:?}");
        choice
    }
}
