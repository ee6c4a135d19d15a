//! [`UpdateRegistry`] over HTTP.

use log::debug;
use std::time::Duration;

use crate::domain::{ActionMap, InstalledVersions, RegistryError, UpdateRegistry, parse_actions};

use super::proxy::{ProxyChoice, ProxyResolver};

/// Sent with every request so the service can tell clients apart.
const USER_AGENT: &str = concat!("gnome-extension-updater/", env!("CARGO_PKG_VERSION"));

/// Client for the extensions.gnome.org `update-info` endpoint.
pub struct ExtensionsRegistry {
    /// Blocking client with the proxy and timeout already applied.
    client: reqwest::blocking::Client,
    /// Endpoint queried by [`UpdateRegistry::fetch_actions`].
    url: String,
}

impl ExtensionsRegistry {
    /// Create a client for `url`, routed through whatever `proxies` picks for it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ClientInit`] if the proxy is invalid or the HTTP client
    /// cannot be initialized.
    ///
    /// # Panics
    ///
    /// This method panics if called from within an async runtime. See docs on
    /// [`reqwest::blocking`] for details.
    pub fn new<P: ProxyResolver + ?Sized>(
        url: String,
        timeout: Duration,
        proxies: &P,
    ) -> Result<Self, RegistryError> {
        let builder = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout);

        let builder = match proxies.lookup(&url) {
            ProxyChoice::Direct => builder.no_proxy(),
            // The client reads the proxy environment variables itself.
            ProxyChoice::Environment => builder,
            ProxyChoice::Via { proxy, no_proxy } => {
                debug!("Using proxy {proxy} for {url} (bypass: {no_proxy})");
                let proxy = reqwest::Proxy::all(&proxy)
                    .map_err(client_init)?
                    .no_proxy(reqwest::NoProxy::from_string(&no_proxy));
                builder.proxy(proxy)
            }
        };

        let client = builder.build().map_err(client_init)?;
        Ok(Self { client, url })
    }

    /// Endpoint this client queries.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Map a client construction failure.
fn client_init(e: reqwest::Error) -> RegistryError {
    RegistryError::ClientInit {
        reason: e.to_string(),
    }
}

impl UpdateRegistry for ExtensionsRegistry {
    fn fetch_actions(
        &self,
        shell_version: &str,
        installed: &InstalledVersions,
    ) -> Result<ActionMap, RegistryError> {
        // A GET with query parameters; the endpoint rejects POST bodies (CSRF protection).
        let installed_json = installed.to_json()?;
        debug!("GET {} shell_version={shell_version} installed={installed_json}", self.url);

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("shell_version", shell_version),
                ("installed", installed_json.as_str()),
            ])
            .send()
            .map_err(|e| RegistryError::Request {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.text().map_err(|e| RegistryError::Request {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        parse_actions(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExtensionAction, ExtensionUuid};
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    struct FixedProxy(ProxyChoice);

    impl ProxyResolver for FixedProxy {
        fn lookup(&self, _url: &str) -> ProxyChoice {
            self.0.clone()
        }
    }

    /// Answer one request on a loopback port; the handle yields the request line.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/update-info/", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut header = String::new();
                let read = reader.read_line(&mut header).unwrap();
                if read == 0 || header == "\r\n" {
                    break;
                }
            }

            write!(
                stream,
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            request_line.trim_end().to_owned()
        });

        (url, handle)
    }

    fn direct_registry(url: String) -> ExtensionsRegistry {
        ExtensionsRegistry::new(url, Duration::from_secs(5), &FixedProxy(ProxyChoice::Direct))
            .unwrap()
    }

    fn installed_foo() -> InstalledVersions {
        let mut installed = InstalledVersions::default();
        installed.insert(ExtensionUuid::parse("foo@bar").unwrap(), 3);
        installed
    }

    #[test]
    fn fetches_and_parses_actions() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", r#"{"foo@bar": "upgrade"}"#);
        let registry = direct_registry(url);

        let actions = registry.fetch_actions("46.2", &installed_foo()).unwrap();

        assert_eq!(
            server.join().unwrap(),
            "GET /update-info/?shell_version=46.2&installed=%7B%22foo%40bar%22%3A%7B%22version%22%3A3%7D%7D HTTP/1.1"
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions.action_for(&ExtensionUuid::parse("foo@bar").unwrap()),
            &ExtensionAction::Upgrade
        );
    }

    #[test]
    fn server_error_is_a_status_error() {
        let (url, server) = serve_once("HTTP/1.1 500 Internal Server Error", "oops");
        let registry = direct_registry(url.clone());

        let err = registry.fetch_actions("46.2", &installed_foo()).unwrap_err();

        server.join().unwrap();
        match err {
            RegistryError::Status { status, url: failed } => {
                assert_eq!(status, 500);
                assert_eq!(failed, url);
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn malformed_body_is_a_parse_error() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", "<html>maintenance</html>");
        let registry = direct_registry(url);

        let err = registry.fetch_actions("46.2", &installed_foo()).unwrap_err();

        server.join().unwrap();
        assert!(matches!(err, RegistryError::Parse { .. }));
    }

    #[test]
    fn cidr_bypass_skips_the_proxy() {
        // The proxy port is closed; only a bypassed request can reach the server.
        let (url, server) = serve_once("HTTP/1.1 200 OK", "{}");
        let choice = ProxyChoice::Via {
            proxy: "http://127.0.0.1:9".to_owned(),
            no_proxy: "localhost,127.0.0.0/8".to_owned(),
        };
        let registry = ExtensionsRegistry::new(url, Duration::from_secs(5), &FixedProxy(choice))
            .unwrap();

        let actions = registry.fetch_actions("46.2", &installed_foo()).unwrap();

        assert!(server.join().unwrap().starts_with("GET /update-info/?"));
        assert!(actions.is_empty());
    }

    #[test]
    fn unreachable_service_is_a_request_error() {
        // Port 9 (discard) is closed on test machines; the connection is refused.
        let registry = direct_registry("http://127.0.0.1:9/update-info/".to_owned());
        let err = registry
            .fetch_actions("46.0", &InstalledVersions::default())
            .unwrap_err();
        assert!(matches!(err, RegistryError::Request { .. }));
    }

    #[test]
    fn builds_client_from_environment() {
        let registry = ExtensionsRegistry::new(
            "https://extensions.gnome.org/update-info/".to_owned(),
            Duration::from_secs(1),
            &FixedProxy(ProxyChoice::Environment),
        )
        .unwrap();
        assert_eq!(registry.url(), "https://extensions.gnome.org/update-info/");
    }
}
