use crate::error::{MirrorError, Result};
use attohttpc::{ProxySettings, ProxySettingsBuilder, Session};
use std::io::{self, Read};
use std::time::Duration;

const USER_AGENT: &str = concat!("relmirror/", env!("CARGO_PKG_VERSION"));

/// Seam between the downloader and the network, so tests can substitute a
/// scripted client.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<Box<dyn HttpResponse>>;
}

pub trait HttpResponse: Read + Send {
    fn status(&self) -> u16;

    fn header(&self, name: &str) -> Option<&str>;
}

pub struct AttohttpcClient {
    timeout: Duration,
    proxy: Option<ProxySettings>,
}

impl AttohttpcClient {
    /// Build a client with the given request timeout and optional explicit
    /// proxy. An unparsable proxy URL is a fatal configuration error. When
    /// no proxy is configured, the conventional environment variables apply.
    pub fn new(timeout: Duration, proxy_url: Option<&str>) -> Result<Self> {
        let proxy = match proxy_url {
            Some(raw) => {
                let url = url::Url::parse(raw).map_err(|e| {
                    MirrorError::InvalidConfig(format!("Invalid proxy URL '{raw}': {e}"))
                })?;
                Some(
                    ProxySettingsBuilder::new()
                        .http_proxy(url.clone())
                        .https_proxy(url)
                        .build(),
                )
            }
            None => None,
        };
        Ok(Self { timeout, proxy })
    }
}

impl HttpClient for AttohttpcClient {
    fn get(&self, url: &str) -> Result<Box<dyn HttpResponse>> {
        // Create a new session for each request
        let mut session = Session::new();
        session.proxy_settings(match &self.proxy {
            Some(proxy) => proxy.clone(),
            None => ProxySettings::from_env(),
        });

        let response = session
            .get(url)
            .timeout(self.timeout)
            .header("User-Agent", USER_AGENT)
            .follow_redirects(true)
            .send()?;
        Ok(Box::new(AttohttpcResponse { response }))
    }
}

struct AttohttpcResponse {
    response: attohttpc::Response,
}

impl Read for AttohttpcResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.response.read(buf)
    }
}

impl HttpResponse for AttohttpcResponse {
    fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.response.headers().get(name)?.to_str().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_proxy_url_is_fatal() {
        let result = AttohttpcClient::new(Duration::from_secs(5), Some("not a url"));
        assert!(matches!(result, Err(MirrorError::InvalidConfig(_))));
    }

    #[test]
    fn test_valid_proxy_url_accepted() {
        assert!(AttohttpcClient::new(Duration::from_secs(5), Some("http://127.0.0.1:8888")).is_ok());
    }
}
