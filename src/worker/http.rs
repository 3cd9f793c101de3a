//! HTTP transport the worker downloads through

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;

use crate::buffer::BufferSink;
use crate::certs::TrustAnchor;
use crate::error::FetchError;
use crate::queue::Method;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            user_agent: format!("panelfetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// One outgoing request, borrowed from a resource or job.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub method: Method,
    pub url: &'a str,
    pub headers: &'a [(String, String)],
    pub body: Option<&'a Bytes>,
    pub content_type: Option<&'a str>,
}

impl<'a> HttpRequest<'a> {
    pub fn get(url: &'a str, headers: &'a [(String, String)]) -> Self {
        Self {
            method: Method::Get,
            url,
            headers,
            body: None,
            content_type: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u16,
    pub content_length: Option<u64>,
}

/// Performs a request and streams the body into `sink`.
///
/// Implementations stop reading once the sink overflows. The body is
/// streamed for every status so callers can inspect error payloads.
/// `anchor` is `None` for plain-HTTP URLs.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &HttpRequest<'_>,
        anchor: Option<&TrustAnchor>,
        sink: &mut BufferSink<'_>,
    ) -> Result<ResponseMeta, FetchError>;
}

/// `reqwest`-backed transport.
///
/// Clients for plain and insecure connections are built once; clients
/// pinned to a PEM anchor are built per request since anchors can change
/// at runtime.
pub struct ReqwestTransport {
    config: HttpConfig,
    default_client: Client,
    insecure_client: Client,
}

impl ReqwestTransport {
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let default_client = Self::builder(&config)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let insecure_client = Self::builder(&config)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| FetchError::Tls(e.to_string()))?;

        Ok(Self {
            config,
            default_client,
            insecure_client,
        })
    }

    fn builder(config: &HttpConfig) -> ClientBuilder {
        Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
    }

    fn client_for(&self, anchor: Option<&TrustAnchor>) -> Result<Client, FetchError> {
        match anchor {
            None => Ok(self.default_client.clone()),
            Some(TrustAnchor::Insecure) => Ok(self.insecure_client.clone()),
            Some(TrustAnchor::Pem { pem, .. }) => {
                let certs = Certificate::from_pem_bundle(pem)
                    .map_err(|e| FetchError::Tls(format!("invalid anchor PEM: {}", e)))?;
                let mut builder = Self::builder(&self.config).tls_built_in_root_certs(false);
                for cert in certs {
                    builder = builder.add_root_certificate(cert);
                }
                builder.build().map_err(|e| FetchError::Tls(e.to_string()))
            }
        }
    }
}

fn map_send_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else if e.is_builder() {
        FetchError::InvalidUrl(e.to_string())
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: &HttpRequest<'_>,
        anchor: Option<&TrustAnchor>,
        sink: &mut BufferSink<'_>,
    ) -> Result<ResponseMeta, FetchError> {
        let client = self.client_for(anchor)?;

        let mut builder = match request.method {
            Method::Get => client.get(request.url),
            Method::Post => client.post(request.url),
        };
        if let Some(body) = request.body {
            builder = builder.body(body.clone());
        }
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        for (name, value) in request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder.send().await.map_err(map_send_error)?;
        let meta = ResponseMeta {
            status: response.status().as_u16(),
            content_length: response.content_length(),
        };

        while let Some(chunk) = response.chunk().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(format!("failed to read body: {}", e))
            }
        })? {
            sink.write(&chunk);
            if sink.is_overflowed() {
                debug!(url = request.url, capacity = sink.capacity(), "Body exceeds buffer, stopping read");
                break;
            }
        }

        debug!(url = request.url, status = meta.status, size = sink.len(), "Download completed");
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert!(config.user_agent.starts_with("panelfetch/"));
    }

    #[test]
    fn test_plain_and_insecure_clients_prebuilt() {
        let transport = ReqwestTransport::new(HttpConfig::default()).unwrap();
        assert!(transport.client_for(None).is_ok());
        assert!(transport.client_for(Some(&TrustAnchor::Insecure)).is_ok());
    }
}
