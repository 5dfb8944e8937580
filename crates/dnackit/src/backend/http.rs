//! HTTPS transport backed by `ureq`.

use crate::backend::Transport;
use crate::error::Result;
use crate::types::{ClientOptions, Credentials, Method, RawResponse, Request};
use serde_json::Value;

/// HTTPS transport for a real controller.
pub struct HttpTransport {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// Controller base URL (`https://host[:port]`).
    base_url: String,
    user_agent: String,
}

impl HttpTransport {
    /// Create a transport for the controller described by `credentials`.
    #[must_use]
    pub fn new(credentials: &Credentials, options: &ClientOptions) -> Self {
        let mut config = ureq::Agent::config_builder()
            .timeout_global(Some(options.request_timeout))
            .http_status_as_error(false);

        if !credentials.verify_tls {
            log::warn!(
                "TLS certificate verification disabled for {}",
                credentials.host
            );
            config = config.tls_config(
                ureq::tls::TlsConfig::builder()
                    .disable_verification(true)
                    .build(),
            );
        }

        Self {
            agent: ureq::Agent::new_with_config(config.build()),
            base_url: credentials.base_url(),
            user_agent: options.user_agent.clone(),
        }
    }

    /// Get the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn decorate<B>(&self, mut builder: ureq::RequestBuilder<B>, request: &Request) -> ureq::RequestBuilder<B> {
        builder = builder
            .header("Accept", "application/json")
            .header("User-Agent", &self.user_agent);
        for (key, value) in &request.query {
            builder = builder.query(key, value);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        builder
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<RawResponse> {
        let url = self.url(&request.path);
        log::trace!("{} {}", request.method, request.path);

        let mut response = match request.method {
            Method::Get => self.decorate(self.agent.get(&url), request).call()?,
            Method::Delete => self.decorate(self.agent.delete(&url), request).call()?,
            Method::Post | Method::Put => {
                let builder = if request.method == Method::Post {
                    self.agent.post(&url)
                } else {
                    self.agent.put(&url)
                };
                let builder = self.decorate(builder, request);
                match &request.body {
                    Some(body) => builder.send_json(body)?,
                    None => builder.send_empty()?,
                }
            }
        };

        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string()?;
        log::trace!("{} {} -> {status}", request.method, request.path);

        Ok(RawResponse::new(status, parse_body(&text)))
    }
}

/// Parse a response body: empty is `Null`, non-JSON is kept as a string.
fn parse_body(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("  \n"), Value::Null);
        assert_eq!(parse_body(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(parse_body("<html>bad gateway</html>"), json!("<html>bad gateway</html>"));
    }

    #[test]
    fn test_base_url_from_credentials() {
        let mut creds = Credentials::new("10.0.0.5", "admin", "pw");
        creds.port = 8443;
        let transport = HttpTransport::new(&creds, &ClientOptions::default());
        assert_eq!(transport.base_url(), "https://10.0.0.5:8443");
        assert_eq!(transport.url("/dna/x"), "https://10.0.0.5:8443/dna/x");
    }
}
