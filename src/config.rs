//! Invocation files
//!
//! An invocation file carries the desired-state document together with the
//! run settings and controller credentials. JSON and TOML are accepted,
//! chosen by extension. Command-line flags override file values.

use anyhow::{Context, Result, bail};
use declarative::{ReconcileOptions, State};
use dnackit::{ClientOptions, Credentials, PollPolicy};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cli::{ConnectionArgs, RunArgs};

/// One invocation: the document plus how to run it
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Invocation {
    /// The desired-state document
    #[serde(default = "empty_config")]
    pub config: Value,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub config_verify: bool,
    /// Task deadline
    #[serde(default = "default_timeout")]
    pub timeout_s: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_s: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_s: u64,
    #[serde(default)]
    pub credentials: CredentialsFile,
}

fn empty_config() -> Value {
    Value::Array(Vec::new())
}

fn default_timeout() -> u64 {
    1200
}

fn default_poll_interval() -> u64 {
    2
}

fn default_request_timeout() -> u64 {
    30
}

/// Credentials as written in a file; any of them may come from flags instead
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub verify_tls: Option<bool>,
    pub api_version: Option<String>,
}

impl Invocation {
    /// Load an invocation file (`.json` or `.toml`).
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let invocation: Self = match extension.as_deref() {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?,
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            _ => bail!(
                "Unsupported invocation file {}: expected a .json or .toml extension",
                path.display()
            ),
        };
        invocation.check()?;
        Ok(invocation)
    }

    fn check(&self) -> Result<()> {
        if self.timeout_s == 0 {
            bail!("timeout_s must be at least 1");
        }
        if self.poll_interval_s == 0 {
            bail!("poll_interval_s must be at least 1");
        }
        if self.request_timeout_s == 0 {
            bail!("request_timeout_s must be at least 1");
        }
        Ok(())
    }

    /// Apply command-line overrides.
    pub fn override_with(&mut self, args: &RunArgs) {
        if let Some(state) = args.state {
            self.state = state.into();
        }
        if args.verify {
            self.config_verify = true;
        }
        if let Some(timeout) = args.timeout.filter(|t| *t > 0) {
            self.timeout_s = timeout;
        }
        if let Some(interval) = args.poll_interval.filter(|i| *i > 0) {
            self.poll_interval_s = interval;
        }
        self.credentials.override_with(&args.connection);
    }

    pub fn reconcile_options(&self, dry_run: bool) -> ReconcileOptions {
        ReconcileOptions {
            state: self.state,
            verify: self.config_verify,
            poll: PollPolicy::new(
                Duration::from_secs(self.timeout_s),
                Duration::from_secs(self.poll_interval_s),
            ),
            dry_run,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: Duration::from_secs(self.request_timeout_s),
            user_agent: format!("ccwm/{}", env!("CARGO_PKG_VERSION")),
            ..ClientOptions::default()
        }
    }
}

impl CredentialsFile {
    fn override_with(&mut self, args: &ConnectionArgs) {
        if let Some(host) = &args.host {
            self.host = Some(host.clone());
        }
        if let Some(port) = args.port {
            self.port = Some(port);
        }
        if let Some(username) = &args.username {
            self.username = Some(username.clone());
        }
        if let Some(password) = &args.password {
            self.password = Some(password.clone());
        }
        if let Some(verify) = args.verify_tls {
            self.verify_tls = Some(verify);
        }
        if args.insecure {
            self.verify_tls = Some(false);
        }
    }

    /// Complete credentials, or an error naming what is missing.
    pub fn resolve(&self) -> Result<Credentials> {
        let host = self
            .host
            .clone()
            .context("No controller host: set credentials.host, --host or DNAC_HOST")?;
        let username = self
            .username
            .clone()
            .context("No username: set credentials.username, --username or DNAC_USERNAME")?;
        let password = self
            .password
            .clone()
            .context("No password: set credentials.password, --password or DNAC_PASSWORD")?;

        let mut credentials = Credentials::new(host, username, password);
        if let Some(port) = self.port {
            credentials.port = port;
        }
        if let Some(verify) = self.verify_tls {
            credentials.verify_tls = verify;
        }
        if let Some(version) = &self.api_version {
            credentials.api_version = version.clone();
        }
        Ok(credentials)
    }
}

// ============================================================================
// Tests
// ============================================================================
