use cookie::{Key, SameSite};
use time::Duration;
use url::Url;

use crate::error::Error;

/// Settings for [`Middleware::new`](crate::Middleware::new).
///
/// Required fields (`url`, `key`) are constructor parameters. Everything else
/// has a default derived from them; override with `with_*` methods or use
/// [`from_env()`](Options::from_env).
#[derive(Clone)]
pub struct Options {
    pub(crate) url: Url,
    pub(crate) key: Key,
    pub(crate) entity_id: Option<String>,
    pub(crate) cookie_name: Option<String>,
    pub(crate) cookie_domain: Option<String>,
    pub(crate) cookie_secure: bool,
    pub(crate) cookie_max_age: Option<Duration>,
    pub(crate) cookie_same_site: Option<SameSite>,
    pub(crate) request_cookie_prefix: Option<String>,
}

impl Options {
    /// `url` is the application's root URL; `key` signs tracked requests and
    /// sessions.
    #[must_use]
    pub fn new(url: Url, key: Key) -> Self {
        Self {
            url,
            key,
            entity_id: None,
            cookie_name: None,
            cookie_domain: None,
            cookie_secure: false,
            cookie_max_age: None,
            cookie_same_site: None,
            request_cookie_prefix: None,
        }
    }

    /// Create options from environment variables.
    ///
    /// # Required env vars
    /// - `SAML_ROOT_URL`: root URL of the application (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `SAML_COOKIE_KEY`: signing key bytes (at least 64); an ephemeral key is
    ///   generated when unset
    /// - `SAML_ENTITY_ID`: override the service provider entity ID
    /// - `SAML_COOKIE_NAME`: session cookie name
    /// - `SAML_COOKIE_DOMAIN`: session cookie domain
    /// - `SAML_COOKIE_SECURE`: `"1"` or `"true"` to always mark the session cookie `Secure`
    /// - `SAML_COOKIE_MAX_AGE`: session lifetime in seconds
    /// - `SAML_REQUEST_COOKIE_PREFIX`: prefix of request tracking cookies
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, Error> {
        let url_str = std::env::var("SAML_ROOT_URL")
            .map_err(|_| Error::Config("SAML_ROOT_URL is required".into()))?;
        let url: Url = url_str
            .parse()
            .map_err(|e| Error::Config(format!("SAML_ROOT_URL: {e}")))?;

        let key = match std::env::var("SAML_COOKIE_KEY") {
            Ok(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                Error::Config(
                    "SAML_COOKIE_KEY is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            Err(_) => {
                tracing::warn!("SAML_COOKIE_KEY not set; sessions will not survive a restart");
                Key::generate()
            }
        };

        let mut options = Self::new(url, key);

        if let Ok(entity_id) = std::env::var("SAML_ENTITY_ID") {
            options = options.with_entity_id(entity_id);
        }
        if let Ok(name) = std::env::var("SAML_COOKIE_NAME") {
            options = options.with_cookie_name(name);
        }
        if let Ok(domain) = std::env::var("SAML_COOKIE_DOMAIN") {
            options = options.with_cookie_domain(domain);
        }
        if let Ok(secs) = std::env::var("SAML_COOKIE_MAX_AGE") {
            let secs: i64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("SAML_COOKIE_MAX_AGE: {e}")))?;
            options = options.with_cookie_max_age(Duration::seconds(secs));
        }
        if let Ok(prefix) = std::env::var("SAML_REQUEST_COOKIE_PREFIX") {
            options = options.with_request_cookie_prefix(prefix);
        }

        let secure = matches!(
            std::env::var("SAML_COOKIE_SECURE").as_deref(),
            Ok("1") | Ok("true"),
        );

        Ok(options.with_cookie_secure(secure))
    }

    #[must_use]
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Session cookie name (default: `"token"`).
    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    /// Session cookie domain (default: host and port of the root URL).
    #[must_use]
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Force `Secure` on the session cookie. It is already set when the root
    /// URL is https; this cannot turn it off.
    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Session lifetime (default: one hour). Non-positive values keep the default.
    #[must_use]
    pub fn with_cookie_max_age(mut self, max_age: Duration) -> Self {
        self.cookie_max_age = Some(max_age);
        self
    }

    /// `SameSite` for both session and tracking cookies (default: unset).
    #[must_use]
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = Some(same_site);
        self
    }

    /// Prefix of tracking cookie names (default: `"saml_"`).
    #[must_use]
    pub fn with_request_cookie_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.request_cookie_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    pub(crate) fn session_cookie_name(&self) -> String {
        self.cookie_name
            .clone()
            .unwrap_or_else(|| crate::session::DEFAULT_SESSION_COOKIE_NAME.into())
    }

    /// Configured domain, else the root URL's `host[:port]`.
    pub(crate) fn session_cookie_domain(&self) -> String {
        if let Some(domain) = &self.cookie_domain {
            return domain.clone();
        }
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => String::new(),
        }
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.url.scheme() == "https" || self.cookie_secure
    }

    pub(crate) fn session_max_age(&self) -> Duration {
        self.cookie_max_age
            .filter(|age| age.is_positive())
            .unwrap_or(crate::session::DEFAULT_SESSION_MAX_AGE)
    }

    pub(crate) fn request_cookie_prefix(&self) -> String {
        self.request_cookie_prefix
            .clone()
            .unwrap_or_else(|| crate::tracker::DEFAULT_NAME_PREFIX.into())
    }
}
