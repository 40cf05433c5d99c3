use std::sync::Arc;

use cookie::SameSite;
use time::Duration;

use crate::codec::SessionCodec;
use crate::error::Error;
use crate::store::{CookieStore, HttpContext, StoreError};
use crate::tracker::VALUE_KEY;
use crate::types::Assertion;

/// Default session cookie name.
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "token";

/// Default session lifetime.
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::hours(1);

/// Issues and reads the session cookie.
///
/// There is one session cookie per browser; logging in again overwrites it.
pub struct SessionProvider<C> {
    pub(crate) store: Arc<dyn CookieStore>,
    pub(crate) codec: C,
    pub(crate) name: String,
    pub(crate) domain: String,
    pub(crate) max_age: Duration,
    pub(crate) http_only: bool,
    pub(crate) secure: bool,
    pub(crate) same_site: Option<SameSite>,
}

impl<C: SessionCodec> SessionProvider<C> {
    /// Provider with default name and flags, no domain and not forced
    /// `Secure`. The cookie lives as long as the codec's sessions, or
    /// [`DEFAULT_SESSION_MAX_AGE`] if the codec has no expiry.
    #[must_use]
    pub fn new(store: Arc<dyn CookieStore>, codec: C) -> Self {
        let max_age = codec
            .max_age()
            .filter(|age| age.is_positive())
            .unwrap_or(DEFAULT_SESSION_MAX_AGE);
        Self {
            store,
            codec,
            name: DEFAULT_SESSION_COOKIE_NAME.into(),
            domain: String::new(),
            max_age,
            http_only: true,
            secure: false,
            same_site: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Cookie domain. Any `:port` suffix is dropped when the cookie is written.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Cookie Max-Age only. Session expiry is set by the codec, so a value
    /// longer than the codec's leaves a cookie that no longer decodes.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Always mark the cookie `Secure`, even for plain-http requests.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Start a session for the principal of an already validated assertion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the session cannot be built or encoded, or
    /// [`Error::Store`] if the cookie cannot be created or saved.
    pub fn create_session(&self, cx: &mut HttpContext, assertion: &Assertion) -> Result<(), Error> {
        let session = self.codec.new_session(assertion)?;
        let value = self.codec.encode(&session)?;

        let mut cookie = self.store.create(cx, &self.name)?;
        cookie.values.insert(VALUE_KEY.into(), value);

        let domain = strip_port(&self.domain);
        cookie.options.domain = (!domain.is_empty()).then(|| domain.to_owned());
        cookie.options.max_age = Some(self.max_age);
        cookie.options.http_only = self.http_only;
        cookie.options.secure = self.secure || cx.is_https();
        cookie.options.path = "/".into();
        cookie.options.same_site = self.same_site;

        self.store.save(cx, &cookie)?;

        tracing::debug!(cookie = %self.name, issuer = %assertion.issuer, "Created SAML session");
        Ok(())
    }

    /// The current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if there is no session cookie, it is
    /// empty, it fails the store's own verification, or it does not decode
    /// (forged, expired, or from another service provider). Returns
    /// [`Error::Store`] if the store backend fails.
    pub fn get_session(&self, cx: &HttpContext) -> Result<C::Session, Error> {
        let cookie = match self.store.get(cx, &self.name) {
            Ok(cookie) => cookie,
            Err(e @ (StoreError::Verification(_) | StoreError::Malformed { .. })) => {
                tracing::debug!(cookie = %self.name, error = %e, "Discarding unreadable session cookie");
                return Err(Error::NoSession);
            }
            Err(e) => return Err(e.into()),
        };

        let value = cookie
            .values
            .get(VALUE_KEY)
            .filter(|v| !v.is_empty())
            .ok_or(Error::NoSession)?;

        self.codec.decode(value).map_err(|e| {
            tracing::debug!(cookie = %self.name, error = %e, "Discarding undecodable session");
            Error::NoSession
        })
    }

    /// End the session by deleting its cookie.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the cookie cannot be fetched or saved.
    pub fn delete_session(&self, cx: &mut HttpContext) -> Result<(), Error> {
        let mut cookie = self.store.get(cx, &self.name)?;
        let domain = strip_port(&self.domain);
        cookie.options.domain = (!domain.is_empty()).then(|| domain.to_owned());
        cookie.options.path = "/".into();
        cookie.expire();
        self.store.save(cx, &cookie)?;

        tracing::debug!(cookie = %self.name, "Deleted SAML session");
        Ok(())
    }
}

/// Cookie domains carry no port: `host:port` → `host`, `[v6]:port` → `v6`.
/// Anything that is not a host/port pair is returned unchanged.
fn strip_port(domain: &str) -> &str {
    if let Some(rest) = domain.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, port)) if is_port_suffix(port) => host,
            _ => domain,
        };
    }
    match domain.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => domain,
    }
}

fn is_port_suffix(s: &str) -> bool {
    s.strip_prefix(':').is_some_and(|port| !port.contains(':'))
}
