use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cookie::{Cookie, Key};

use super::{CookieOptions, CookieStore, HttpContext, StoreError, StoredCookie};

#[derive(Clone, Default)]
enum Protection {
    #[default]
    Plain,
    Signed(Key),
    Private(Key),
}

/// [`CookieStore`] that keeps each value bag in the cookie of the same name.
///
/// The bag is serialized as JSON and base64url-encoded, then optionally
/// signed or encrypted with a [`Key`].
#[derive(Clone, Default)]
pub struct CookieJarStore {
    protection: Protection,
    default_options: CookieOptions,
}

impl CookieJarStore {
    /// No protection beyond what the stored values carry themselves.
    #[must_use]
    pub fn plain() -> Self {
        Self::default()
    }

    /// Cookies are authenticated with `key` (tamper-evident, readable).
    #[must_use]
    pub fn signed(key: Key) -> Self {
        Self {
            protection: Protection::Signed(key),
            ..Self::default()
        }
    }

    /// Cookies are encrypted and authenticated with `key`.
    #[must_use]
    pub fn private(key: Key) -> Self {
        Self {
            protection: Protection::Private(key),
            ..Self::default()
        }
    }

    /// Options given to handles before the caller adjusts them.
    #[must_use]
    pub fn with_default_options(mut self, options: CookieOptions) -> Self {
        self.default_options = options;
        self
    }

    fn read_raw(&self, cx: &HttpContext, name: &str) -> Result<Option<String>, StoreError> {
        let jar = cx.jar();
        if jar.get(name).is_none() {
            return Ok(None);
        }
        let verified = match &self.protection {
            Protection::Plain => jar.get(name).cloned(),
            Protection::Signed(key) => jar.signed(key).get(name),
            Protection::Private(key) => jar.private(key).get(name),
        };
        verified
            .map(|c| Some(c.value().to_owned()))
            .ok_or_else(|| StoreError::Verification(name.to_owned()))
    }
}

impl CookieStore for CookieJarStore {
    fn create(&self, _cx: &HttpContext, name: &str) -> Result<StoredCookie, StoreError> {
        Ok(StoredCookie::new(name, self.default_options.clone()))
    }

    fn get(&self, cx: &HttpContext, name: &str) -> Result<StoredCookie, StoreError> {
        let Some(raw) = self.read_raw(cx, name)? else {
            return Ok(StoredCookie::new(name, self.default_options.clone()));
        };
        let values = decode_values(&raw).map_err(|detail| StoreError::Malformed {
            name: name.to_owned(),
            detail,
        })?;
        Ok(StoredCookie::existing(name, values, self.default_options.clone()))
    }

    fn save(&self, cx: &mut HttpContext, stored: &StoredCookie) -> Result<(), StoreError> {
        let options = &stored.options;

        if options.is_removal() {
            let mut removal = Cookie::new(stored.name().to_owned(), "");
            removal.set_path(options.path.clone());
            if let Some(domain) = &options.domain {
                removal.set_domain(domain.clone());
            }
            cx.jar_mut().remove(removal);
            return Ok(());
        }

        let value = encode_values(&stored.values).map_err(|e| StoreError::Malformed {
            name: stored.name().to_owned(),
            detail: e.to_string(),
        })?;

        let mut cookie = Cookie::new(stored.name().to_owned(), value);
        cookie.set_path(options.path.clone());
        if let Some(domain) = &options.domain {
            cookie.set_domain(domain.clone());
        }
        cookie.set_max_age(options.max_age);
        cookie.set_http_only(options.http_only);
        cookie.set_secure(options.secure);
        cookie.set_same_site(options.same_site);

        let jar = cx.jar_mut();
        match &self.protection {
            Protection::Plain => jar.add(cookie),
            Protection::Signed(key) => jar.signed_mut(key).add(cookie),
            Protection::Private(key) => jar.private_mut(key).add(cookie),
        }
        Ok(())
    }
}

fn encode_values(values: &BTreeMap<String, String>) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(values)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_values(raw: &str) -> Result<BTreeMap<String, String>, String> {
    let json = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|e| format!("invalid base64: {e}"))?;
    serde_json::from_slice(&json).map_err(|e| format!("invalid value bag: {e}"))
}
