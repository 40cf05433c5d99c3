//! Per-cookie key/value storage.
//!
//! Request tracking and sessions never touch the cookie jar directly; they go
//! through a [`CookieStore`], which decides how a cookie's value bag is
//! encoded and protected. [`CookieJarStore`] keeps everything in the client's
//! cookies.

mod context;
mod jar;

use std::collections::BTreeMap;

use cookie::SameSite;
use time::Duration;

pub use context::HttpContext;
pub use jar::CookieJarStore;

/// Cookie store failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The cookie is present but its protection could not be verified.
    #[error("cookie {0:?} failed verification")]
    Verification(String),

    /// The cookie verified but its value bag could not be read.
    #[error("cookie {name:?} is malformed: {detail}")]
    Malformed { name: String, detail: String },

    /// Failure reported by a custom store implementation.
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Attributes applied to a cookie when it is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    /// `None` makes a browser-session cookie; a negative value deletes it.
    pub max_age: Option<Duration>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".into(),
            domain: None,
            max_age: Some(Duration::days(30)),
            http_only: false,
            secure: false,
            same_site: None,
        }
    }
}

impl CookieOptions {
    /// Whether saving with these options removes the cookie.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.max_age.is_some_and(Duration::is_negative)
    }
}

/// Handle to one named cookie: its value bag and the options it will be
/// saved with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    name: String,
    pub values: BTreeMap<String, String>,
    pub options: CookieOptions,
    is_new: bool,
}

impl StoredCookie {
    /// Empty handle that has not been seen on the request.
    #[must_use]
    pub fn new(name: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
            options,
            is_new: true,
        }
    }

    /// Handle for a cookie the request carried.
    #[must_use]
    pub fn existing(
        name: impl Into<String>,
        values: BTreeMap<String, String>,
        options: CookieOptions,
    ) -> Self {
        Self {
            name: name.into(),
            values,
            options,
            is_new: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True unless the cookie was read back from the request.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Mark the cookie for deletion on the next save.
    pub fn expire(&mut self) {
        self.options.max_age = Some(Duration::seconds(-1));
    }
}

/// Storage for named cookies within a request/response cycle.
///
/// Implementations must give read-your-own-write semantics inside one
/// [`HttpContext`]: a `get` after a `save` of the same name returns what was
/// saved (or nothing, after a removal).
pub trait CookieStore: Send + Sync {
    /// Fresh, empty handle for `name`, ignoring whatever the request carries.
    ///
    /// # Errors
    ///
    /// Implementation-specific; the jar store never fails here.
    fn create(&self, cx: &HttpContext, name: &str) -> Result<StoredCookie, StoreError>;

    /// Handle for `name` as the request currently carries it.
    ///
    /// An absent cookie yields an empty handle, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the cookie is present but cannot be verified
    /// or read.
    fn get(&self, cx: &HttpContext, name: &str) -> Result<StoredCookie, StoreError>;

    /// Write the handle into the response.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the value bag cannot be encoded.
    fn save(&self, cx: &mut HttpContext, cookie: &StoredCookie) -> Result<(), StoreError>;
}
