//! Encoding of tracked requests and sessions into opaque strings.
//!
//! The codecs are what make cookie contents trustworthy: a store may keep
//! values in plain cookies, so every decode must reject anything this
//! service provider did not produce itself.

use std::collections::BTreeMap;

use cookie::{Cookie, CookieJar, Key};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::provider::MAX_ISSUE_DELAY;
use crate::types::{Assertion, TrackedRequest};

/// Attribute name under which the assertion's `SessionIndex` is kept.
pub const SESSION_INDEX_ATTRIBUTE: &str = "SessionIndex";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("signature verification failed")]
    Signature,

    #[error("token expired")]
    Expired,

    #[error("audience: expected {expected:?}, got {actual:?}")]
    Audience { expected: String, actual: String },

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Failure reported by a custom codec implementation.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Turns a [`TrackedRequest`] into an opaque, tamper-evident string and back.
pub trait TrackedRequestCodec: Send + Sync {
    /// # Errors
    ///
    /// Returns [`CodecError`] if the request cannot be serialized.
    fn encode(&self, request: &TrackedRequest) -> Result<String, CodecError>;

    /// # Errors
    ///
    /// Returns [`CodecError`] if the value was not produced by [`encode`](Self::encode),
    /// was altered, or is no longer valid.
    fn decode(&self, signed: &str) -> Result<TrackedRequest, CodecError>;
}

/// Builds sessions from validated assertions and moves them in and out of
/// opaque strings.
pub trait SessionCodec: Send + Sync {
    type Session;

    /// Build a session for the principal named by `assertion`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the assertion lacks what the session needs.
    fn new_session(&self, assertion: &Assertion) -> Result<Self::Session, CodecError>;

    /// # Errors
    ///
    /// Returns [`CodecError`] if the session cannot be serialized.
    fn encode(&self, session: &Self::Session) -> Result<String, CodecError>;

    /// # Errors
    ///
    /// Returns [`CodecError`] if the value is forged, altered, expired, or was
    /// issued for another audience.
    fn decode(&self, signed: &str) -> Result<Self::Session, CodecError>;

    /// How long a new session stays valid, if the codec enforces an expiry.
    fn max_age(&self) -> Option<Duration> {
        None
    }
}

/// HMAC signing through the `cookie` crate's signed jar.
///
/// `purpose` is the cookie name the value is signed under.
#[derive(Clone)]
struct Signer {
    key: Key,
    purpose: &'static str,
}

impl Signer {
    fn seal(&self, payload: String) -> String {
        let mut jar = CookieJar::new();
        jar.signed_mut(&self.key).add(Cookie::new(self.purpose, payload));
        jar.get(self.purpose)
            .map(|c| c.value().to_owned())
            .unwrap_or_default()
    }

    fn open(&self, sealed: &str) -> Result<String, CodecError> {
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(self.purpose, sealed.to_owned()));
        jar.signed(&self.key)
            .get(self.purpose)
            .map(|c| c.value().to_owned())
            .ok_or(CodecError::Signature)
    }
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn check_claims(audience: &str, expected: &str, expires_at: i64) -> Result<(), CodecError> {
    if audience != expected {
        return Err(CodecError::Audience {
            expected: expected.to_owned(),
            actual: audience.to_owned(),
        });
    }
    if now() > expires_at {
        return Err(CodecError::Expired);
    }
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct TrackedRequestClaims {
    #[serde(rename = "aud")]
    audience: String,
    #[serde(rename = "iat")]
    issued_at: i64,
    #[serde(rename = "exp")]
    expires_at: i64,
    #[serde(flatten)]
    request: TrackedRequest,
}

/// Default [`TrackedRequestCodec`]: signed JSON claims bound to the service
/// provider's entity ID, valid for [`MAX_ISSUE_DELAY`].
#[derive(Clone)]
pub struct SignedTrackedRequestCodec {
    signer: Signer,
    audience: String,
    max_age: Duration,
}

impl SignedTrackedRequestCodec {
    #[must_use]
    pub fn new(key: Key, audience: impl Into<String>) -> Self {
        Self {
            signer: Signer {
                key,
                purpose: "saml_tracked_request",
            },
            audience: audience.into(),
            max_age: MAX_ISSUE_DELAY,
        }
    }

    /// Override how long an encoded request stays valid.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

impl TrackedRequestCodec for SignedTrackedRequestCodec {
    fn encode(&self, request: &TrackedRequest) -> Result<String, CodecError> {
        let issued_at = now();
        let claims = TrackedRequestClaims {
            audience: self.audience.clone(),
            issued_at,
            expires_at: issued_at + self.max_age.whole_seconds(),
            request: request.clone(),
        };
        Ok(self.signer.seal(serde_json::to_string(&claims)?))
    }

    fn decode(&self, signed: &str) -> Result<TrackedRequest, CodecError> {
        let payload = self.signer.open(signed)?;
        let claims: TrackedRequestClaims = serde_json::from_str(&payload)?;
        check_claims(&claims.audience, &self.audience, claims.expires_at)?;
        Ok(claims.request)
    }
}

/// Multi-valued attributes of a session, keyed by attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, Vec<String>>);

impl Attributes {
    /// First value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// All values of `name`.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    fn append(&mut self, name: &str, values: &[String]) {
        self.0
            .entry(name.to_owned())
            .or_default()
            .extend(values.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Session produced by [`SignedSessionCodec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SessionClaims {
    /// `NameID` of the authenticated principal (empty if the IdP sent none).
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(rename = "aud")]
    pub audience: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "attr", default)]
    pub attributes: Attributes,
}

impl SessionClaims {
    /// `SessionIndex` of the assertion the session was built from.
    #[must_use]
    pub fn session_index(&self) -> Option<&str> {
        self.attributes.get(SESSION_INDEX_ATTRIBUTE)
    }
}

/// Default [`SessionCodec`]: signed [`SessionClaims`] bound to the service
/// provider's entity ID.
#[derive(Clone)]
pub struct SignedSessionCodec {
    signer: Signer,
    audience: String,
    max_age: Duration,
}

impl SignedSessionCodec {
    /// `max_age` should match the session cookie's max-age.
    #[must_use]
    pub fn new(key: Key, audience: impl Into<String>, max_age: Duration) -> Self {
        Self {
            signer: Signer {
                key,
                purpose: "saml_session",
            },
            audience: audience.into(),
            max_age,
        }
    }
}

impl SessionCodec for SignedSessionCodec {
    type Session = SessionClaims;

    fn new_session(&self, assertion: &Assertion) -> Result<SessionClaims, CodecError> {
        let issued_at = now();

        let mut attributes = Attributes::default();
        for attribute in &assertion.attributes {
            attributes.append(&attribute.name, &attribute.values);
            if let Some(friendly_name) = &attribute.friendly_name {
                attributes.append(friendly_name, &attribute.values);
            }
        }
        if let Some(session_index) = &assertion.session_index {
            attributes.append(SESSION_INDEX_ATTRIBUTE, std::slice::from_ref(session_index));
        }

        Ok(SessionClaims {
            subject: assertion.subject.clone().unwrap_or_default(),
            audience: self.audience.clone(),
            issued_at,
            expires_at: issued_at + self.max_age.whole_seconds(),
            attributes,
        })
    }

    fn encode(&self, session: &SessionClaims) -> Result<String, CodecError> {
        Ok(self.signer.seal(serde_json::to_string(session)?))
    }

    fn decode(&self, signed: &str) -> Result<SessionClaims, CodecError> {
        let payload = self.signer.open(signed)?;
        let claims: SessionClaims = serde_json::from_str(&payload)?;
        check_claims(&claims.audience, &self.audience, claims.expires_at)?;
        Ok(claims)
    }

    fn max_age(&self) -> Option<Duration> {
        Some(self.max_age)
    }
}
