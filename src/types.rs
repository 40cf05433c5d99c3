use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Correlation token for one in-flight authentication request.
///
/// Sent to the IdP as `RelayState` and used as the suffix of the tracking
/// cookie name. Unguessable by construction: see
/// [`generate_index`](crate::random::generate_index).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct RequestIndex(pub String);

impl RequestIndex {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestIndex {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for RequestIndex {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A pending `AuthnRequest`, as carried in its tracking cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TrackedRequest {
    pub index: RequestIndex,
    /// ID of the `AuthnRequest`; the response must carry it in `InResponseTo`.
    pub saml_request_id: String,
    /// Where to send the user once they are logged in.
    pub uri: String,
}

impl TrackedRequest {
    #[must_use]
    pub fn new(
        index: RequestIndex,
        saml_request_id: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            index,
            saml_request_id: saml_request_id.into(),
            uri: uri.into(),
        }
    }
}

/// An assertion that has already passed signature and condition checks.
///
/// Only the parts needed to build a session are kept. Producing one is the
/// job of the response validator; this crate never parses XML.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct Assertion {
    /// Entity ID of the issuing IdP.
    pub issuer: String,
    /// `NameID` value of the subject, when the IdP sent one.
    pub subject: Option<String>,
    /// `SessionIndex` from the `AuthnStatement`, needed for single logout.
    pub session_index: Option<String>,
    pub attributes: Vec<AssertionAttribute>,
}

impl Assertion {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Self::default()
        }
    }

    /// Set the `NameID`.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the `SessionIndex`.
    #[must_use]
    pub fn with_session_index(mut self, session_index: impl Into<String>) -> Self {
        self.session_index = Some(session_index.into());
        self
    }

    /// Append an attribute statement entry.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AssertionAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// One `<Attribute>` of an attribute statement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct AssertionAttribute {
    pub name: String,
    pub friendly_name: Option<String>,
    pub values: Vec<String>,
}

impl AssertionAttribute {
    #[must_use]
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            friendly_name: None,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn with_friendly_name(mut self, friendly_name: impl Into<String>) -> Self {
        self.friendly_name = Some(friendly_name.into());
        self
    }
}
