use time::Duration;
use url::Url;

use crate::error::Error;

/// Longest accepted gap between issuing an `AuthnRequest` and receiving
/// its response. Also bounds how long a tracking cookie lives.
pub const MAX_ISSUE_DELAY: Duration = Duration::seconds(90);

/// The endpoints and identity of this service provider.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ServiceProvider {
    pub(crate) entity_id: String,
    pub(crate) acs_url: Url,
    pub(crate) metadata_url: Url,
}

impl ServiceProvider {
    /// Derive endpoints from the application's root URL.
    ///
    /// Metadata is served at `<root>/saml/metadata` and assertions are
    /// consumed at `<root>/saml/acs`. The entity ID defaults to the
    /// metadata URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `root` cannot be used as a base URL.
    pub fn from_root_url(root: &Url) -> Result<Self, Error> {
        let metadata_url = join(root, "saml/metadata")?;
        let acs_url = join(root, "saml/acs")?;
        Ok(Self {
            entity_id: metadata_url.to_string(),
            acs_url,
            metadata_url,
        })
    }

    /// Override the entity ID.
    #[must_use]
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = entity_id.into();
        self
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Assertion consumer service endpoint.
    #[must_use]
    pub fn acs_url(&self) -> &Url {
        &self.acs_url
    }

    #[must_use]
    pub fn metadata_url(&self) -> &Url {
        &self.metadata_url
    }

    #[must_use]
    pub fn max_issue_delay(&self) -> Duration {
        MAX_ISSUE_DELAY
    }
}

fn join(root: &Url, path: &str) -> Result<Url, Error> {
    root.join(path)
        .map_err(|e| Error::Config(format!("cannot derive {path} from {root}: {e}")))
}
