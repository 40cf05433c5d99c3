use std::sync::Arc;

use crate::codec::{SessionCodec, SignedSessionCodec, SignedTrackedRequestCodec};
use crate::config::Options;
use crate::error::Error;
use crate::provider::ServiceProvider;
use crate::session::SessionProvider;
use crate::store::CookieStore;
use crate::tracker::RequestTracker;

/// Service provider identity plus the request tracker and session provider
/// built for it.
///
/// Fields are public: replace or reconfigure any component after
/// [`Middleware::new`].
pub struct Middleware<C = SignedSessionCodec> {
    pub service_provider: ServiceProvider,
    pub request_tracker: RequestTracker,
    pub session: SessionProvider<C>,
}

impl Middleware<SignedSessionCodec> {
    /// Wire the default components for `options`, sharing `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the service provider endpoints cannot be
    /// derived from the root URL.
    pub fn new(store: Arc<dyn CookieStore>, options: Options) -> Result<Self, Error> {
        let mut service_provider = ServiceProvider::from_root_url(&options.url)?;
        if let Some(entity_id) = &options.entity_id {
            service_provider = service_provider.with_entity_id(entity_id.clone());
        }

        let max_age = options.session_max_age();
        let session_codec =
            SignedSessionCodec::new(options.key.clone(), service_provider.entity_id(), max_age);
        let mut session = SessionProvider::new(store.clone(), session_codec)
            .with_name(options.session_cookie_name())
            .with_domain(options.session_cookie_domain())
            .with_max_age(max_age)
            .with_secure(options.session_cookie_secure());

        let tracker_codec =
            SignedTrackedRequestCodec::new(options.key.clone(), service_provider.entity_id())
                .with_max_age(service_provider.max_issue_delay());
        let mut request_tracker = RequestTracker::new(
            store,
            Arc::new(tracker_codec),
            service_provider.acs_url().clone(),
        )
        .with_name_prefix(options.request_cookie_prefix())
        .with_max_age(service_provider.max_issue_delay());

        if let Some(same_site) = options.cookie_same_site {
            session = session.with_same_site(same_site);
            request_tracker = request_tracker.with_same_site(same_site);
        }

        tracing::debug!(
            entity_id = %service_provider.entity_id(),
            acs_url = %service_provider.acs_url(),
            "SAML service provider configured"
        );

        Ok(Self {
            service_provider,
            request_tracker,
            session,
        })
    }
}

impl<C: SessionCodec> Middleware<C> {
    /// Swap the session provider, e.g. for one with a custom codec.
    #[must_use]
    pub fn with_session_provider<D: SessionCodec>(self, session: SessionProvider<D>) -> Middleware<D> {
        Middleware {
            service_provider: self.service_provider,
            request_tracker: self.request_tracker,
            session,
        }
    }
}
