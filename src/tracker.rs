use std::sync::Arc;

use cookie::SameSite;
use time::Duration;
use url::Url;

use crate::codec::TrackedRequestCodec;
use crate::error::Error;
use crate::random::generate_index;
use crate::store::{CookieStore, HttpContext};
use crate::types::{RequestIndex, TrackedRequest};

/// Key of the encoded payload inside a cookie's value bag.
pub(crate) const VALUE_KEY: &str = "value";

/// Default prefix of tracking cookie names.
pub const DEFAULT_NAME_PREFIX: &str = "saml_";

/// Tracks pending authentication requests, one cookie per request.
///
/// Each request gets a random index; its cookie is named `prefix + index`
/// and its signed payload repeats the index, so a payload copied under
/// another cookie name is rejected.
pub struct RequestTracker {
    pub(crate) store: Arc<dyn CookieStore>,
    pub(crate) codec: Arc<dyn TrackedRequestCodec>,
    pub(crate) acs_url: Url,
    pub(crate) name_prefix: String,
    pub(crate) max_age: Duration,
    pub(crate) same_site: Option<SameSite>,
}

impl RequestTracker {
    /// Tracker writing cookies scoped to `acs_url`.
    ///
    /// Cookies are `Secure` when the ACS URL is https, live for
    /// [`MAX_ISSUE_DELAY`](crate::provider::MAX_ISSUE_DELAY) and are named
    /// with [`DEFAULT_NAME_PREFIX`].
    #[must_use]
    pub fn new(
        store: Arc<dyn CookieStore>,
        codec: Arc<dyn TrackedRequestCodec>,
        acs_url: Url,
    ) -> Self {
        Self {
            store,
            codec,
            acs_url,
            name_prefix: DEFAULT_NAME_PREFIX.into(),
            max_age: crate::provider::MAX_ISSUE_DELAY,
            same_site: None,
        }
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// `SameSite` attribute for tracking cookies (unset by default).
    ///
    /// The response usually arrives as a cross-site POST from the IdP, so
    /// `Strict` and `Lax` will keep the cookie from coming back.
    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    #[must_use]
    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    /// Start tracking the `AuthnRequest` with ID `saml_request_id`.
    ///
    /// Returns the index to send as `RelayState`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the request cannot be encoded, or
    /// [`Error::Store`] if the cookie cannot be created or saved.
    pub fn track_request(
        &self,
        cx: &mut HttpContext,
        saml_request_id: &str,
        uri: &str,
    ) -> Result<RequestIndex, Error> {
        let tracked = TrackedRequest::new(generate_index(), saml_request_id, uri);
        let signed = self.codec.encode(&tracked)?;

        let mut cookie = self.store.create(cx, &self.name(&tracked.index))?;
        cookie.values.insert(VALUE_KEY.into(), signed);
        cookie.options.max_age = Some(self.max_age);
        cookie.options.http_only = true;
        cookie.options.secure = self.acs_url.scheme() == "https";
        cookie.options.path = self.acs_url.path().to_owned();
        cookie.options.same_site = self.same_site;

        self.store.save(cx, &cookie)?;

        tracing::debug!(
            index = %tracked.index,
            saml_request_id = %saml_request_id,
            "Tracking SAML request"
        );
        Ok(tracked.index)
    }

    /// Stop tracking the request at `index`, deleting its cookie.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoTrackedRequest`] if the request carries no cookie
    /// for `index`, or [`Error::Store`] if the cookie cannot be fetched or
    /// saved.
    pub fn stop_tracking_request(&self, cx: &mut HttpContext, index: &str) -> Result<(), Error> {
        let mut cookie = self.store.get(cx, &self.name(index))?;
        if cookie.is_new() {
            return Err(Error::NoTrackedRequest);
        }
        cookie.options.path = self.acs_url.path().to_owned();
        cookie.expire();
        self.store.save(cx, &cookie)?;

        tracing::debug!(index = %index, "Stopped tracking SAML request");
        Ok(())
    }

    /// The pending request at `index`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoTrackedRequest`] if no (or an empty) cookie exists for `index`
    /// - [`Error::Codec`] if the cookie does not decode
    /// - [`Error::IndexMismatch`] if the cookie holds another index's request
    /// - [`Error::Store`] if the cookie cannot be fetched
    pub fn get_tracked_request(
        &self,
        cx: &HttpContext,
        index: &str,
    ) -> Result<TrackedRequest, Error> {
        let cookie = self.store.get(cx, &self.name(index))?;

        let signed = cookie
            .values
            .get(VALUE_KEY)
            .filter(|v| !v.is_empty())
            .ok_or(Error::NoTrackedRequest)?;

        let tracked = self.codec.decode(signed)?;

        if tracked.index.as_str() != index {
            tracing::warn!(
                expected = %index,
                actual = %tracked.index,
                "Tracking cookie holds another request's index"
            );
            return Err(Error::IndexMismatch {
                expected: index.to_owned(),
                actual: tracked.index.0,
            });
        }

        Ok(tracked)
    }

    /// All pending requests whose cookies the request carries.
    ///
    /// Best effort: cookies that cannot be read, are empty, do not decode,
    /// or hold another index's request are skipped.
    pub fn get_tracked_requests<'a>(
        &'a self,
        cx: &'a HttpContext,
    ) -> impl Iterator<Item = TrackedRequest> + 'a {
        cx.cookies()
            .filter(move |c| c.name().starts_with(&self.name_prefix))
            .filter_map(move |c| self.read_named(cx, c.name()))
    }

    fn read_named(&self, cx: &HttpContext, name: &str) -> Option<TrackedRequest> {
        let index = name.strip_prefix(&self.name_prefix)?;

        let cookie = match self.store.get(cx, name) {
            Ok(cookie) => cookie,
            Err(e) => {
                tracing::debug!(cookie = %name, error = %e, "Skipping unreadable tracking cookie");
                return None;
            }
        };

        let signed = cookie.values.get(VALUE_KEY).filter(|v| !v.is_empty())?;

        let tracked = match self.codec.decode(signed) {
            Ok(tracked) => tracked,
            Err(e) => {
                tracing::debug!(cookie = %name, error = %e, "Skipping undecodable tracking cookie");
                return None;
            }
        };

        if tracked.index.as_str() != index {
            tracing::debug!(cookie = %name, "Skipping tracking cookie with foreign index");
            return None;
        }

        Some(tracked)
    }

    fn name(&self, index: impl AsRef<str>) -> String {
        format!("{}{}", self.name_prefix, index.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use cookie::{Cookie, Key};
    use http::Uri;

    use super::*;
    use crate::codec::{CodecError, SignedTrackedRequestCodec};
    use crate::store::testing::{FailingStore, next_request};
    use crate::store::{CookieJarStore, StoreError};

    const AUDIENCE: &str = "https://sp.example.com/saml/metadata";

    fn acs_url() -> Url {
        "https://sp.example.com/saml/acs".parse().unwrap()
    }

    fn tracker_with(store: Arc<dyn CookieStore>) -> RequestTracker {
        let codec = SignedTrackedRequestCodec::new(Key::generate(), AUDIENCE);
        RequestTracker::new(store, Arc::new(codec), acs_url())
    }

    fn tracker() -> RequestTracker {
        tracker_with(Arc::new(CookieJarStore::plain()))
    }

    fn login_request() -> HttpContext {
        HttpContext::new(Uri::from_static("https://sp.example.com/dashboard"))
    }

    fn acs_request(previous: &HttpContext) -> HttpContext {
        next_request(previous, Uri::from_static("https://sp.example.com/saml/acs"))
    }

    #[test]
    fn track_then_get() {
        let tracker = tracker();
        let mut cx = login_request();

        let index = tracker.track_request(&mut cx, "req-1", "/dashboard").unwrap();

        let tracked = tracker.get_tracked_request(&cx, index.as_str()).unwrap();
        assert_eq!(tracked.index, index);
        assert_eq!(tracked.saml_request_id, "req-1");
        assert_eq!(tracked.uri, "/dashboard");
    }

    #[test]
    fn full_round_trip_through_browser() {
        let tracker = tracker();
        let mut login = login_request();
        let index = tracker.track_request(&mut login, "req-1", "/dashboard").unwrap();

        let mut acs = acs_request(&login);
        let tracked = tracker.get_tracked_request(&acs, index.as_str()).unwrap();
        assert_eq!(tracked.saml_request_id, "req-1");

        tracker.stop_tracking_request(&mut acs, index.as_str()).unwrap();
        assert!(matches!(
            tracker.get_tracked_request(&acs, index.as_str()),
            Err(Error::NoTrackedRequest)
        ));

        let headers: Vec<_> = acs.set_cookie_headers().collect();
        assert_eq!(headers.len(), 1);
        assert!(headers[0].starts_with(&format!("saml_{index}=;")));
        assert!(headers[0].contains("Path=/saml/acs"));
        assert!(headers[0].contains("Max-Age=0"));
    }

    #[test]
    fn tracking_cookie_attributes() {
        let tracker = tracker();
        let mut cx = login_request();
        let index = tracker.track_request(&mut cx, "req-1", "/").unwrap();

        let name = format!("saml_{index}");
        let cookie = cx.cookies().find(|c| c.name() == name).unwrap();
        assert_eq!(cookie.max_age(), Some(Duration::seconds(90)));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/saml/acs"));
        assert_eq!(cookie.same_site(), None);
    }

    #[test]
    fn plain_http_acs_is_not_secure() {
        let codec = SignedTrackedRequestCodec::new(Key::generate(), AUDIENCE);
        let tracker = RequestTracker::new(
            Arc::new(CookieJarStore::plain()),
            Arc::new(codec),
            "http://localhost:8000/sso/saml/acs".parse().unwrap(),
        )
        .with_same_site(SameSite::None);
        let mut cx = HttpContext::default();
        let index = tracker.track_request(&mut cx, "req-1", "/").unwrap();

        let name = format!("saml_{index}");
        let cookie = cx.cookies().find(|c| c.name() == name).unwrap();
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.path(), Some("/sso/saml/acs"));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
    }

    #[test]
    fn unknown_index_is_no_tracked_request() {
        let tracker = tracker();
        assert!(matches!(
            tracker.get_tracked_request(&login_request(), "never-issued"),
            Err(Error::NoTrackedRequest)
        ));
    }

    #[test]
    fn stopping_unknown_index_is_no_tracked_request() {
        let tracker = tracker();
        let mut cx = acs_request(&login_request());
        assert!(matches!(
            tracker.stop_tracking_request(&mut cx, "never-issued"),
            Err(Error::NoTrackedRequest)
        ));
        assert_eq!(cx.set_cookie_headers().count(), 0);
    }

    #[test]
    fn empty_value_is_no_tracked_request() {
        let store = CookieJarStore::plain();
        let mut cx = HttpContext::default();
        let mut cookie = store.create(&cx, "saml_ix").unwrap();
        cookie.values.insert(VALUE_KEY.into(), String::new());
        store.save(&mut cx, &cookie).unwrap();

        let tracker = tracker_with(Arc::new(store));
        assert!(matches!(
            tracker.get_tracked_request(&cx, "ix"),
            Err(Error::NoTrackedRequest)
        ));
    }

    #[test]
    fn substituted_cookie_is_index_mismatch() {
        let tracker = tracker();
        let mut login = login_request();
        let index_a = tracker.track_request(&mut login, "req-a", "/a").unwrap();
        let index_b = tracker.track_request(&mut login, "req-b", "/b").unwrap();

        let value_b = login
            .cookies()
            .find(|c| c.name() == format!("saml_{index_b}"))
            .unwrap()
            .value()
            .to_owned();
        let forged = HttpContext::default().with_cookie(Cookie::new(format!("saml_{index_a}"), value_b));

        match tracker.get_tracked_request(&forged, index_a.as_str()) {
            Err(Error::IndexMismatch { expected, actual }) => {
                assert_eq!(expected, index_a.as_str());
                assert_eq!(actual, index_b.as_str());
            }
            other => panic!("expected index mismatch, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_payload_is_codec_error() {
        let store = CookieJarStore::plain();
        let mut cx = HttpContext::default();
        let mut cookie = store.create(&cx, "saml_ix").unwrap();
        cookie.values.insert(VALUE_KEY.into(), "garbage".into());
        store.save(&mut cx, &cookie).unwrap();

        let tracker = tracker_with(Arc::new(store));
        assert!(matches!(
            tracker.get_tracked_request(&cx, "ix"),
            Err(Error::Codec(CodecError::Signature))
        ));
    }

    #[test]
    fn enumeration_skips_junk() {
        let store = Arc::new(CookieJarStore::plain());
        let tracker = tracker_with(store.clone());
        let mut login = login_request();
        let a = tracker.track_request(&mut login, "req-a", "/a").unwrap();
        let b = tracker.track_request(&mut login, "req-b", "/b").unwrap();
        let value_a = login
            .cookies()
            .find(|c| c.name() == format!("saml_{a}"))
            .unwrap()
            .value()
            .to_owned();

        let mut cx = acs_request(&login)
            .with_cookie(Cookie::new("session", "unrelated"))
            .with_cookie(Cookie::new("saml_broken", "!!!"))
            .with_cookie(Cookie::new("saml_copied", value_a));
        let mut empty = store.create(&cx, "saml_empty").unwrap();
        empty.values.insert(VALUE_KEY.into(), String::new());
        store.save(&mut cx, &empty).unwrap();
        let mut unsigned = store.create(&cx, "saml_unsigned").unwrap();
        unsigned.values.insert(VALUE_KEY.into(), "not signed".into());
        store.save(&mut cx, &unsigned).unwrap();

        let mut found: Vec<_> = tracker
            .get_tracked_requests(&cx)
            .map(|t| t.saml_request_id)
            .collect();
        found.sort();
        assert_eq!(found, ["req-a", "req-b"]);

        let indices: Vec<_> = tracker.get_tracked_requests(&cx).map(|t| t.index).collect();
        assert!(indices.contains(&a));
        assert!(indices.contains(&b));
    }

    #[test]
    fn enumeration_respects_prefix() {
        let tracker = tracker().with_name_prefix("authn_");
        let mut cx = login_request();
        let index = tracker.track_request(&mut cx, "req-1", "/").unwrap();

        assert!(cx.cookies().any(|c| c.name() == format!("authn_{index}")));
        assert_eq!(tracker.get_tracked_requests(&cx).count(), 1);
        assert_eq!(tracker.get_tracked_requests(&HttpContext::default()).count(), 0);
    }

    #[test]
    fn distinct_indices() {
        let tracker = tracker();
        let mut cx = login_request();
        let first = tracker.track_request(&mut cx, "req-1", "/").unwrap();
        let second = tracker.track_request(&mut cx, "req-1", "/").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn store_failures_propagate() {
        let failing = |configure: fn(&mut FailingStore)| {
            let mut store = FailingStore::default();
            configure(&mut store);
            tracker_with(Arc::new(store))
        };

        let tracker = failing(|s| s.fail_create = true);
        assert!(matches!(
            tracker.track_request(&mut login_request(), "req-1", "/"),
            Err(Error::Store(StoreError::Backend(_)))
        ));

        let tracker = failing(|s| s.fail_save = true);
        assert!(matches!(
            tracker.track_request(&mut login_request(), "req-1", "/"),
            Err(Error::Store(_))
        ));
        let mut login = login_request();
        let index = tracker_with(Arc::new(CookieJarStore::plain()))
            .track_request(&mut login, "req-1", "/")
            .unwrap();
        assert!(matches!(
            tracker.stop_tracking_request(&mut acs_request(&login), index.as_str()),
            Err(Error::Store(StoreError::Backend(_)))
        ));

        let tracker = failing(|s| s.fail_get = true);
        assert!(matches!(
            tracker.stop_tracking_request(&mut login_request(), "ix"),
            Err(Error::Store(_))
        ));
        assert!(matches!(
            tracker.get_tracked_request(&login_request(), "ix"),
            Err(Error::Store(_))
        ));
    }

    #[test]
    fn enumeration_skips_store_failures() {
        let mut store = FailingStore::default();
        store.fail_get = true;
        let tracker = tracker_with(Arc::new(store));
        let cx = HttpContext::default().with_cookie(Cookie::new("saml_ix", "whatever"));
        assert_eq!(tracker.get_tracked_requests(&cx).count(), 0);
    }

    #[test]
    fn signed_store_round_trip() {
        let tracker = tracker_with(Arc::new(CookieJarStore::signed(Key::generate())));
        let mut login = login_request();
        let index = tracker.track_request(&mut login, "req-1", "/dashboard").unwrap();

        let acs = acs_request(&login);
        let tracked = tracker.get_tracked_request(&acs, index.as_str()).unwrap();
        assert_eq!(tracked.uri, "/dashboard");
        assert_eq!(tracker.get_tracked_requests(&acs).count(), 1);
    }
}
