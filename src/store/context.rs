use cookie::{Cookie, CookieJar};
use http::header::{COOKIE, SET_COOKIE};
use http::uri::Scheme;
use http::{HeaderMap, HeaderValue, Uri};

/// Cookie view of one request/response cycle.
///
/// Seeded from the inbound `Cookie` headers; every write lands in the jar's
/// delta, which becomes the outbound `Set-Cookie` headers. Reads see earlier
/// writes from the same cycle.
#[derive(Debug, Clone, Default)]
pub struct HttpContext {
    uri: Uri,
    jar: CookieJar,
}

impl HttpContext {
    /// Context for a request with no cookies.
    #[must_use]
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            jar: CookieJar::new(),
        }
    }

    /// Build from the request head.
    #[must_use]
    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self::from_headers(parts.uri.clone(), &parts.headers)
    }

    /// Build from a URI and the request headers.
    ///
    /// Malformed cookie pairs are dropped, the rest are kept.
    #[must_use]
    pub fn from_headers(uri: Uri, headers: &HeaderMap) -> Self {
        let mut jar = CookieJar::new();
        for value in headers.get_all(COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for cookie in Cookie::split_parse_encoded(value.to_owned()).flatten() {
                jar.add_original(cookie);
            }
        }
        Self { uri, jar }
    }

    /// Add an inbound cookie, as if the client had sent it.
    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.jar.add_original(cookie);
        self
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Whether the request itself arrived over https.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.uri.scheme() == Some(&Scheme::HTTPS)
    }

    /// Cookies currently attached: inbound ones plus this cycle's writes,
    /// minus this cycle's removals.
    pub fn cookies(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.jar.iter()
    }

    /// Outbound `Set-Cookie` header values.
    pub fn set_cookie_headers(&self) -> impl Iterator<Item = String> + '_ {
        self.jar.delta().map(|cookie| cookie.encoded().to_string())
    }

    /// Append this cycle's `Set-Cookie` headers to a response.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        for value in self.set_cookie_headers() {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(error = %e, "Dropping unencodable Set-Cookie header"),
            }
        }
    }

    pub(crate) fn jar(&self) -> &CookieJar {
        &self.jar
    }

    pub(crate) fn jar_mut(&mut self) -> &mut CookieJar {
        &mut self.jar
    }
}

#[cfg(feature = "axum")]
mod axum_impls {
    use std::convert::Infallible;

    use axum::extract::FromRequestParts;
    use axum::http::request::Parts;
    use axum::response::{IntoResponseParts, ResponseParts};

    use super::HttpContext;

    impl<S: Send + Sync> FromRequestParts<S> for HttpContext {
        type Rejection = Infallible;

        async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
            Ok(Self::from_parts(parts))
        }
    }

    impl IntoResponseParts for HttpContext {
        type Error = Infallible;

        fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
            self.write_headers(res.headers_mut());
            Ok(res)
        }
    }
}
