#![doc = include_str!("../README.md")]

pub mod codec;
pub mod config;
pub mod error;
pub mod middleware;
pub mod provider;
pub mod random;
pub mod session;
pub mod store;
pub mod tracker;
pub mod types;

// Re-exports for convenient access
pub use codec::{
    Attributes, CodecError, SessionClaims, SessionCodec, SignedSessionCodec,
    SignedTrackedRequestCodec, TrackedRequestCodec,
};
pub use config::Options;
pub use error::Error;
pub use middleware::Middleware;
pub use provider::{MAX_ISSUE_DELAY, ServiceProvider};
pub use random::generate_index;
pub use session::SessionProvider;
pub use store::{CookieJarStore, CookieOptions, CookieStore, HttpContext, StoreError, StoredCookie};
pub use tracker::RequestTracker;
pub use types::{Assertion, AssertionAttribute, RequestIndex, TrackedRequest};

/// Re-export cookie types used in the public API.
pub use cookie::{Key as CookieKey, SameSite};
