use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

use crate::types::RequestIndex;

/// Number of random bytes behind every request index.
pub const INDEX_ENTROPY_BYTES: usize = 42;

/// Generates a fresh request index.
///
/// Returns a 56-character URL-safe string (42 random bytes → base64url).
#[must_use]
pub fn generate_index() -> RequestIndex {
    let random_bytes: [u8; INDEX_ENTROPY_BYTES] = rand::rng().random();
    RequestIndex(URL_SAFE_NO_PAD.encode(random_bytes))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_index_length() {
        let index = generate_index();
        assert_eq!(index.as_str().len(), 56);
    }

    #[test]
    fn test_index_url_safe() {
        let index = generate_index();
        assert!(
            index
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "index should be URL-safe: {index}"
        );
    }

    #[test]
    fn test_index_decodes_to_full_entropy() {
        let index = generate_index();
        let bytes = URL_SAFE_NO_PAD.decode(index.as_str()).unwrap();
        assert_eq!(bytes.len(), INDEX_ENTROPY_BYTES);
    }

    #[test]
    fn test_index_uniqueness() {
        let indices: HashSet<_> = (0..1000).map(|_| generate_index()).collect();
        assert_eq!(indices.len(), 1000, "indices should not collide");
    }
}
