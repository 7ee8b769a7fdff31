//! Provider signing key set.
//!
//! This module keeps the identity provider's JSON Web Key Set (JWKS) in
//! memory for bearer token validation.
//!
//! # Refresh policy
//!
//! The key set is fetched lazily and re-fetched only when a token names a
//! `kid` the current set does not contain. There is no TTL-driven refresh.
//!
//! # Concurrency
//!
//! The current set lives behind an [`ArcSwap`]. Readers take a snapshot with a
//! single atomic load, and a refresh builds a complete new
//! [`SigningKeySet`] before storing it. A reader therefore always sees either
//! the old or the new set, never a mix.
//!
//! Fetches are serialized by a refresh lock. A lookup that misses waits for
//! the lock, and if another lookup completed a fetch in the meantime it reuses
//! that outcome instead of fetching again. A burst of unknown `kid`s therefore
//! costs one provider round trip, not one per request.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use url::Url;

/// Maximum accepted JWKS response size.
const MAX_RESPONSE_SIZE: u64 = 1024 * 1024;

/// Errors that can occur while fetching the signing key set.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JwksError {
    /// A connection-level error occurred while fetching the JWKS.
    #[error("Network error: {0}")]
    Network(String),

    /// The JWKS endpoint returned a non-success status code.
    #[error("HTTP error: status {status}")]
    Http {
        /// Status returned by the endpoint.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The JWKS response could not be parsed.
    #[error("Failed to parse JWKS: {0}")]
    Parse(String),

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: u64,
    },
}

/// A verification key and the algorithm it is pinned to, if any.
#[derive(Debug, Clone)]
pub struct SigningKey {
    /// Key used to verify signatures.
    pub decoding_key: DecodingKey,
    /// Algorithm declared by the JWK `alg` member.
    pub algorithm: Option<Algorithm>,
}

/// Immutable mapping from key id to verification key.
#[derive(Debug, Clone, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, SigningKey>,
}

impl SigningKeySet {
    /// Builds a key set from a JWKS document.
    ///
    /// Encryption keys, keys without a `kid` and keys that cannot be turned
    /// into a decoding key are skipped.
    #[must_use]
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let keys = jwks
            .keys
            .iter()
            .filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .filter_map(|jwk| {
                let kid = jwk.common.key_id.clone()?;
                match DecodingKey::from_jwk(jwk) {
                    Ok(decoding_key) => Some((
                        kid,
                        SigningKey {
                            decoding_key,
                            algorithm: jwk_algorithm(jwk),
                        },
                    )),
                    Err(e) => {
                        tracing::warn!(kid = %kid, error = %e, "Skipping unusable JWK");
                        None
                    }
                }
            })
            .collect();

        Self { keys }
    }

    /// Looks up a key by id.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    /// Returns `true` if the set contains the key id.
    #[must_use]
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// Returns the key ids in the set, sorted.
    #[must_use]
    pub fn key_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Cache for the provider's signing key set.
///
/// Owned by the token validator and shared by handle (`Arc`) with every
/// validating call site.
pub struct SigningKeyCache {
    http_client: reqwest::Client,
    jwks_uri: Url,
    current: ArcSwap<SigningKeySet>,
    max_response_size: u64,
    /// Completed fetch attempts, successful or not.
    attempts: AtomicU64,
    /// Serializes fetches and holds the error of the last failed attempt.
    refresh_lock: tokio::sync::Mutex<Option<JwksError>>,
}

impl SigningKeyCache {
    /// Creates an empty cache for the given JWKS endpoint.
    #[must_use]
    pub fn new(http_client: reqwest::Client, jwks_uri: Url) -> Self {
        Self::with_key_set(http_client, jwks_uri, SigningKeySet::default())
    }

    /// Creates a cache pre-populated with a key set.
    #[must_use]
    pub fn with_key_set(http_client: reqwest::Client, jwks_uri: Url, keys: SigningKeySet) -> Self {
        Self {
            http_client,
            jwks_uri,
            current: ArcSwap::from_pointee(keys),
            max_response_size: MAX_RESPONSE_SIZE,
            attempts: AtomicU64::new(0),
            refresh_lock: tokio::sync::Mutex::new(None),
        }
    }

    /// Sets the maximum accepted JWKS body size in bytes.
    #[must_use]
    pub fn with_max_response_size(mut self, max_size: u64) -> Self {
        self.max_response_size = max_size;
        self
    }

    /// Returns the JWKS endpoint this cache fetches from.
    #[must_use]
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    /// Returns a snapshot of the current key set.
    #[must_use]
    pub fn snapshot(&self) -> Arc<SigningKeySet> {
        self.current.load_full()
    }

    /// Returns the number of completed fetch attempts.
    #[must_use]
    pub fn fetch_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Returns a key set that had a chance to pick up `kid`.
    ///
    /// If the current set lacks `kid`, at most one fetch is made. Lookups that
    /// miss while another fetch is in flight share its outcome.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or the error of the concurrent fetch this
    /// lookup waited on.
    pub async fn refresh_for(&self, kid: &str) -> Result<Arc<SigningKeySet>, JwksError> {
        let seen = self.attempts.load(Ordering::Acquire);
        let current = self.snapshot();
        if current.contains(kid) {
            return Ok(current);
        }

        let mut last_error = self.refresh_lock.lock().await;
        if self.attempts.load(Ordering::Acquire) != seen {
            tracing::trace!(kid = %kid, "Reusing concurrent key set refresh");
            return match last_error.as_ref() {
                Some(err) => Err(err.clone()),
                None => Ok(self.snapshot()),
            };
        }

        self.fetch_locked(&mut last_error).await
    }

    /// Fetches the key set from the provider and replaces the cached one.
    ///
    /// Returns the freshly stored set so the caller can look a key up in
    /// exactly the set it fetched.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the endpoint answers with a
    /// non-success status, the body is too large, or it is not a JWKS
    /// document.
    pub async fn refresh(&self) -> Result<Arc<SigningKeySet>, JwksError> {
        let mut last_error = self.refresh_lock.lock().await;
        self.fetch_locked(&mut last_error).await
    }

    async fn fetch_locked(
        &self,
        last_error: &mut Option<JwksError>,
    ) -> Result<Arc<SigningKeySet>, JwksError> {
        let result = self.fetch().await;
        *last_error = result.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::AcqRel);

        let keys = Arc::new(result?);
        self.current.store(Arc::clone(&keys));
        tracing::debug!(
            jwks_uri = %self.jwks_uri,
            keys = keys.len(),
            "Replaced signing key set"
        );
        Ok(keys)
    }

    async fn fetch(&self) -> Result<SigningKeySet, JwksError> {
        tracing::debug!(jwks_uri = %self.jwks_uri, "Fetching signing key set");

        let mut response = self
            .http_client
            .get(self.jwks_uri.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(jwks_uri = %self.jwks_uri, error = %e, "Failed to fetch JWKS");
                JwksError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(jwks_uri = %self.jwks_uri, status = %status, "JWKS endpoint rejected the request");
            return Err(JwksError::Http {
                status: status.as_u16(),
                body,
            });
        }

        // Chunked bodies carry no Content-Length, so the limit is enforced
        // while reading.
        let too_large = || JwksError::ResponseTooLarge {
            max_size: self.max_response_size,
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.max_response_size)
        {
            return Err(too_large());
        }
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| JwksError::Network(e.to_string()))?
        {
            if (body.len() + chunk.len()) as u64 > self.max_response_size {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        let jwks: JwkSet =
            serde_json::from_slice(&body).map_err(|e| JwksError::Parse(e.to_string()))?;
        Ok(SigningKeySet::from_jwks(&jwks))
    }
}

/// Extracts the algorithm from a JWK.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRIMARY_JWK: &str = include_str!("../../tests/fixtures/primary.jwk.json");
    const ROTATED_JWK: &str = include_str!("../../tests/fixtures/rotated.jwk.json");

    fn jwks(keys: &[&str]) -> serde_json::Value {
        let keys: Vec<serde_json::Value> = keys
            .iter()
            .map(|k| serde_json::from_str(k).unwrap())
            .collect();
        serde_json::json!({ "keys": keys })
    }

    #[test]
    fn test_key_set_from_jwks() {
        let doc: JwkSet = serde_json::from_value(jwks(&[PRIMARY_JWK, ROTATED_JWK])).unwrap();
        let set = SigningKeySet::from_jwks(&doc);

        assert_eq!(set.len(), 2);
        assert_eq!(set.key_ids(), vec!["primary-key", "rotated-key"]);
        assert_eq!(
            set.get("primary-key").unwrap().algorithm,
            Some(Algorithm::RS256)
        );
    }

    #[test]
    fn test_key_set_skips_encryption_and_anonymous_keys() {
        let mut enc: serde_json::Value = serde_json::from_str(ROTATED_JWK).unwrap();
        enc["use"] = "enc".into();
        enc["alg"] = "RSA-OAEP".into();
        let mut anonymous: serde_json::Value = serde_json::from_str(PRIMARY_JWK).unwrap();
        anonymous.as_object_mut().unwrap().remove("kid");

        let doc: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [serde_json::from_str::<serde_json::Value>(PRIMARY_JWK).unwrap(), enc, anonymous]
        }))
        .unwrap();
        let set = SigningKeySet::from_jwks(&doc);

        assert_eq!(set.key_ids(), vec!["primary-key"]);
    }

    #[tokio::test]
    async fn test_refresh_replaces_whole_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&[PRIMARY_JWK])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&[ROTATED_JWK])))
            .mount(&server)
            .await;

        let uri = Url::parse(&format!("{}/certs", server.uri())).unwrap();
        let cache = SigningKeyCache::new(reqwest::Client::new(), uri);
        assert!(cache.snapshot().is_empty());

        let first = cache.refresh().await.unwrap();
        assert_eq!(first.key_ids(), vec!["primary-key"]);

        let second = cache.refresh().await.unwrap();
        assert_eq!(second.key_ids(), vec!["rotated-key"]);

        // Old snapshots stay intact after the swap
        assert_eq!(first.key_ids(), vec!["primary-key"]);
        assert_eq!(cache.snapshot().key_ids(), vec!["rotated-key"]);
    }

    #[tokio::test]
    async fn test_refresh_http_error_keeps_previous_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let uri = Url::parse(&format!("{}/certs", server.uri())).unwrap();
        let doc: JwkSet = serde_json::from_value(jwks(&[PRIMARY_JWK])).unwrap();
        let cache = SigningKeyCache::with_key_set(
            reqwest::Client::new(),
            uri,
            SigningKeySet::from_jwks(&doc),
        );

        let err = cache.refresh().await.unwrap_err();
        assert!(matches!(err, JwksError::Http { status: 503, .. }));
        assert!(cache.snapshot().contains("primary-key"));
    }

    #[tokio::test]
    async fn test_refresh_rejects_non_jwks_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let uri = Url::parse(&format!("{}/certs", server.uri())).unwrap();
        let cache = SigningKeyCache::new(reqwest::Client::new(), uri);

        assert!(matches!(
            cache.refresh().await.unwrap_err(),
            JwksError::Parse(_)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_oversized_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&[PRIMARY_JWK, ROTATED_JWK])))
            .mount(&server)
            .await;

        let uri = Url::parse(&format!("{}/certs", server.uri())).unwrap();
        let cache = SigningKeyCache::new(reqwest::Client::new(), uri).with_max_response_size(256);

        assert!(matches!(
            cache.refresh().await.unwrap_err(),
            JwksError::ResponseTooLarge { max_size: 256 }
        ));
        assert!(cache.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_rejects_oversized_chunked_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Streams chunks forever without a Content-Length
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ntransfer-encoding: chunked\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let chunk = format!("40\r\n{}\r\n", " ".repeat(64));
            while socket.write_all(chunk.as_bytes()).await.is_ok() {}
        });

        let uri = Url::parse(&format!("http://{addr}/certs")).unwrap();
        let cache = SigningKeyCache::new(reqwest::Client::new(), uri).with_max_response_size(1024);

        assert!(matches!(
            cache.refresh().await.unwrap_err(),
            JwksError::ResponseTooLarge { max_size: 1024 }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks(&[PRIMARY_JWK]))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let uri = Url::parse(&format!("{}/certs", server.uri())).unwrap();
        let cache = Arc::new(SigningKeyCache::new(reqwest::Client::new(), uri));

        let lookups: Vec<_> = (0..20)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.refresh_for(&format!("forged-{i}")).await })
            })
            .collect();
        for lookup in lookups {
            let keys = lookup.await.unwrap().unwrap();
            assert_eq!(keys.key_ids(), vec!["primary-key"]);
        }
        assert_eq!(cache.fetch_attempts(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(
                ResponseTemplate::new(500).set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let uri = Url::parse(&format!("{}/certs", server.uri())).unwrap();
        let cache = Arc::new(SigningKeyCache::new(reqwest::Client::new(), uri));

        let lookups: Vec<_> = (0..5)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.refresh_for(&format!("kid-{i}")).await })
            })
            .collect();
        for lookup in lookups {
            assert!(matches!(
                lookup.await.unwrap(),
                Err(JwksError::Http { status: 500, .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_sequential_miss_fetches_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&[PRIMARY_JWK])))
            .expect(2)
            .mount(&server)
            .await;

        let uri = Url::parse(&format!("{}/certs", server.uri())).unwrap();
        let cache = SigningKeyCache::new(reqwest::Client::new(), uri);

        cache.refresh_for("rotated-key").await.unwrap();
        cache.refresh_for("rotated-key").await.unwrap();
        // A known kid is served from the snapshot
        cache.refresh_for("primary-key").await.unwrap();
        assert_eq!(cache.fetch_attempts(), 2);
    }

    #[test]
    fn test_jwks_error_display() {
        let err = JwksError::Network("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");

        let err = JwksError::Http {
            status: 404,
            body: String::new(),
        };
        assert_eq!(err.to_string(), "HTTP error: status 404");

        let err = JwksError::ResponseTooLarge { max_size: 1024 };
        assert_eq!(
            err.to_string(),
            "Response exceeds maximum size of 1024 bytes"
        );
    }
}
