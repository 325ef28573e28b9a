//! Ordered API credentials with a single active entry.

use crate::errors::ClientError;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// An opaque API credential. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Wraps a raw key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::from(key.into()))
    }

    /// The raw key, for placing on the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        write!(f, "Credential(***{tail})")
    }
}

/// Ordered credentials plus the index of the active one.
///
/// Invariant: `0 <= active < credentials.len()` and `credentials` is never
/// empty. The index lives behind one mutex so every read and rotation is a
/// single critical section shared by all concurrent exchanges.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    active: Mutex<usize>,
}

impl CredentialPool {
    /// Builds a pool from raw keys; whitespace is trimmed and blanks dropped.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` when no usable key remains.
    pub fn new<I, S>(keys: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let credentials: Vec<Credential> = keys
            .into_iter()
            .map(|key| key.as_ref().trim().to_string())
            .filter(|key| !key.is_empty())
            .map(Credential::new)
            .collect();

        if credentials.is_empty() {
            return Err(ClientError::Config(
                "credential pool requires at least one API key".to_string(),
            ));
        }

        Ok(Self {
            credentials,
            active: Mutex::new(0),
        })
    }

    /// Builds a pool from a comma-separated key list.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` when the list holds no usable key.
    pub fn from_csv(raw: &str) -> Result<Self, ClientError> {
        Self::new(raw.split(','))
    }

    /// Builds a pool from the `GEMINI_API_KEYS` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` when the variable is unset or empty.
    pub fn from_env() -> Result<Self, ClientError> {
        let keys = shardeval_gemini::discover_api_keys()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Self::new(keys)
    }

    /// Number of credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false; an empty pool cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// The active credential.
    #[must_use]
    pub fn current(&self) -> Credential {
        self.current_with_index().1
    }

    /// The active index.
    #[must_use]
    pub fn active_index(&self) -> usize {
        *self.lock()
    }

    /// The active index and credential, read together.
    #[must_use]
    pub fn current_with_index(&self) -> (usize, Credential) {
        let active = self.lock();
        (*active, self.credentials[*active].clone())
    }

    /// Advances to the next credential (cyclically) and returns it.
    ///
    /// A single-credential pool returns the same credential.
    pub fn rotate(&self) -> Credential {
        let mut active = self.lock();
        *active = (*active + 1) % self.credentials.len();
        tracing::info!(
            event = "credential_rotated",
            index = *active,
            pool_size = self.credentials.len(),
            "credential_rotated"
        );
        self.credentials[*active].clone()
    }

    /// Rotates only if `observed` is still the active index.
    ///
    /// Workers that failed on the same credential concurrently therefore
    /// advance the pool once, not once each. Returns the active credential
    /// after the call.
    pub fn rotate_from(&self, observed: usize) -> Credential {
        let mut active = self.lock();
        if *active == observed {
            *active = (*active + 1) % self.credentials.len();
            tracing::info!(
                event = "credential_rotated",
                index = *active,
                pool_size = self.credentials.len(),
                "credential_rotated"
            );
        } else {
            tracing::debug!(
                event = "credential_rotation_skipped",
                observed,
                active = *active,
                "credential_rotation_skipped"
            );
        }
        self.credentials[*active].clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, usize> {
        // index is always in range, even behind a poisoned lock
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_empty_pool_fails() {
        let err = CredentialPool::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));

        let err = CredentialPool::from_csv(" , ,").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_rotate_cycles() {
        let pool = CredentialPool::from_csv("a,b,c").unwrap();
        assert_eq!(pool.current().expose(), "a");
        assert_eq!(pool.rotate().expose(), "b");
        assert_eq!(pool.rotate().expose(), "c");
        assert_eq!(pool.rotate().expose(), "a");
        assert_eq!(pool.active_index(), 0);
    }

    #[test]
    fn test_single_credential_rotation_returns_same() {
        let pool = CredentialPool::new(["only"]).unwrap();
        assert_eq!(pool.rotate().expose(), "only");
        assert_eq!(pool.active_index(), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_rotate_from_stale_index_is_noop() {
        let pool = CredentialPool::from_csv("a,b,c").unwrap();
        let (observed, _) = pool.current_with_index();

        assert_eq!(pool.rotate_from(observed).expose(), "b");
        // A second worker that saw the same failing credential does not skip "b".
        assert_eq!(pool.rotate_from(observed).expose(), "b");
        assert_eq!(pool.active_index(), 1);
    }

    #[test]
    fn test_debug_is_redacted() {
        let credential = Credential::new("AIzaSySecretValue1234");
        let rendered = format!("{credential:?}");
        assert_eq!(rendered, "Credential(***1234)");
        assert!(!rendered.contains("Secret"));
    }

    #[test]
    fn test_concurrent_rotation_never_tears() {
        let pool = Arc::new(CredentialPool::from_csv("a,b,c,d").unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let mut seen = HashSet::new();
                    for _ in 0..250 {
                        let credential = pool.rotate();
                        seen.insert(credential.expose().to_string());
                        let (index, current) = pool.current_with_index();
                        assert!(index < 4);
                        assert_eq!(current.expose(), ["a", "b", "c", "d"][index]);
                    }
                    seen
                })
            })
            .collect();

        for handle in handles {
            let seen = handle.join().unwrap();
            assert!(seen.iter().all(|key| ["a", "b", "c", "d"].contains(&key.as_str())));
        }
        // 2000 rotations over 4 credentials land back on the first.
        assert_eq!(pool.active_index(), 0);
    }
}
