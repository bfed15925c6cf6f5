//! Round-robin credential selection.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::fmt;

/// Equivalent credentials for one provider.
///
/// One key is selected per cycle and used read-only for that cycle; the next
/// cycle rotates to the following key.
#[derive(Clone, Default)]
pub struct CredentialPool {
    keys: Vec<SecretString>,
}

impl CredentialPool {
    /// Creates a pool from already-resolved keys.
    #[must_use]
    pub const fn new(keys: Vec<SecretString>) -> Self {
        Self { keys }
    }

    /// Resolves keys from the named environment variables.
    ///
    /// Unset or blank variables are skipped, so `["KEY1", "KEY2", "KEY3"]`
    /// with only two set yields a pool of two.
    #[must_use]
    pub fn from_env_vars(names: &[String]) -> Self {
        let keys = names
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .filter(|value| !value.trim().is_empty())
            .map(SecretString::from)
            .collect();
        Self { keys }
    }

    /// Number of keys in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no keys were resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Selects the key for a cycle (`keys[cycle % len]`).
    #[must_use]
    pub fn select(&self, cycle: u64) -> Option<&SecretString> {
        if self.keys.is_empty() {
            return None;
        }
        let len = self.keys.len() as u64;
        usize::try_from(cycle % len)
            .ok()
            .and_then(|index| self.keys.get(index))
    }

    /// Default cycle index: whole UTC hours since the Unix epoch.
    #[must_use]
    pub fn hourly_cycle(now: DateTime<Utc>) -> u64 {
        u64::try_from(now.timestamp().div_euclid(3600)).unwrap_or(0)
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use secrecy::ExposeSecret;

    fn pool(keys: &[&str]) -> CredentialPool {
        CredentialPool::new(keys.iter().map(|k| SecretString::from(*k)).collect())
    }

    #[test]
    fn test_select_rotates_per_cycle() {
        let pool = pool(&["k1", "k2", "k3"]);
        let picked: Vec<&str> = (0..5)
            .map(|cycle| pool.select(cycle).unwrap().expose_secret())
            .collect();
        assert_eq!(picked, ["k1", "k2", "k3", "k1", "k2"]);
    }

    #[test]
    fn test_empty_pool_selects_nothing() {
        assert!(CredentialPool::default().select(7).is_none());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let rendered = format!("{:?}", pool(&["super-secret"]));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("1 redacted"));
    }

    #[test]
    fn test_hourly_cycle() {
        let now = Utc.with_ymd_and_hms(1970, 1, 2, 1, 30, 0).unwrap();
        assert_eq!(CredentialPool::hourly_cycle(now), 25);
    }
}
