use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::TracerConfig;
use crate::field::FieldKind;

/// Identity used when nothing in a condition names one.
pub const DEFAULT_IDENTITY: u64 = 0;

/// Numeric seed of a key or condition: every digit in `text`, concatenated.
/// Text without digits, or with more digits than fit a `u64`, seeds `0`.
pub fn extract_digits(text: &str) -> u64 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(DEFAULT_IDENTITY)
}

/// User and purpose derived from a record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyIdentity {
    pub user: u64,
    pub purpose: u64,
}

/// User and purpose derived from a metadata condition. Either side may be
/// the condition text itself, so both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticIdentity {
    pub user: String,
    pub purpose: String,
}

impl From<KeyIdentity> for SyntheticIdentity {
    fn from(identity: KeyIdentity) -> Self {
        Self {
            user: identity.user.to_string(),
            purpose: identity.purpose.to_string(),
        }
    }
}

/// Derives synthetic access-control identities. Holds the session's only
/// mutable state: the selector counter shared by every condition derivation.
#[derive(Debug)]
pub struct IdentityResolver {
    record_count: u64,
    user_count: u64,
    purpose_count: u64,
    objection_start: u64,
    objection_count: u64,
    selector: AtomicU64,
}

impl IdentityResolver {
    pub fn new(config: &TracerConfig) -> Self {
        Self {
            record_count: config.record_count,
            user_count: config.user_count,
            purpose_count: config.purpose_count,
            objection_start: config.objection_start,
            objection_count: config.objection_count,
            selector: AtomicU64::new(0),
        }
    }

    pub fn user_from_key(&self, key: &str) -> u64 {
        self.identity_from_key(key).user
    }

    pub fn purpose_from_key(&self, key: &str) -> u64 {
        self.identity_from_key(key).purpose
    }

    /// Both identities come from the same extracted seed.
    pub fn identity_from_key(&self, key: &str) -> KeyIdentity {
        let n = extract_digits(key);
        KeyIdentity {
            user: n % self.user_count,
            purpose: n % self.purpose_count,
        }
    }

    /// Advances the shared counter and returns the new value. The first
    /// selector handed out is `1`.
    pub fn next_selector(&self) -> u64 {
        self.selector.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of selectors handed out so far.
    pub fn selectors_issued(&self) -> u64 {
        self.selector.load(Ordering::SeqCst)
    }

    /// Draws a selector and derives the identity for `condition` with it.
    pub fn resolve_condition(&self, condition: &str, kind: Option<FieldKind>) -> SyntheticIdentity {
        let selector = self.next_selector();
        let identity = self.identity_from_condition(condition, kind, selector);
        tracing::trace!(
            condition,
            selector,
            user = %identity.user,
            purpose = %identity.purpose,
            "resolved condition identity"
        );
        identity
    }

    pub fn identity_from_condition(
        &self,
        condition: &str,
        kind: Option<FieldKind>,
        selector: u64,
    ) -> SyntheticIdentity {
        let n = i128::from(extract_digits(condition));
        match kind {
            Some(FieldKind::Purpose) => SyntheticIdentity {
                user: self
                    .spread(self.purpose_count, selector, n, self.user_count)
                    .to_string(),
                purpose: condition.to_string(),
            },
            Some(FieldKind::Objection) => {
                let n = n - i128::from(self.objection_start);
                SyntheticIdentity {
                    user: self
                        .spread(self.objection_count, selector, n, self.user_count)
                        .to_string(),
                    purpose: self
                        .spread(self.objection_count, selector, n, self.purpose_count)
                        .to_string(),
                }
            }
            Some(FieldKind::User) => SyntheticIdentity {
                user: condition.to_string(),
                purpose: self
                    .spread(self.user_count, selector, n, self.purpose_count)
                    .to_string(),
            },
            _ => SyntheticIdentity {
                user: DEFAULT_IDENTITY.to_string(),
                purpose: DEFAULT_IDENTITY.to_string(),
            },
        }
    }

    /// `((stride * selector) + n) mod record_count mod modulus`, kept
    /// non-negative when `n` went below zero.
    fn spread(&self, stride: u64, selector: u64, n: i128, modulus: u64) -> u64 {
        let raw = i128::from(stride) * i128::from(selector) + n;
        let reduced = raw.rem_euclid(i128::from(self.record_count)) % i128::from(modulus);
        // Bounded by `modulus`, which is a u64.
        reduced as u64
    }
}
