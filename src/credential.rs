//! Admin credential held by the server.

use subtle::ConstantTimeEq;

/// The server-held administrative secret.
///
/// Presented credentials are compared in constant time over the full value.
#[derive(Clone)]
pub struct AdminSecret(String);

impl AdminSecret {
    /// Wrap a secret. Blank values are rejected.
    pub fn new<S: Into<String>>(secret: S) -> Option<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            None
        } else {
            Some(Self(secret))
        }
    }

    /// Check a caller-supplied credential against the secret.
    pub fn verify(&self, presented: &str) -> bool {
        let presented = presented.as_bytes();
        let expected = self.0.as_bytes();
        if presented.len() != expected.len() {
            // Keep the work comparable to a same-length mismatch.
            let _ = expected.ct_eq(expected);
            return false;
        }
        presented.ct_eq(expected).into()
    }
}

impl std::fmt::Debug for AdminSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminSecret(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_match() {
        let secret = AdminSecret::new("s3cret-admin-value").unwrap();
        assert!(secret.verify("s3cret-admin-value"));
    }

    #[test]
    fn rejects_wrong_or_partial_values() {
        let secret = AdminSecret::new("s3cret-admin-value").unwrap();
        assert!(!secret.verify("s3cret-admin-valuX"));
        assert!(!secret.verify("s3cret"));
        assert!(!secret.verify("s3cret-admin-value-and-more"));
        assert!(!secret.verify(""));
    }

    #[test]
    fn blank_secret_is_not_a_secret() {
        assert!(AdminSecret::new("").is_none());
        assert!(AdminSecret::new("   ").is_none());
    }

    #[test]
    fn debug_does_not_leak() {
        let secret = AdminSecret::new("hunter2").unwrap();
        assert!(!format!("{secret:?}").contains("hunter2"));
    }
}
