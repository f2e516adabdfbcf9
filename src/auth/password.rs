/// Password Hashing and Verification
///
/// Adaptive bcrypt hashing with a configurable work factor.
///
/// bcrypt reads at most 72 bytes of input. Longer secrets are refused rather
/// than truncated, so two secrets sharing a 72-byte prefix never collide.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, ValidationError};

/// Largest secret, in bytes, that bcrypt hashes without truncation
pub const MAX_SECRET_BYTES: usize = 72;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a secret with a fresh salt
    ///
    /// # Errors
    /// Fails with a validation error for secrets over `MAX_SECRET_BYTES`,
    /// otherwise only if bcrypt rejects the cost or cannot gather entropy.
    pub fn hash(&self, plaintext: &str) -> Result<String, AppError> {
        if plaintext.len() > MAX_SECRET_BYTES {
            return Err(ValidationError::TooLong("password", MAX_SECRET_BYTES).into());
        }

        hash(plaintext, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Compare a secret against a stored digest.
    ///
    /// Never errors: an empty or oversized secret, a mismatch or an
    /// unreadable digest all yield `false`.
    pub fn verify(&self, digest: &str, plaintext: &str) -> bool {
        if plaintext.is_empty() || plaintext.len() > MAX_SECRET_BYTES {
            return false;
        }

        match verify(plaintext, digest) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "Stored digest could not be verified");
                false
            }
        }
    }
}
