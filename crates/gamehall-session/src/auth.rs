//! Authentication hook for administrative access.
//!
//! Gamehall knows a single kind of credential: the process-wide
//! administrative secret. [`SharedSecret`] is the stock implementation;
//! the [`Authenticator`] trait exists so tests and embedders can plug in
//! something else (a secret store, a rotating key) without touching the
//! session code.

use std::future::Future;

use crate::SessionError;

/// Validates an administrative secret.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// session task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use gamehall_session::{Authenticator, SessionError};
///
/// /// Lets nobody in.
/// struct Locked;
///
/// impl Authenticator for Locked {
///     async fn authenticate(&self, _secret: &str) -> Result<(), SessionError> {
///         Err(SessionError::AuthenticationFailed)
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns `Ok(())` when `secret` grants the administrator role.
    ///
    /// # Errors
    /// [`SessionError::AuthenticationFailed`] when it does not.
    fn authenticate(
        &self,
        secret: &str,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Compares against one configured secret. An empty secret matches
/// nothing.
#[derive(Clone)]
pub struct SharedSecret {
    secret: String,
}

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret").finish_non_exhaustive()
    }
}

impl Authenticator for SharedSecret {
    async fn authenticate(&self, secret: &str) -> Result<(), SessionError> {
        if !self.secret.is_empty()
            && constant_time_eq(self.secret.as_bytes(), secret.as_bytes())
        {
            Ok(())
        } else {
            Err(SessionError::AuthenticationFailed)
        }
    }
}

/// Byte comparison whose running time does not depend on where the first
/// mismatch is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
