//! # Identity session manager
//!
//! [`AuthClient`] owns the authenticated identity. It starts `Uninitialized`, becomes
//! `Ready` after [`AuthClient::create`], and from then on holds zero or one identity.
//! The actual authentication is delegated to an [`IdentityProvider`].
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `create` | restore a remembered identity, if the provider has one |
//! | `login` | run the provider's flow and hold the fresh identity |
//! | `logout` | drop the identity and tell the provider to forget it |

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api::{Identity, Principal, Settings};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("identity client is not initialized")]
    NotInitialized,
    #[error("identity provider failed: {0}")]
    Provider(String),
    #[error("login was cancelled")]
    Cancelled,
    #[error("the identity provider returned an anonymous identity")]
    Anonymous,
    #[error("could not connect to the service: {0}")]
    Connect(#[from] api::CallError),
}

/// Where to send the user and how long the resulting delegation should live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOptions {
    pub identity_provider: String,
    pub max_time_to_live: Duration,
}

impl LoginOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            identity_provider: settings.identity_provider_url.clone(),
            max_time_to_live: settings.max_time_to_live(),
        }
    }
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            identity_provider: "http://127.0.0.1:4943/authorize".to_string(),
            max_time_to_live: Duration::from_secs(8 * 60 * 60),
        }
    }
}

/// The external party that authenticates users.
pub trait IdentityProvider {
    /// An identity remembered from an earlier login, if any.
    fn restore(&self) -> impl Future<Output = Result<Option<Identity>, AuthError>>;
    fn authenticate(
        &self,
        options: &LoginOptions,
    ) -> impl Future<Output = Result<Identity, AuthError>>;
    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>>;
}

#[derive(Debug)]
enum Lifecycle {
    Uninitialized,
    Ready { identity: Option<Identity> },
}

#[derive(Debug)]
pub struct AuthClient<P> {
    provider: P,
    state: Lifecycle,
}

impl<P: IdentityProvider> AuthClient<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            state: Lifecycle::Uninitialized,
        }
    }

    /// Initialize the client. On failure the client is still usable, just unauthenticated.
    pub async fn create(&mut self) -> Result<(), AuthError> {
        let restored = self.provider.restore().await;
        let identity = match &restored {
            Ok(Some(identity)) if !identity.is_anonymous() => Some(identity.clone()),
            _ => None,
        };
        if let Some(identity) = &identity {
            tracing::info!(principal = %identity.principal(), "restored identity");
        }
        self.state = Lifecycle::Ready { identity };
        restored.map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, Lifecycle::Ready { .. })
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(&self.state, Lifecycle::Ready { identity: Some(_) })
    }

    /// The held identity, or the anonymous one.
    pub fn identity(&self) -> Identity {
        match &self.state {
            Lifecycle::Ready {
                identity: Some(identity),
            } => identity.clone(),
            _ => Identity::anonymous(),
        }
    }

    pub async fn login(&mut self, options: &LoginOptions) -> Result<Identity, AuthError> {
        if !self.is_ready() {
            return Err(AuthError::NotInitialized);
        }
        let identity = self.provider.authenticate(options).await?;
        if identity.is_anonymous() {
            return Err(AuthError::Anonymous);
        }
        tracing::info!(principal = %identity.principal(), "logged in");
        self.state = Lifecycle::Ready {
            identity: Some(identity.clone()),
        };
        Ok(identity)
    }

    /// Drop the held identity. The identity is gone even if the provider fails to forget it.
    pub async fn logout(&mut self) -> Result<(), AuthError> {
        if let Lifecycle::Ready { identity } = &mut self.state {
            if let Some(previous) = identity.take() {
                tracing::info!(principal = %previous.principal(), "logged out");
            }
        }
        self.provider.sign_out().await
    }
}

/// Authenticates as one fixed principal. Useful against development gateways.
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    identity: Identity,
    remembered: Arc<AtomicBool>,
}

impl StaticIdentityProvider {
    pub fn new(principal: Principal) -> Self {
        Self {
            identity: Identity::new(principal, None),
            remembered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start out as if a previous login had been remembered.
    pub fn remembered(self) -> Self {
        self.remembered.store(true, Ordering::SeqCst);
        self
    }
}

impl IdentityProvider for StaticIdentityProvider {
    async fn restore(&self) -> Result<Option<Identity>, AuthError> {
        Ok(self
            .remembered
            .load(Ordering::SeqCst)
            .then(|| self.identity.clone()))
    }

    async fn authenticate(&self, _options: &LoginOptions) -> Result<Identity, AuthError> {
        self.remembered.store(true, Ordering::SeqCst);
        Ok(self.identity.clone())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.remembered.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal::from_slice(&[9; 10])
    }

    struct BrokenProvider;

    impl IdentityProvider for BrokenProvider {
        async fn restore(&self) -> Result<Option<Identity>, AuthError> {
            Err(AuthError::Provider("storage unavailable".into()))
        }

        async fn authenticate(&self, _options: &LoginOptions) -> Result<Identity, AuthError> {
            Err(AuthError::Cancelled)
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_login_requires_create() {
        let mut auth = AuthClient::new(StaticIdentityProvider::new(principal()));
        assert_eq!(
            auth.login(&LoginOptions::default()).await,
            Err(AuthError::NotInitialized)
        );
        auth.create().await.unwrap();
        assert!(!auth.is_authenticated());
        assert!(auth.identity().is_anonymous());

        let identity = auth.login(&LoginOptions::default()).await.unwrap();
        assert_eq!(identity.principal(), &principal());
        assert!(auth.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_forgets_identity() {
        let provider = StaticIdentityProvider::new(principal());
        let mut auth = AuthClient::new(provider.clone());
        auth.create().await.unwrap();
        auth.login(&LoginOptions::default()).await.unwrap();
        auth.logout().await.unwrap();
        assert!(!auth.is_authenticated());

        // A new client built on the same provider has nothing to restore.
        let mut again = AuthClient::new(provider);
        again.create().await.unwrap();
        assert!(!again.is_authenticated());
    }

    #[tokio::test]
    async fn test_remembered_identity_restored() {
        let mut auth = AuthClient::new(StaticIdentityProvider::new(principal()).remembered());
        auth.create().await.unwrap();
        assert!(auth.is_authenticated());
    }

    #[tokio::test]
    async fn test_broken_provider_leaves_client_unauthenticated() {
        let mut auth = AuthClient::new(BrokenProvider);
        assert!(auth.create().await.is_err());
        assert!(auth.is_ready());
        assert!(!auth.is_authenticated());
        assert_eq!(
            auth.login(&LoginOptions::default()).await,
            Err(AuthError::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_anonymous_identity_rejected() {
        let mut auth = AuthClient::new(StaticIdentityProvider::new(Principal::anonymous()));
        auth.create().await.unwrap();
        assert_eq!(
            auth.login(&LoginOptions::default()).await,
            Err(AuthError::Anonymous)
        );
        assert!(!auth.is_authenticated());
    }
}
