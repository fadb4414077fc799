//! # Session controller
//!
//! [`Session`] is the single owner of the current identity, role, service handle
//! and snapshot. Front-ends call its methods and read [`Session::snapshot`]; they
//! never mutate session state directly.
//!
//! ## Ordering
//!
//! - identity change → new service handle → role → role-scoped snapshot
//! - command → result → full resync, strictly in that order
//!
//! ## Epochs and generations
//!
//! The epoch advances on every login and logout; the generation advances every
//! time a snapshot is installed, including the resync after a command. A refresh
//! is started with [`Session::begin_refresh`], which captures both, and is only
//! applied by [`Session::apply_refresh`] if neither has moved since. A result that
//! arrives after a logout, or after a newer snapshot was installed, is dropped.
//!
//! ## Failures
//!
//! Every outcome is queued as a [`Notification`]. A failed refresh replaces the
//! snapshot with the empty `Guest` view for the same caller; a failed command
//! leaves the snapshot untouched.

use std::fmt;

use api::{ClientFactory, GovernanceService, Identity, Principal, Role};

use crate::dispatch::{self, Command, CourseAction, DispatchError, Receipt};
use crate::identity::{AuthClient, AuthError, IdentityProvider, LoginOptions};
use crate::role::resolve_role;
use crate::sync::{self, SessionSnapshot, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => "ok",
            NotificationLevel::Error => "error",
        })
    }
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// A refresh that has been started but not yet applied.
#[derive(Debug, Clone)]
pub struct PendingRefresh<C> {
    epoch: u64,
    generation: u64,
    client: C,
    principal: Principal,
    intended: Option<Role>,
}

impl<C: GovernanceService> PendingRefresh<C> {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Resolve the role and pull the snapshot. Touches no session state.
    pub async fn fetch(self) -> FetchedRefresh {
        let role = resolve_role(&self.client, self.intended).await;
        let result = sync::sync(&self.client, self.principal.clone(), role).await;
        FetchedRefresh {
            epoch: self.epoch,
            generation: self.generation,
            principal: self.principal,
            result,
        }
    }
}

/// Outcome of [`PendingRefresh::fetch`], waiting to be applied.
#[derive(Debug, Clone)]
pub struct FetchedRefresh {
    epoch: u64,
    generation: u64,
    principal: Principal,
    result: Result<SessionSnapshot, SyncError>,
}

impl FetchedRefresh {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

pub struct Session<P, F: ClientFactory> {
    auth: AuthClient<P>,
    factory: F,
    login_options: LoginOptions,
    client: Option<F::Client>,
    snapshot: SessionSnapshot,
    epoch: u64,
    generation: u64,
    notifications: Vec<Notification>,
}

impl<P: IdentityProvider, F: ClientFactory> Session<P, F> {
    /// Initialize the identity client and, if an identity was remembered, load its data.
    pub async fn create(provider: P, factory: F, login_options: LoginOptions) -> Self {
        let mut session = Self {
            auth: AuthClient::new(provider),
            factory,
            login_options,
            client: None,
            snapshot: SessionSnapshot::signed_out(),
            epoch: 0,
            generation: 0,
            notifications: Vec::new(),
        };

        if let Err(err) = session.auth.create().await {
            tracing::error!(%err, "identity client initialization failed");
            session.notify(
                NotificationLevel::Error,
                format!("Identity provider unavailable: {err}"),
            );
            return session;
        }
        if session.auth.is_authenticated() {
            let identity = session.auth.identity();
            if session.connect(&identity).await.is_ok() {
                session.refresh().await;
            }
        }
        session
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn role(&self) -> Role {
        self.snapshot.role
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    /// Take all queued notifications, oldest first.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.notifications.push(Notification::new(level, message));
    }

    /// Build a fresh service handle for `identity`.
    async fn connect(&mut self, identity: &Identity) -> Result<(), AuthError> {
        self.client = None;
        match self.factory.make_client(identity).await {
            Ok(client) => {
                self.client = Some(client);
                Ok(())
            }
            Err(err) => {
                tracing::error!(%err, "could not build service client");
                self.snapshot = SessionSnapshot::guest(identity.principal().clone());
                self.notify(
                    NotificationLevel::Error,
                    format!("Could not connect to the service: {err}"),
                );
                Err(AuthError::Connect(err))
            }
        }
    }

    /// Authenticate if needed, then load the caller's role and data.
    ///
    /// With `intended` set this is a login-as-role request; the role the
    /// service grants is the one adopted.
    pub async fn login(&mut self, intended: Option<Role>) -> Result<Role, AuthError> {
        self.epoch += 1;
        if !self.auth.is_authenticated() {
            let options = self.login_options.clone();
            if let Err(err) = self.auth.login(&options).await {
                tracing::warn!(%err, "login failed");
                self.notify(NotificationLevel::Error, format!("Login failed: {err}"));
                return Err(err);
            }
            self.snapshot = SessionSnapshot::signed_out();
            self.client = None;
        }

        if self.client.is_none() {
            let identity = self.auth.identity();
            self.connect(&identity).await?;
        }

        let role = self.refresh_as(intended).await;
        if let Some(requested) = intended {
            if requested != role {
                self.notify(
                    NotificationLevel::Info,
                    format!("Requested {requested}, the service granted {role}."),
                );
            }
        }
        self.notify(NotificationLevel::Success, format!("Logged in as {role}."));
        Ok(role)
    }

    /// Forget the identity and everything derived from it.
    pub async fn logout(&mut self) {
        self.epoch += 1;
        if let Err(err) = self.auth.logout().await {
            tracing::warn!(%err, "identity provider sign-out failed");
        }
        self.client = None;
        self.snapshot = SessionSnapshot::signed_out();
        self.notify(NotificationLevel::Info, "Logged out.");
    }

    /// Capture what a refresh needs, tagged with the current epoch.
    pub fn begin_refresh(&self) -> Option<PendingRefresh<F::Client>> {
        self.begin_refresh_as(None)
    }

    fn begin_refresh_as(&self, intended: Option<Role>) -> Option<PendingRefresh<F::Client>> {
        let client = self.client.clone()?;
        let identity = self.auth.identity();
        if identity.is_anonymous() {
            return None;
        }
        Some(PendingRefresh {
            epoch: self.epoch,
            generation: self.generation,
            client,
            principal: identity.principal().clone(),
            intended,
        })
    }

    /// Install a fetched snapshot. Returns `false` if it belongs to an older epoch
    /// or a newer snapshot has been installed since it was started.
    pub fn apply_refresh(&mut self, fetched: FetchedRefresh) -> bool {
        if fetched.epoch != self.epoch || fetched.generation < self.generation {
            tracing::debug!(
                fetched_epoch = fetched.epoch,
                current_epoch = self.epoch,
                fetched_generation = fetched.generation,
                current_generation = self.generation,
                "discarding stale refresh"
            );
            return false;
        }
        self.generation += 1;
        match fetched.result {
            Ok(snapshot) => {
                tracing::info!(role = %snapshot.role, "session synchronized");
                self.snapshot = snapshot;
            }
            Err(err) => {
                tracing::error!(%err, "synchronization failed, falling back to Guest");
                self.snapshot = SessionSnapshot::guest(fetched.principal);
                self.notify(
                    NotificationLevel::Error,
                    format!("Could not load data: {err}"),
                );
            }
        }
        true
    }

    /// Re-run the full role and data fetch.
    pub async fn refresh(&mut self) -> Role {
        self.refresh_as(None).await
    }

    async fn refresh_as(&mut self, intended: Option<Role>) -> Role {
        if let Some(pending) = self.begin_refresh_as(intended) {
            let fetched = pending.fetch().await;
            self.apply_refresh(fetched);
        }
        self.snapshot.role
    }

    /// Course actions to offer for `course_id` in the current snapshot.
    pub fn offered_commands(&self, course_id: &str) -> Vec<CourseAction> {
        match (&self.snapshot.principal, self.snapshot.course(course_id)) {
            (Some(me), Some(course)) => dispatch::offered_commands(self.snapshot.role, me, course),
            _ => Vec::new(),
        }
    }

    /// Check and send `command`; on success resynchronize before returning.
    pub async fn dispatch(&mut self, command: Command) -> Result<Receipt, DispatchError> {
        let outcome = match &self.client {
            Some(client) if self.auth.is_authenticated() => {
                dispatch::dispatch(client, &self.snapshot, &command).await
            }
            _ => Err(DispatchError::Unauthenticated),
        };

        match outcome {
            Ok(receipt) => {
                self.notify(NotificationLevel::Success, receipt.message.clone());
                self.refresh().await;
                Ok(receipt)
            }
            Err(err) => {
                tracing::warn!(action = command.action(), %err, "command failed");
                self.notify(NotificationLevel::Error, err.to_string());
                Err(err)
            }
        }
    }
}
