//! Role resolution.
//!
//! The service decides the role. A login-as-role request only states an intent;
//! whatever the service answers is adopted. Anything that goes wrong on the way
//! resolves to [`Role::Guest`].

use api::wire;
use api::{GovernanceService, Role};

/// Ask the service for the caller's role, or request `intended` and adopt the answer.
pub async fn resolve_role<C: GovernanceService>(client: &C, intended: Option<Role>) -> Role {
    let reply = match intended {
        Some(role) => client.login_as_role(wire::encode_role(role)).await,
        None => client.my_role().await,
    };

    let tagged = match reply {
        Ok(tagged) => tagged,
        Err(err) => {
            tracing::warn!(%err, ?intended, "role request failed, falling back to Guest");
            return Role::Guest;
        }
    };

    match wire::decode_role(&tagged) {
        Ok(role) => {
            if let Some(requested) = intended.filter(|requested| *requested != role) {
                tracing::info!(%requested, granted = %role, "service granted a different role");
            }
            role
        }
        Err(err) => {
            tracing::warn!(%err, "malformed role reply, falling back to Guest");
            Role::Guest
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{CallError, Identity, Principal};
    use store::MemoryService;

    fn identity(n: u8) -> Identity {
        Identity::new(Principal::from_slice(&[n; 10]), None)
    }

    #[tokio::test]
    async fn test_unregistered_caller_is_guest() {
        let service = MemoryService::new(identity(1).principal().clone());
        let client = service.connect(&identity(2));
        assert_eq!(resolve_role(&client, None).await, Role::Guest);
    }

    #[tokio::test]
    async fn test_login_as_role_adopts_service_answer() {
        let service = MemoryService::new(identity(1).principal().clone());
        let client = service.connect(&identity(2));

        // An admin already exists, so the request is downgraded.
        assert_eq!(resolve_role(&client, Some(Role::Admin)).await, Role::Guest);
        // Registered now; a later request cannot change the role.
        assert_eq!(resolve_role(&client, Some(Role::Professor)).await, Role::Guest);
        assert_eq!(resolve_role(&client, None).await, Role::Guest);
    }

    #[tokio::test]
    async fn test_deployer_resolves_to_admin() {
        let admin = identity(1);
        let service = MemoryService::new(admin.principal().clone());
        assert_eq!(resolve_role(&service.connect(&admin), None).await, Role::Admin);
    }

    #[tokio::test]
    async fn test_failed_call_falls_back_to_guest() {
        let admin = identity(1);
        let service = MemoryService::new(admin.principal().clone());
        service.fail_method("my_role", CallError::Transport("timed out".into()));
        assert_eq!(resolve_role(&service.connect(&admin), None).await, Role::Guest);
    }
}
