//! # HTTP agent: the production [`GovernanceService`]
//!
//! [`HttpAgent`] issues JSON calls to the service gateway on behalf of exactly one
//! [`Identity`]. [`AgentFactory`] is the [`ClientFactory`] that builds agents from
//! [`Settings`].
//!
//! ## Requests
//!
//! | Kind | Endpoint | Used for |
//! |------|----------|----------|
//! | query | `POST {host}/services/{service_id}/query` | reads (`my_role`, `list_courses`, ...) |
//! | update | `POST {host}/services/{service_id}/call` | every state-changing operation |
//! | status | `GET {host}/status` | trust bootstrap on a local gateway |
//!
//! The body is `{"method_name", "sender", "arg": [...]}` and the delegation, if any,
//! travels as a bearer token. A reply is either `{"status": "replied", "reply": ...}`
//! or `{"status": "rejected", "reject_code", "reject_message"}`.
//!
//! ## Trust bootstrap
//!
//! On a local gateway the factory fetches the gateway's root key before handing the
//! agent out, and fails if it cannot. Holding the key is a precondition for issuing
//! calls: an agent configured for a local network without one refuses every call.
//! Replies are not verified against the key. On a production network the status
//! endpoint is never contacted.

use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::principal::{Identity, Principal};
use crate::service::{CallError, ClientFactory, GovernanceService};
use crate::settings::{Network, Settings};
use crate::wire::{Opt, Tagged, WireCourse, WireProfile, WireResult};

const NO_ARGS: [u8; 0] = [];

#[derive(Clone, Copy, Debug)]
enum CallKind {
    Query,
    Update,
}

impl CallKind {
    fn path(&self) -> &'static str {
        match self {
            CallKind::Query => "query",
            CallKind::Update => "call",
        }
    }
}

#[derive(Serialize)]
struct CallRequest<'a> {
    method_name: &'a str,
    sender: &'a Principal,
    arg: Value,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum CallReply {
    Replied {
        reply: Value,
    },
    Rejected {
        reject_code: u32,
        reject_message: String,
    },
}

#[derive(Deserialize)]
struct StatusReply {
    root_key: String,
}

/// A request handle bound to one identity.
#[derive(Clone)]
pub struct HttpAgent {
    http: Client,
    host: String,
    service_id: String,
    network: Network,
    identity: Arc<Identity>,
    root_key: Option<Arc<Vec<u8>>>,
}

impl HttpAgent {
    pub fn new(settings: &Settings, identity: Identity) -> Self {
        Self {
            http: Client::new(),
            host: settings.host.trim_end_matches('/').to_string(),
            service_id: settings.service_id.clone(),
            network: settings.network,
            identity: Arc::new(identity),
            root_key: None,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn root_key(&self) -> Option<&[u8]> {
        self.root_key.as_deref().map(Vec::as_slice)
    }

    /// Fetch the gateway's root key. Only meaningful on a local network.
    pub async fn fetch_root_key(&mut self) -> Result<(), CallError> {
        let url = format!("{}/status", self.host);
        let status: StatusReply = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CallError::TrustBootstrap(e.to_string()))?
            .json()
            .await
            .map_err(|e| CallError::TrustBootstrap(e.to_string()))?;
        let key = hex::decode(&status.root_key)
            .map_err(|e| CallError::TrustBootstrap(format!("invalid root key: {e}")))?;
        if key.is_empty() {
            return Err(CallError::TrustBootstrap("empty root key".to_string()));
        }
        self.root_key = Some(Arc::new(key));
        Ok(())
    }

    async fn call<R: DeserializeOwned>(
        &self,
        kind: CallKind,
        method: &str,
        arg: Value,
    ) -> Result<R, CallError> {
        if self.network.requires_trust_bootstrap() && self.root_key.is_none() {
            return Err(CallError::TrustBootstrap(
                "root key has not been fetched".to_string(),
            ));
        }

        let url = format!(
            "{}/services/{}/{}",
            self.host,
            self.service_id,
            kind.path()
        );
        tracing::debug!(method, kind = kind.path(), "remote call");

        let mut request = self.http.post(&url).json(&CallRequest {
            method_name: method,
            sender: self.identity.principal(),
            arg,
        });
        if let Some(token) = self.identity.delegation() {
            request = request.bearer_auth(token);
        }

        let reply: CallReply = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CallError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| CallError::Decode(e.to_string()))?;

        match reply {
            CallReply::Replied { reply } => {
                serde_json::from_value(reply).map_err(|e| CallError::Decode(e.to_string()))
            }
            CallReply::Rejected {
                reject_code,
                reject_message,
            } => Err(CallError::Rejected {
                code: reject_code,
                message: reject_message,
            }),
        }
    }

    async fn query<A: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        arg: A,
    ) -> Result<R, CallError> {
        let arg = serde_json::to_value(arg).map_err(|e| CallError::Decode(e.to_string()))?;
        self.call(CallKind::Query, method, arg).await
    }

    async fn update<A: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        arg: A,
    ) -> Result<R, CallError> {
        let arg = serde_json::to_value(arg).map_err(|e| CallError::Decode(e.to_string()))?;
        self.call(CallKind::Update, method, arg).await
    }
}

impl GovernanceService for HttpAgent {
    async fn login_as_role(&self, requested: Tagged) -> Result<Tagged, CallError> {
        self.update("login_as_role", (requested,)).await
    }

    async fn my_role(&self) -> Result<Tagged, CallError> {
        self.query("my_role", NO_ARGS).await
    }

    async fn whoami(&self) -> Result<Principal, CallError> {
        self.query("whoami", NO_ARGS).await
    }

    async fn get_my_profile(&self) -> Result<Opt<WireProfile>, CallError> {
        self.query("get_my_profile", NO_ARGS).await
    }

    async fn create_or_update_my_profile(&self, profile: WireProfile) -> Result<(), CallError> {
        self.update("create_or_update_my_profile", (profile,)).await
    }

    async fn list_courses(&self, filter: Opt<Tagged>) -> Result<Vec<WireCourse>, CallError> {
        self.query("list_courses", (filter,)).await
    }

    async fn get_course_details(&self, course_id: String) -> Result<Opt<WireCourse>, CallError> {
        self.query("get_course_details", (course_id,)).await
    }

    async fn get_my_enrolled_courses(&self) -> Result<Vec<WireCourse>, CallError> {
        self.query("get_my_enrolled_courses", NO_ARGS).await
    }

    async fn create_course(
        &self,
        title: String,
        description: String,
    ) -> Result<WireResult<WireCourse>, CallError> {
        self.update("create_course", (title, description)).await
    }

    async fn propose_course(&self, course_id: String) -> Result<WireResult<WireCourse>, CallError> {
        self.update("propose_course", (course_id,)).await
    }

    async fn vote_for_course(&self, course_id: String) -> Result<WireResult<WireCourse>, CallError> {
        self.update("vote_for_course", (course_id,)).await
    }

    async fn approve_course(&self, course_id: String) -> Result<WireResult<WireCourse>, CallError> {
        self.update("approve_course", (course_id,)).await
    }

    async fn reject_course(&self, course_id: String) -> Result<WireResult<WireCourse>, CallError> {
        self.update("reject_course", (course_id,)).await
    }

    async fn enroll_in_course(&self, course_id: String) -> Result<WireResult<WireCourse>, CallError> {
        self.update("enroll_in_course", (course_id,)).await
    }

    async fn list_users(&self) -> Result<Vec<(Principal, Tagged)>, CallError> {
        self.query("list_users", NO_ARGS).await
    }

    async fn list_principals(&self) -> Result<Vec<Principal>, CallError> {
        self.query("list_principals", NO_ARGS).await
    }

    async fn assign_role(&self, user: Principal, role: Tagged) -> Result<(), CallError> {
        self.update("assign_role", (user, role)).await
    }
}

/// Builds [`HttpAgent`]s from settings, bootstrapping trust on local networks.
#[derive(Clone, Debug)]
pub struct AgentFactory {
    settings: Settings,
}

impl AgentFactory {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl ClientFactory for AgentFactory {
    type Client = HttpAgent;

    async fn make_client(&self, identity: &Identity) -> Result<HttpAgent, CallError> {
        let mut agent = HttpAgent::new(&self.settings, identity.clone());
        if self.settings.network.requires_trust_bootstrap() {
            agent.fetch_root_key().await?;
            tracing::info!(host = %self.settings.host, "fetched root key from local gateway");
        }
        Ok(agent)
    }
}
