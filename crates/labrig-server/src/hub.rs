//! Clients for the hub services: protected labs, assignment/challenge
//! bookkeeping and the deployment system of record.
//!
//! Each concern sits behind its own trait so the orchestrator and ledger can
//! be exercised without a network.

use async_trait::async_trait;
use labrig_core::config::ServerConfig;
use labrig_core::lab::{authoritative_lab_type, public_lab_type, LabDefinition};
use labrig_core::types::{Deployment, DeploymentKey, TrackingKind, TrackingStatus};
use labrig_core::{LabError, Result};
use reqwest::{Method, RequestBuilder, Response};

const PRINCIPAL_HEADER: &str = "x-ms-client-principal-name";
const LAB_SECRET_HEADER: &str = "ProtectedLabSecret";

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Source of authoritative lab definitions whose scripts callers never see.
#[async_trait]
pub trait ProtectedLabSource: Send + Sync {
    async fn protected_lab(&self, lab_type: &str, lab_id: &str) -> Result<LabDefinition>;
}

/// External assignment/challenge progress tracking.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(
        &self,
        kind: TrackingKind,
        user_id: &str,
        lab_id: &str,
        status: TrackingStatus,
    ) -> Result<()>;
}

/// Authoritative deployment records.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Every record owned by `user_id`, across subscriptions.
    async fn list(&self, user_id: &str) -> Result<Vec<Deployment>>;
    async fn upsert(&self, deployment: &Deployment) -> Result<()>;
    async fn delete(&self, key: &DeploymentKey) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HubClient
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct HubClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    lab_secret: String,
    principal: String,
}

fn upstream(context: &str, e: impl std::fmt::Display) -> LabError {
    LabError::Upstream(format!("{context}: {e}"))
}

impl HubClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| LabError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.hub.url.trim_end_matches('/').to_string(),
            auth_token: config.hub.auth_token.clone(),
            lab_secret: config.hub.protected_lab_secret.clone(),
            principal: config.identity.user_id.clone(),
        })
    }

    fn request(&self, method: Method, path: &str, principal: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut req = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(LAB_SECRET_HEADER, &self.lab_secret)
            .header(PRINCIPAL_HEADER, principal);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Send and require a 2xx answer.
    async fn send(&self, req: RequestBuilder, context: &str) -> Result<Response> {
        let resp = req.send().await.map_err(|e| upstream(context, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LabError::Upstream(format!("{context}: hub returned {status}")));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ProtectedLabSource for HubClient {
    async fn protected_lab(&self, lab_type: &str, lab_id: &str) -> Result<LabDefinition> {
        if lab_type.is_empty() || lab_id.is_empty() {
            return Err(LabError::InvalidLab(
                "protected lab lookup needs both a lab type and an id".into(),
            ));
        }
        let path = format!(
            "lab/protected/{}/{}",
            authoritative_lab_type(lab_type),
            lab_id
        );
        let context = format!("fetch protected lab {lab_id}");
        let resp = self
            .send(self.request(Method::GET, &path, &self.principal), &context)
            .await?;
        let mut lab: LabDefinition = resp.json().await.map_err(|e| upstream(&context, e))?;
        lab.lab_type = public_lab_type(&lab.lab_type).to_string();
        Ok(lab)
    }
}

#[async_trait]
impl StatusReporter for HubClient {
    async fn report(
        &self,
        kind: TrackingKind,
        user_id: &str,
        lab_id: &str,
        status: TrackingStatus,
    ) -> Result<()> {
        let path = format!("{}/{user_id}/{lab_id}/{status}", kind.path_segment());
        let context = format!("report {} {status} for lab {lab_id}", kind.path_segment());
        self.send(self.request(Method::PUT, &path, user_id), &context)
            .await?;
        tracing::info!(user_id, lab_id, status = %status, "tracking status reported");
        Ok(())
    }
}

#[async_trait]
impl DeploymentStore for HubClient {
    async fn list(&self, user_id: &str) -> Result<Vec<Deployment>> {
        let context = format!("list deployments for {user_id}");
        let resp = self
            .send(self.request(Method::GET, "deployments", user_id), &context)
            .await?;
        resp.json().await.map_err(|e| upstream(&context, e))
    }

    async fn upsert(&self, deployment: &Deployment) -> Result<()> {
        let context = format!("upsert deployment {}", deployment.key());
        let req = self
            .request(Method::PUT, "deployments", &deployment.user_id)
            .json(deployment);
        self.send(req, &context).await?;
        Ok(())
    }

    async fn delete(&self, key: &DeploymentKey) -> Result<()> {
        let path = format!("deployments/{}/{}", key.subscription_id, key.workspace);
        let context = format!("delete deployment {key}");
        self.send(self.request(Method::DELETE, &path, &key.user_id), &context)
            .await?;
        Ok(())
    }
}
