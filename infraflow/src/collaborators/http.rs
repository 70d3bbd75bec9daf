//! HTTP-backed collaborators.
//!
//! All capabilities except artifact storage are served by the infrastructure
//! service; drops go to the artifact service.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{
    ArtifactDrop, ArtifactStore, CodeAnalysis, CodeAnalysisRequest, CodeAnalyzer,
    CollaboratorResult, ComplianceRequest, ComplianceResult, ComplianceValidator, CostEstimate,
    CostEstimator, CostRequest, DeployRequest, Deployer, DeploymentResult, DropReceipt,
    GenerateInfraRequest, GoldenImageRequest, GoldenImageResult, ImageBuilder,
    InfraCodeGenerator, InfrastructureCode, SopGenerator, SopRequest, SopResult,
    COMPLIANCE_THRESHOLD,
};
use crate::config::HttpEndpoints;
use crate::errors::CollaboratorError;

/// Raw generator response; checksum and documentation are derived locally.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    framework: String,
    #[serde(default)]
    code: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    deploy_script: String,
    #[serde(default)]
    documentation: String,
}

/// Implements every collaborator over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpCollaborators {
    client: reqwest::Client,
    endpoints: HttpEndpoints,
}

impl HttpCollaborators {
    /// Creates the client.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be built.
    pub fn new(endpoints: HttpEndpoints) -> CollaboratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(endpoints.request_timeout_ms))
            .build()
            .map_err(|e| CollaboratorError::transport(e.to_string()))?;
        Ok(Self { client, endpoints })
    }

    /// Returns the configured endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &HttpEndpoints {
        &self.endpoints
    }

    fn qinfra(&self, path: &str) -> String {
        join_url(&self.endpoints.qinfra_url, path)
    }

    async fn post_json<Req, Resp>(&self, url: String, body: &Req) -> CollaboratorResult<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| CollaboratorError::invalid_response(e.to_string()))
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Maps a non-success HTTP status to a collaborator error.
fn classify_status(code: u16, body: &str) -> CollaboratorError {
    let message = format!("status {code}: {}", body.trim());
    if code == 429 || code >= 500 {
        CollaboratorError::Unavailable(message)
    } else {
        CollaboratorError::Rejected(message)
    }
}

fn map_request_error(err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() || err.is_connect() {
        CollaboratorError::unavailable(err.to_string())
    } else if err.is_decode() {
        CollaboratorError::invalid_response(err.to_string())
    } else {
        CollaboratorError::transport(err.to_string())
    }
}

#[async_trait]
impl CodeAnalyzer for HttpCollaborators {
    async fn analyze(&self, request: &CodeAnalysisRequest) -> CollaboratorResult<CodeAnalysis> {
        self.post_json(self.qinfra("analyze"), request).await
    }
}

#[async_trait]
impl InfraCodeGenerator for HttpCollaborators {
    async fn generate(
        &self,
        request: &GenerateInfraRequest,
    ) -> CollaboratorResult<InfrastructureCode> {
        let response: GenerateResponse = self.post_json(self.qinfra("generate"), request).await?;
        if response.code.is_empty() {
            return Err(CollaboratorError::invalid_response("generator returned no files"));
        }

        let mut code = InfrastructureCode::new(response.framework, response.code)
            .with_deploy_script(response.deploy_script);
        code.documentation = response.documentation;
        Ok(code.with_default_documentation())
    }
}

#[async_trait]
impl ImageBuilder for HttpCollaborators {
    async fn build(&self, request: &GoldenImageRequest) -> CollaboratorResult<GoldenImageResult> {
        self.post_json(self.qinfra("golden-image/build"), request).await
    }
}

#[async_trait]
impl SopGenerator for HttpCollaborators {
    async fn generate_sops(&self, request: &SopRequest) -> CollaboratorResult<SopResult> {
        self.post_json(self.qinfra("sop/generate"), request).await
    }
}

#[async_trait]
impl ComplianceValidator for HttpCollaborators {
    async fn validate(&self, request: &ComplianceRequest) -> CollaboratorResult<ComplianceResult> {
        let mut result: ComplianceResult = self
            .post_json(self.qinfra("compliance/validate"), request)
            .await?;
        result.compliant = result.score >= COMPLIANCE_THRESHOLD;
        Ok(result)
    }
}

#[async_trait]
impl CostEstimator for HttpCollaborators {
    async fn estimate(&self, request: &CostRequest) -> CollaboratorResult<CostEstimate> {
        self.post_json(self.qinfra("cost/optimize"), request).await
    }
}

#[async_trait]
impl ArtifactStore for HttpCollaborators {
    async fn store(&self, drop: &ArtifactDrop) -> CollaboratorResult<DropReceipt> {
        let url = join_url(&self.endpoints.drops_url, "api/v1/drops");
        self.post_json(url, drop).await
    }
}

#[async_trait]
impl Deployer for HttpCollaborators {
    async fn deploy(&self, request: &DeployRequest) -> CollaboratorResult<DeploymentResult> {
        if request.dry_run {
            debug!(workflow_id = %request.workflow_id, "Dry run, not deploying");
            return Ok(DeploymentResult::dry_run(&request.workflow_id));
        }
        self.post_json(self.qinfra("deploy"), request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(503, ""), CollaboratorError::Unavailable(_)));
        assert!(matches!(classify_status(429, ""), CollaboratorError::Unavailable(_)));
        assert!(matches!(classify_status(400, "bad"), CollaboratorError::Rejected(_)));
        assert!(matches!(classify_status(404, ""), CollaboratorError::Rejected(_)));
        assert_eq!(
            classify_status(422, " missing provider \n").to_string(),
            "request rejected: status 422: missing provider"
        );
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://svc:8095/", "/generate"), "http://svc:8095/generate");
        assert_eq!(join_url("http://svc:8095", "sop/generate"), "http://svc:8095/sop/generate");
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = HttpEndpoints::default();
        assert!(endpoints.qinfra_url.ends_with(":8095"));
        assert_eq!(endpoints.request_timeout_ms, 30_000);
    }

    #[tokio::test]
    async fn test_dry_run_deploy_makes_no_request() {
        let collaborators = HttpCollaborators::new(HttpEndpoints {
            qinfra_url: "http://127.0.0.1:9".to_string(),
            ..HttpEndpoints::default()
        })
        .unwrap();

        let request = DeployRequest {
            workflow_id: "wf-dry".to_string(),
            provider: "aws".to_string(),
            environment: "staging".to_string(),
            code: BTreeMap::new(),
            dry_run: true,
        };

        let result = collaborators.deploy(&request).await.unwrap();
        assert_eq!(result.deployment_id, "dry-run-wf-dry");
    }
}
