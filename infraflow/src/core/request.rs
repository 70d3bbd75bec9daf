//! The provisioning request that starts a workflow.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::errors::{ProvisionError, ProvisionResult};

/// Workflow ids double as store keys (and file names), so they are restricted.
#[allow(clippy::expect_used)]
static WORKFLOW_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("workflow id pattern compiles")
});

/// A request to provision infrastructure for a workflow.
///
/// The request is immutable once the workflow starts; the orchestrator only
/// ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    /// Unique workflow identifier.
    pub workflow_id: String,
    /// Target cloud provider (e.g. "aws").
    pub provider: String,
    /// Deployment environment (e.g. "staging").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Requested compliance frameworks.
    #[serde(default)]
    pub compliance: BTreeSet<String>,
    /// Build a hardened golden image.
    #[serde(default)]
    pub enable_image_build: bool,
    /// Generate standard operating procedures.
    #[serde(default)]
    pub enable_sop: bool,
    /// Deploy the generated infrastructure.
    #[serde(default)]
    pub auto_deploy: bool,
    /// Forwarded to the deployer; it must not mutate anything.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_environment() -> String {
    "development".to_string()
}

impl ProvisioningRequest {
    /// Creates a request with every toggle off and no compliance frameworks.
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            provider: provider.into(),
            environment: default_environment(),
            compliance: BTreeSet::new(),
            enable_image_build: false,
            enable_sop: false,
            auto_deploy: false,
            dry_run: false,
        }
    }

    /// Sets the deployment environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Adds a compliance framework.
    #[must_use]
    pub fn with_compliance(mut self, framework: impl Into<String>) -> Self {
        self.compliance.insert(framework.into());
        self
    }

    /// Enables or disables the golden image build.
    #[must_use]
    pub fn with_image_build(mut self, enabled: bool) -> Self {
        self.enable_image_build = enabled;
        self
    }

    /// Enables or disables SOP generation.
    #[must_use]
    pub fn with_sop(mut self, enabled: bool) -> Self {
        self.enable_sop = enabled;
        self
    }

    /// Enables or disables automatic deployment.
    #[must_use]
    pub fn with_auto_deploy(mut self, enabled: bool) -> Self {
        self.auto_deploy = enabled;
        self
    }

    /// Enables or disables dry-run deployment.
    #[must_use]
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the compliance frameworks as an ordered list.
    #[must_use]
    pub fn compliance_list(&self) -> Vec<String> {
        self.compliance.iter().cloned().collect()
    }

    /// Validates the request before a workflow is created for it.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the workflow id is malformed or the
    /// provider is empty.
    pub fn validate(&self) -> ProvisionResult<()> {
        if !WORKFLOW_ID_PATTERN.is_match(&self.workflow_id) {
            return Err(ProvisionError::Validation(format!(
                "invalid workflow id '{}': expected 1-128 characters of [A-Za-z0-9._-]",
                self.workflow_id
            )));
        }
        if self.provider.trim().is_empty() {
            return Err(ProvisionError::Validation(
                "provider cannot be empty or whitespace-only".to_string(),
            ));
        }
        if self.compliance.iter().any(|f| f.trim().is_empty()) {
            return Err(ProvisionError::Validation(
                "compliance framework names cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
