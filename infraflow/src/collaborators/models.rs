//! Request and response types exchanged with collaborators.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Minimum compliance score considered compliant.
pub const COMPLIANCE_THRESHOLD: f64 = 80.0;

/// Hours per month used to derive hourly cost.
const HOURS_PER_MONTH: f64 = 720.0;

/// A piece of infrastructure the application needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    /// Resource category (compute, database, cache, storage, network).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource name.
    pub name: String,
    /// Provider-independent properties.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl ResourceRequirement {
    /// Creates a resource requirement with no properties.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Input to the code analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAnalysisRequest {
    /// Workflow id.
    pub workflow_id: String,
    /// Target provider.
    pub provider: String,
}

/// Infrastructure requirements derived from the application.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodeAnalysis {
    /// Detected language.
    #[serde(default)]
    pub language: String,
    /// Detected framework.
    #[serde(default)]
    pub framework: String,
    /// Recommended base OS for images.
    pub recommended_os: String,
    /// OS packages the application needs.
    #[serde(default)]
    pub required_packages: Vec<String>,
    /// Infrastructure resources the application needs.
    #[serde(default)]
    pub required_resources: Vec<ResourceRequirement>,
    /// Non-functional requirements (high availability, backup, ...).
    #[serde(default)]
    pub requirements: BTreeMap<String, serde_json::Value>,
}

/// Input to the infrastructure code generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateInfraRequest {
    /// Workflow id.
    pub workflow_id: String,
    /// Target provider.
    pub provider: String,
    /// Resources to provision.
    pub resources: Vec<ResourceRequirement>,
    /// Compliance frameworks to honor.
    pub compliance: Vec<String>,
    /// Deployment environment.
    pub environment: String,
    /// Non-functional requirements.
    pub requirements: BTreeMap<String, serde_json::Value>,
}

/// Generated infrastructure-as-code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureCode {
    /// IaC framework (terraform, pulumi, ...).
    pub framework: String,
    /// Generated files, path to content.
    pub code: BTreeMap<String, String>,
    /// Script that applies the code.
    #[serde(default)]
    pub deploy_script: String,
    /// Generated documentation.
    #[serde(default)]
    pub documentation: String,
    /// SHA-256 over all files in path order.
    #[serde(default)]
    pub checksum: String,
    /// Total size of all files in bytes.
    #[serde(default)]
    pub size_bytes: u64,
}

impl InfrastructureCode {
    /// Creates generated code, computing checksum and size.
    #[must_use]
    pub fn new(framework: impl Into<String>, code: BTreeMap<String, String>) -> Self {
        let (checksum, size_bytes) = checksum_files(&code);
        Self {
            framework: framework.into(),
            code,
            deploy_script: String::new(),
            documentation: String::new(),
            checksum,
            size_bytes,
        }
    }

    /// Sets the deploy script.
    #[must_use]
    pub fn with_deploy_script(mut self, script: impl Into<String>) -> Self {
        self.deploy_script = script.into();
        self
    }

    /// Fills in documentation if the generator provided none.
    #[must_use]
    pub fn with_default_documentation(mut self) -> Self {
        if self.documentation.is_empty() {
            self.documentation = render_documentation(&self);
        }
        self
    }

    /// Returns true if the checksum matches the code.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        checksum_files(&self.code).0 == self.checksum
    }
}

fn checksum_files(code: &BTreeMap<String, String>) -> (String, u64) {
    let mut hasher = Sha256::new();
    let mut size = 0u64;
    for (path, content) in code {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        size += content.len() as u64;
    }
    (hex::encode(hasher.finalize()), size)
}

fn render_documentation(code: &InfrastructureCode) -> String {
    let mut doc = String::from("# Infrastructure Documentation\n\n");
    doc.push_str(&format!("## Framework: {}\n\n## Files Generated:\n", code.framework));
    for path in code.code.keys() {
        doc.push_str(&format!("- {path}\n"));
    }
    if !code.deploy_script.is_empty() {
        doc.push_str("\n## Deployment Instructions:\n```bash\n");
        doc.push_str(&code.deploy_script);
        doc.push_str("\n```\n");
    }
    doc
}

/// Input to the image builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenImageRequest {
    /// Base operating system.
    pub base_os: String,
    /// Packages to bake in.
    pub packages: Vec<String>,
    /// Hardening profile (e.g. "CIS").
    pub hardening: String,
    /// Compliance frameworks to honor.
    pub compliance: Vec<String>,
}

/// A built (or scheduled) golden image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenImageResult {
    /// Image id.
    pub image_id: String,
    /// Image name.
    #[serde(default)]
    pub image_name: String,
    /// Registry the image is pushed to.
    #[serde(default)]
    pub registry: String,
    /// Build status.
    pub status: String,
    /// Estimated build time in seconds.
    #[serde(default)]
    pub estimated_build_secs: u64,
}

/// Input to the SOP generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SopRequest {
    /// Infrastructure type, usually the IaC framework.
    pub infrastructure_type: String,
    /// Operations to produce runbooks for.
    pub operations: Vec<String>,
}

/// One step of a runbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SopStep {
    /// Step name.
    pub name: String,
    /// What the step does.
    #[serde(default)]
    pub description: String,
    /// Command to run.
    #[serde(default)]
    pub command: String,
    /// How to verify the step.
    #[serde(default)]
    pub validation: String,
    /// How to undo the step.
    #[serde(default)]
    pub rollback: String,
}

/// A runbook for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runbook {
    /// Operation the runbook covers.
    pub operation: String,
    /// Ordered steps.
    pub steps: Vec<SopStep>,
    /// Whether the runbook can be executed automatically.
    #[serde(default)]
    pub automated: bool,
}

/// Generated standard operating procedures.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SopResult {
    /// Runbooks in requested operation order.
    pub runbooks: Vec<Runbook>,
}

/// Input to the compliance validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRequest {
    /// Code to validate.
    pub code: BTreeMap<String, String>,
    /// Frameworks to validate against.
    pub frameworks: Vec<String>,
}

/// Compliance validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    /// Score out of 100.
    pub score: f64,
    /// Passed checks.
    pub passed: u32,
    /// Failed checks.
    pub failed: u32,
    /// Findings, one line each.
    #[serde(default)]
    pub findings: Vec<String>,
    /// Remediation suggestions.
    #[serde(default)]
    pub remediation: Vec<String>,
    /// True if the score meets [`COMPLIANCE_THRESHOLD`].
    #[serde(default)]
    pub compliant: bool,
}

impl ComplianceResult {
    /// Creates a result, deriving `compliant` from the score.
    #[must_use]
    pub fn new(score: f64, passed: u32, failed: u32) -> Self {
        Self {
            score,
            passed,
            failed,
            findings: Vec::new(),
            remediation: Vec::new(),
            compliant: score >= COMPLIANCE_THRESHOLD,
        }
    }

    /// Adds a finding.
    #[must_use]
    pub fn with_finding(mut self, finding: impl Into<String>) -> Self {
        self.findings.push(finding.into());
        self
    }

    /// Adds a remediation suggestion.
    #[must_use]
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation.push(remediation.into());
        self
    }
}

/// Input to the cost estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRequest {
    /// Target provider.
    pub provider: String,
    /// Resources to price.
    pub resources: Vec<ResourceRequirement>,
}

/// Estimated running cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Monthly cost in USD.
    pub monthly: f64,
    /// Hourly cost in USD.
    pub hourly: f64,
    /// Annual cost in USD.
    pub annual: f64,
    /// Cost per category.
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
    /// Suggested optimizations.
    #[serde(default)]
    pub optimizations: Vec<String>,
}

impl CostEstimate {
    /// Creates an estimate from a monthly figure.
    #[must_use]
    pub fn from_monthly(monthly: f64) -> Self {
        Self {
            monthly,
            hourly: monthly / HOURS_PER_MONTH,
            annual: monthly * 12.0,
            breakdown: BTreeMap::new(),
            optimizations: Vec::new(),
        }
    }

    /// Adds a breakdown entry.
    #[must_use]
    pub fn with_breakdown(mut self, category: impl Into<String>, amount: f64) -> Self {
        self.breakdown.insert(category.into(), amount);
        self
    }
}

/// A stage artifact to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDrop {
    /// Workflow id.
    pub workflow_id: String,
    /// Pipeline stage the artifact belongs to.
    pub stage: String,
    /// Artifact type.
    #[serde(rename = "type")]
    pub drop_type: String,
    /// Artifact payload.
    pub artifact: serde_json::Value,
}

/// Acknowledgement of a stored drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropReceipt {
    /// Id assigned by the store.
    pub drop_id: String,
}

/// Input to the deployer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Workflow id.
    pub workflow_id: String,
    /// Target provider.
    pub provider: String,
    /// Deployment environment.
    pub environment: String,
    /// Code to apply.
    pub code: BTreeMap<String, String>,
    /// Perform no external mutation and report synthetic success.
    pub dry_run: bool,
}

/// Outcome of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Deployment id.
    pub deployment_id: String,
    /// Deployment status.
    pub status: String,
    /// URL of the deployed environment.
    pub url: String,
    /// Provisioned resources.
    #[serde(default)]
    pub resources: Vec<String>,
}

impl DeploymentResult {
    /// Builds the synthetic result of a dry-run deployment.
    #[must_use]
    pub fn dry_run(workflow_id: &str) -> Self {
        Self {
            deployment_id: format!("dry-run-{workflow_id}"),
            status: "dry_run_success".to_string(),
            url: format!("https://preview.infraflow.dev/{workflow_id}"),
            resources: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_code() -> BTreeMap<String, String> {
        let mut code = BTreeMap::new();
        code.insert("main.tf".to_string(), "resource \"aws_vpc\" \"main\" {}".to_string());
        code.insert("variables.tf".to_string(), "variable \"region\" {}".to_string());
        code
    }

    #[test]
    fn test_infrastructure_code_checksum() {
        let code = InfrastructureCode::new("terraform", sample_code());

        assert_eq!(code.checksum.len(), 64);
        assert_eq!(code.size_bytes, 48);
        assert!(code.verify_checksum());

        let mut tampered = code.clone();
        tampered.code.insert("extra.tf".to_string(), String::new());
        assert!(!tampered.verify_checksum());
    }

    #[test]
    fn test_default_documentation_lists_files() {
        let code = InfrastructureCode::new("terraform", sample_code())
            .with_deploy_script("terraform apply")
            .with_default_documentation();

        assert!(code.documentation.contains("## Framework: terraform"));
        assert!(code.documentation.contains("- main.tf"));
        assert!(code.documentation.contains("terraform apply"));
    }

    #[test]
    fn test_compliance_threshold() {
        assert!(ComplianceResult::new(80.0, 8, 2).compliant);
        assert!(!ComplianceResult::new(79.9, 7, 3).compliant);
    }

    #[test]
    fn test_cost_from_monthly() {
        let estimate = CostEstimate::from_monthly(720.0).with_breakdown("compute", 288.0);
        assert!((estimate.hourly - 1.0).abs() < f64::EPSILON);
        assert!((estimate.annual - 8640.0).abs() < f64::EPSILON);
        assert_eq!(estimate.breakdown.len(), 1);
    }

    #[test]
    fn test_resource_type_serialized_as_type() {
        let resource = ResourceRequirement::new("database", "postgres")
            .with_property("engine", serde_json::json!("postgresql"));
        let json = serde_json::to_value(&resource).unwrap();

        assert_eq!(json["type"], "database");
        assert_eq!(json["properties"]["engine"], "postgresql");
    }

    #[test]
    fn test_dry_run_deployment() {
        let result = DeploymentResult::dry_run("wf-7");
        assert_eq!(result.status, "dry_run_success");
        assert!(result.url.ends_with("/wf-7"));
    }
}
