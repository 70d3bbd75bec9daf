//! Canned requests and collaborator outputs.

use std::collections::BTreeMap;

use crate::collaborators::{
    CodeAnalysis, ComplianceResult, CostEstimate, DropReceipt, DeploymentResult,
    GoldenImageResult, InfrastructureCode, ResourceRequirement, Runbook, SopResult, SopStep,
};
use crate::core::ProvisioningRequest;

/// An aws request with every toggle off and no compliance frameworks.
#[must_use]
pub fn minimal_request(workflow_id: &str) -> ProvisioningRequest {
    ProvisioningRequest::new(workflow_id, "aws")
}

/// An aws request with every optional stage enabled.
#[must_use]
pub fn full_request(workflow_id: &str) -> ProvisioningRequest {
    ProvisioningRequest::new(workflow_id, "aws")
        .with_environment("production")
        .with_compliance("SOC2")
        .with_compliance("HIPAA")
        .with_image_build(true)
        .with_sop(true)
        .with_auto_deploy(true)
}

/// Analysis of a small python web service.
#[must_use]
pub fn sample_analysis() -> CodeAnalysis {
    let mut requirements = BTreeMap::new();
    requirements.insert("high_availability".to_string(), serde_json::json!(true));
    requirements.insert("backup".to_string(), serde_json::json!("daily"));

    CodeAnalysis {
        language: "python".to_string(),
        framework: "fastapi".to_string(),
        recommended_os: "ubuntu-22.04".to_string(),
        required_packages: vec!["python3".to_string(), "nginx".to_string()],
        required_resources: vec![
            ResourceRequirement::new("compute", "api")
                .with_property("instance_type", serde_json::json!("t3.medium")),
            ResourceRequirement::new("database", "postgres")
                .with_property("engine", serde_json::json!("postgres15")),
        ],
        requirements,
    }
}

/// Generated terraform for [`sample_analysis`].
#[must_use]
pub fn sample_infrastructure() -> InfrastructureCode {
    let mut code = BTreeMap::new();
    code.insert(
        "main.tf".to_string(),
        "resource \"aws_instance\" \"api\" {\n  instance_type = \"t3.medium\"\n}\n".to_string(),
    );
    code.insert(
        "variables.tf".to_string(),
        "variable \"region\" { default = \"us-east-1\" }\n".to_string(),
    );
    InfrastructureCode::new("terraform", code)
        .with_deploy_script("terraform init && terraform apply -auto-approve")
        .with_default_documentation()
}

/// A scheduled golden image build.
#[must_use]
pub fn sample_image() -> GoldenImageResult {
    GoldenImageResult {
        image_id: "ami-0abc1234".to_string(),
        image_name: "golden-ubuntu-22.04-cis".to_string(),
        registry: "registry.infraflow.dev".to_string(),
        status: "building".to_string(),
        estimated_build_secs: 900,
    }
}

/// One runbook per requested operation.
#[must_use]
pub fn sample_sops(operations: &[String]) -> SopResult {
    SopResult {
        runbooks: operations
            .iter()
            .map(|operation| Runbook {
                operation: operation.clone(),
                steps: vec![SopStep {
                    name: format!("{operation}-check"),
                    description: format!("Verify preconditions for {operation}"),
                    command: "terraform plan".to_string(),
                    validation: "exit code 0".to_string(),
                    rollback: "none".to_string(),
                }],
                automated: false,
            })
            .collect(),
    }
}

/// A passing compliance report.
#[must_use]
pub fn sample_compliance() -> ComplianceResult {
    ComplianceResult::new(92.0, 46, 4).with_finding("S3 bucket versioning disabled")
}

/// A $250/month estimate.
#[must_use]
pub fn sample_cost() -> CostEstimate {
    CostEstimate::from_monthly(250.0)
        .with_breakdown("compute", 150.0)
        .with_breakdown("database", 100.0)
}

/// A drop receipt for `workflow_id`.
#[must_use]
pub fn sample_receipt(workflow_id: &str) -> DropReceipt {
    DropReceipt {
        drop_id: format!("drop-{workflow_id}"),
    }
}

/// A successful live deployment of `workflow_id`.
#[must_use]
pub fn sample_deployment(workflow_id: &str) -> DeploymentResult {
    DeploymentResult {
        deployment_id: format!("deploy-{workflow_id}"),
        status: "deployed".to_string(),
        url: format!("https://{workflow_id}.apps.infraflow.dev"),
        resources: vec!["aws_instance.api".to_string()],
    }
}
