//! The fixed provisioning stage table.
//!
//! Every workflow walks the same ordered list of stage descriptors. A
//! descriptor names the stage, classifies how its failure is treated, says
//! which request toggle gates it, and lists the required predecessors whose
//! output it consumes. Retry and timeout policy is configuration, not part
//! of the table; see [`crate::config::EngineConfig`].

mod result;

pub use result::{StageErrorKind, StageFailure, StageResult};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::ProvisioningRequest;

/// Identifies a stage in the provisioning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Analyze the application for infrastructure requirements.
    CodeAnalysis,
    /// Generate infrastructure-as-code.
    InfrastructureGeneration,
    /// Build a hardened golden image.
    GoldenImages,
    /// Generate standard operating procedures.
    SopGeneration,
    /// Validate the generated code against compliance frameworks.
    ComplianceValidation,
    /// Estimate running costs.
    CostEstimation,
    /// Persist the generated code as a drop.
    ArtifactStorage,
    /// Deploy the generated infrastructure.
    Deployment,
}

impl StageId {
    /// All stages in execution order.
    pub const ALL: [Self; 8] = [
        Self::CodeAnalysis,
        Self::InfrastructureGeneration,
        Self::GoldenImages,
        Self::SopGeneration,
        Self::ComplianceValidation,
        Self::CostEstimation,
        Self::ArtifactStorage,
        Self::Deployment,
    ];

    /// Returns the stage name used as the result key.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CodeAnalysis => "code_analysis",
            Self::InfrastructureGeneration => "infrastructure_generation",
            Self::GoldenImages => "golden_images",
            Self::SopGeneration => "sop_generation",
            Self::ComplianceValidation => "compliance_validation",
            Self::CostEstimation => "cost_estimation",
            Self::ArtifactStorage => "artifact_storage",
            Self::Deployment => "deployment",
        }
    }

    /// Returns a human-readable title.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::CodeAnalysis => "Code Analysis",
            Self::InfrastructureGeneration => "Infrastructure Generation",
            Self::GoldenImages => "Golden Image Building",
            Self::SopGeneration => "SOP Generation",
            Self::ComplianceValidation => "Compliance Validation",
            Self::CostEstimation => "Cost Estimation",
            Self::ArtifactStorage => "Artifact Storage",
            Self::Deployment => "Infrastructure Deployment",
        }
    }

    /// Returns the stage's position in the fixed topological order.
    #[must_use]
    pub fn rank(&self) -> usize {
        Self::ALL.iter().position(|id| id == self).unwrap_or(usize::MAX)
    }

    /// Looks up a stage by its result key.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    /// Returns the static definition of this stage.
    #[must_use]
    pub fn definition(&self) -> &'static StageDefinition {
        &STAGE_TABLE[self.rank()]
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a stage's failure affects the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Failure aborts the workflow.
    Required,
    /// Failure is recorded and the workflow continues.
    Optional,
    /// The final deploy step; failure marks the workflow `deployment_failed`.
    Terminal,
}

/// The request toggle that decides whether a stage is included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureGate {
    /// Always included.
    Always,
    /// Included when `enable_image_build` is set.
    ImageBuild,
    /// Included when `enable_sop` is set.
    Sop,
    /// Included when at least one compliance framework is requested.
    ComplianceRequested,
    /// Included when `auto_deploy` is set.
    AutoDeploy,
}

impl FeatureGate {
    /// Returns true if the gate admits the stage for this request.
    #[must_use]
    pub fn is_open(&self, request: &ProvisioningRequest) -> bool {
        match self {
            Self::Always => true,
            Self::ImageBuild => request.enable_image_build,
            Self::Sop => request.enable_sop,
            Self::ComplianceRequested => !request.compliance.is_empty(),
            Self::AutoDeploy => request.auto_deploy,
        }
    }
}

/// Static description of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDefinition {
    /// Stage identifier.
    pub id: StageId,
    /// Failure classification.
    pub criticality: Criticality,
    /// Inclusion gate.
    pub gate: FeatureGate,
    /// Required predecessors whose output this stage consumes.
    pub depends_on: &'static [StageId],
}

impl StageDefinition {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.id.name()
    }

    /// Returns true if failure of this stage aborts the workflow.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.criticality == Criticality::Required
    }
}

/// The pipeline, in execution order.
pub const STAGE_TABLE: [StageDefinition; 8] = [
    StageDefinition {
        id: StageId::CodeAnalysis,
        criticality: Criticality::Required,
        gate: FeatureGate::Always,
        depends_on: &[],
    },
    StageDefinition {
        id: StageId::InfrastructureGeneration,
        criticality: Criticality::Required,
        gate: FeatureGate::Always,
        depends_on: &[StageId::CodeAnalysis],
    },
    StageDefinition {
        id: StageId::GoldenImages,
        criticality: Criticality::Optional,
        gate: FeatureGate::ImageBuild,
        depends_on: &[StageId::CodeAnalysis],
    },
    StageDefinition {
        id: StageId::SopGeneration,
        criticality: Criticality::Optional,
        gate: FeatureGate::Sop,
        depends_on: &[StageId::InfrastructureGeneration],
    },
    StageDefinition {
        id: StageId::ComplianceValidation,
        criticality: Criticality::Optional,
        gate: FeatureGate::ComplianceRequested,
        depends_on: &[StageId::InfrastructureGeneration],
    },
    StageDefinition {
        id: StageId::CostEstimation,
        criticality: Criticality::Optional,
        gate: FeatureGate::Always,
        depends_on: &[StageId::CodeAnalysis],
    },
    StageDefinition {
        id: StageId::ArtifactStorage,
        criticality: Criticality::Optional,
        gate: FeatureGate::Always,
        depends_on: &[StageId::InfrastructureGeneration],
    },
    StageDefinition {
        id: StageId::Deployment,
        criticality: Criticality::Terminal,
        gate: FeatureGate::AutoDeploy,
        depends_on: &[StageId::InfrastructureGeneration],
    },
];

/// Returns the stages a request will attempt, in execution order.
#[must_use]
pub fn plan(request: &ProvisioningRequest) -> Vec<&'static StageDefinition> {
    STAGE_TABLE
        .iter()
        .filter(|def| def.gate.is_open(request))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(defs: &[&StageDefinition]) -> Vec<&'static str> {
        defs.iter().map(|d| d.name()).collect()
    }

    #[test]
    fn test_table_matches_stage_order() {
        for (rank, def) in STAGE_TABLE.iter().enumerate() {
            assert_eq!(def.id.rank(), rank);
            assert_eq!(def.id.definition(), def);
        }
    }

    #[test]
    fn test_dependencies_precede_and_are_required() {
        for def in &STAGE_TABLE {
            for dep in def.depends_on {
                assert!(dep.rank() < def.id.rank(), "{} before {}", dep, def.id);
                assert!(dep.definition().is_required());
            }
        }
    }

    #[test]
    fn test_plan_minimal_request() {
        let request = ProvisioningRequest::new("wf", "aws");
        assert_eq!(
            names(&plan(&request)),
            vec![
                "code_analysis",
                "infrastructure_generation",
                "cost_estimation",
                "artifact_storage",
            ]
        );
    }

    #[test]
    fn test_plan_everything_enabled() {
        let request = ProvisioningRequest::new("wf", "aws")
            .with_compliance("SOC2")
            .with_image_build(true)
            .with_sop(true)
            .with_auto_deploy(true);

        assert_eq!(
            names(&plan(&request)),
            StageId::ALL.iter().map(StageId::name).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_plan_compliance_gate() {
        let request = ProvisioningRequest::new("wf", "aws").with_image_build(true);
        let planned = names(&plan(&request));

        assert!(planned.contains(&"golden_images"));
        assert!(!planned.contains(&"compliance_validation"));
    }

    #[test]
    fn test_stage_id_lookup() {
        assert_eq!(StageId::from_name("deployment"), Some(StageId::Deployment));
        assert_eq!(StageId::from_name("nope"), None);
        assert_eq!(StageId::SopGeneration.to_string(), "sop_generation");
    }

    #[test]
    fn test_criticality_assignments() {
        assert_eq!(StageId::CodeAnalysis.definition().criticality, Criticality::Required);
        assert_eq!(StageId::ArtifactStorage.definition().criticality, Criticality::Optional);
        assert_eq!(StageId::Deployment.definition().criticality, Criticality::Terminal);
    }
}
