//! Identity types shared by the audit engine and its clients

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CuraError;

// ============================================================================
// Auditable Entity Registry
// ============================================================================

/// Domain entity kinds whose mutations are recorded in the audit log.
///
/// The set is closed: a type name that does not parse into one of these
/// variants is not auditable. Names serialize as the domain class name
/// (`"Gene"`, `"CancerType"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuditEntity {
    Alteration,
    Article,
    Association,
    BiomarkerAssociation,
    CancerType,
    ClinicalTrial,
    CompanionDiagnosticDevice,
    Consequence,
    DeviceUsageIndication,
    Drug,
    EligibilityCriteria,
    EnsemblGene,
    Evidence,
    FdaDrug,
    FdaSubmission,
    FdaSubmissionType,
    Flag,
    Gene,
    GenomeFragment,
    GenomicIndicator,
    SeqRegion,
    Synonym,
    Transcript,
    Treatment,
}

impl AuditEntity {
    /// Every auditable entity kind, in declaration order
    pub const ALL: [AuditEntity; 24] = [
        Self::Alteration,
        Self::Article,
        Self::Association,
        Self::BiomarkerAssociation,
        Self::CancerType,
        Self::ClinicalTrial,
        Self::CompanionDiagnosticDevice,
        Self::Consequence,
        Self::DeviceUsageIndication,
        Self::Drug,
        Self::EligibilityCriteria,
        Self::EnsemblGene,
        Self::Evidence,
        Self::FdaDrug,
        Self::FdaSubmission,
        Self::FdaSubmissionType,
        Self::Flag,
        Self::Gene,
        Self::GenomeFragment,
        Self::GenomicIndicator,
        Self::SeqRegion,
        Self::Synonym,
        Self::Transcript,
        Self::Treatment,
    ];

    /// Domain class name of the entity kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alteration => "Alteration",
            Self::Article => "Article",
            Self::Association => "Association",
            Self::BiomarkerAssociation => "BiomarkerAssociation",
            Self::CancerType => "CancerType",
            Self::ClinicalTrial => "ClinicalTrial",
            Self::CompanionDiagnosticDevice => "CompanionDiagnosticDevice",
            Self::Consequence => "Consequence",
            Self::DeviceUsageIndication => "DeviceUsageIndication",
            Self::Drug => "Drug",
            Self::EligibilityCriteria => "EligibilityCriteria",
            Self::EnsemblGene => "EnsemblGene",
            Self::Evidence => "Evidence",
            Self::FdaDrug => "FdaDrug",
            Self::FdaSubmission => "FdaSubmission",
            Self::FdaSubmissionType => "FdaSubmissionType",
            Self::Flag => "Flag",
            Self::Gene => "Gene",
            Self::GenomeFragment => "GenomeFragment",
            Self::GenomicIndicator => "GenomicIndicator",
            Self::SeqRegion => "SeqRegion",
            Self::Synonym => "Synonym",
            Self::Transcript => "Transcript",
            Self::Treatment => "Treatment",
        }
    }
}

impl fmt::Display for AuditEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AuditEntity {
    type Err = CuraError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|entity| entity.as_str() == s)
            .ok_or_else(|| CuraError::UnknownEntityType(s.to_string()))
    }
}

// ============================================================================
// Instance Identity
// ============================================================================

/// Stable identifier of a record within its entity type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    Text(String),
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(id) => write!(f, "{}", id),
            PrimaryKey::Text(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for PrimaryKey {
    type Err = CuraError;

    /// Integer-looking keys parse as `Int`, anything else non-empty as `Text`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CuraError::InvalidInstanceId("primary key is empty".to_string()));
        }
        Ok(s.parse::<i64>()
            .map(PrimaryKey::Int)
            .unwrap_or_else(|_| PrimaryKey::Text(s.to_string())))
    }
}

impl From<i64> for PrimaryKey {
    fn from(id: i64) -> Self {
        PrimaryKey::Int(id)
    }
}

impl From<&str> for PrimaryKey {
    fn from(id: &str) -> Self {
        PrimaryKey::Text(id.to_string())
    }
}

/// Time-independent identity of one versioned record: `(entity type, primary key)`.
///
/// Displays as `Gene/42`, the same shape the audit log uses for global ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceId {
    pub entity_type: AuditEntity,
    pub id: PrimaryKey,
}

impl InstanceId {
    pub fn new(entity_type: AuditEntity, id: impl Into<PrimaryKey>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

impl FromStr for InstanceId {
    type Err = CuraError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (entity_type, id) = s
            .split_once('/')
            .ok_or_else(|| CuraError::InvalidInstanceId(s.to_string()))?;
        Ok(Self {
            entity_type: entity_type.parse()?,
            id: id.parse()?,
        })
    }
}
