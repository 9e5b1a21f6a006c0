//! Release collaborators
//!
//! The "newly released" report needs two inputs the audit engine does not
//! own: the date of the current data release, and the flag entities whose
//! presence on a gene marks it as released. The date comes from a
//! [`ReleaseDateSource`]; the flags are configured as [`ReleaseFlag`]s.

use crate::audit::{GainMode, RelationGainQuery};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use cura_common::types::{AuditEntity, InstanceId, PrimaryKey};
use cura_common::CuraError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Date format of `dataVersion.date` in the OncoKB info endpoint
const INFO_DATE_FORMAT: &str = "%m/%d/%Y";

/// Default request timeout of the info client
pub const DEFAULT_INFO_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("Release date request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Release date service responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid release date '{0}'")]
    InvalidDate(String),
}

// ============================================================================
// Release Date Sources
// ============================================================================

#[async_trait]
pub trait ReleaseDateSource: Send + Sync {
    /// Date of the current data release
    async fn current_release_date(&self) -> Result<NaiveDate, ReleaseError>;
}

/// Start of the release day in UTC, used as the `since` bound of the report
pub fn release_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Release date fixed by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticReleaseDate(pub NaiveDate);

#[async_trait]
impl ReleaseDateSource for StaticReleaseDate {
    async fn current_release_date(&self) -> Result<NaiveDate, ReleaseError> {
        Ok(self.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoResponse {
    data_version: DataVersion,
}

#[derive(Debug, Deserialize)]
struct DataVersion {
    #[serde(default)]
    version: Option<String>,
    date: String,
}

/// Reads the release date from an OncoKB `/api/v1/info` endpoint
#[derive(Debug, Clone)]
pub struct OncoKbInfoClient {
    client: Client,
    info_url: String,
    token: Option<String>,
}

impl OncoKbInfoClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ReleaseError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_INFO_TIMEOUT_SECS))
            .user_agent(concat!("cura-server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            info_url: format!("{}/api/v1/info", base_url.trim_end_matches('/')),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }
}

#[async_trait]
impl ReleaseDateSource for OncoKbInfoClient {
    #[tracing::instrument(skip(self), fields(url = %self.info_url))]
    async fn current_release_date(&self) -> Result<NaiveDate, ReleaseError> {
        let mut request = self.client.get(&self.info_url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Release info request failed");
            return Err(ReleaseError::Status(response.status()));
        }

        let info: InfoResponse = response.json().await?;
        let date = parse_release_date(&info.data_version.date)?;

        tracing::debug!(
            version = info.data_version.version.as_deref().unwrap_or("-"),
            %date,
            "Fetched current release date"
        );
        Ok(date)
    }
}

/// Parse a `MM/dd/yyyy` release date
pub fn parse_release_date(value: &str) -> Result<NaiveDate, ReleaseError> {
    NaiveDate::parse_from_str(value.trim(), INFO_DATE_FORMAT)
        .map_err(|_| ReleaseError::InvalidDate(value.to_string()))
}

// ============================================================================
// Release Flags
// ============================================================================

/// A flag entity marking genes released for one release type
///
/// Written as `RELEASE_TYPE:FLAG:FLAG_ID`, e.g. `SOMATIC:ONCOKB_SOMATIC:1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseFlag {
    pub release_type: String,
    pub flag: String,
    pub flag_id: PrimaryKey,
}

impl ReleaseFlag {
    /// The flag instance that genes reference
    pub fn target(&self) -> InstanceId {
        InstanceId::new(AuditEntity::Flag, self.flag_id.clone())
    }
}

impl FromStr for ReleaseFlag {
    type Err = CuraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        match parts.as_slice() {
            [release_type, flag, flag_id] if !release_type.is_empty() && !flag.is_empty() => {
                Ok(Self {
                    release_type: release_type.to_string(),
                    flag: flag.to_string(),
                    flag_id: flag_id.parse()?,
                })
            },
            _ => Err(CuraError::Config(format!(
                "release flag '{}' must look like TYPE:FLAG:ID",
                s
            ))),
        }
    }
}

/// Parse a comma-separated list of release flags
pub fn parse_release_flags(value: &str) -> Result<Vec<ReleaseFlag>, CuraError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Shape of the newly-released report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Entity type whose snapshots are scanned
    pub entity_type: AuditEntity,
    /// Relation property referencing the release flags
    pub relation_property: String,
    /// Property reported for each released entity
    pub display_property: String,
    pub flags: Vec<ReleaseFlag>,
}

impl ReleaseReport {
    /// Gain query for one flag since `since`
    pub fn gain_query(
        &self,
        flag: &ReleaseFlag,
        since: DateTime<Utc>,
        mode: GainMode,
    ) -> RelationGainQuery {
        RelationGainQuery {
            entity_type: self.entity_type,
            relation_property: self.relation_property.clone(),
            target: flag.target(),
            since,
            display_property: self.display_property.clone(),
            mode,
        }
    }
}
