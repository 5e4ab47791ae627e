//! Generation request types and builder.
//!
//! A GenerationRequest is constructed fresh for every generation attempt
//! cycle and is immutable once built.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Result, WaypointError};
use crate::tier::Tier;
use crate::types::AggregateScores;

/// Profile fields required unless the builder overrides them.
pub const DEFAULT_REQUIRED_PROFILE_FIELDS: &[&str] = &["name", "industry"];

/// Flat profile record supplied by the profile collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Profile {
    fields: BTreeMap<String, String>,
}

impl Profile {
    /// Create an empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Required fields that are absent or blank.
    pub fn missing<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        required
            .into_iter()
            .filter(|key| self.get(key).map_or(true, |v| v.trim().is_empty()))
            .map(str::to_string)
            .collect()
    }

    /// Iterate over fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Profile {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Desired report length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportLength {
    Brief,
    #[default]
    Standard,
    Detailed,
}

/// Output format of the report text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Markdown,
    PlainText,
}

/// Writing style of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportStyle {
    #[default]
    Executive,
    Technical,
    Narrative,
}

/// Presentation options passed through to the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GenerationOptions {
    pub length: ReportLength,
    pub format: ReportFormat,
    pub style: ReportStyle,
}

/// Input to one `generate()` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Unique identifier for this request.
    pub id: Uuid,

    /// Personalization fields.
    pub profile: Profile,

    /// The caller's resolved tier.
    pub tier: Tier,

    /// Number of completed catalog steps.
    pub completed_count: u32,

    /// Number of steps in the catalog.
    pub total_count: u32,

    /// Scores at the time of the request.
    pub scores: AggregateScores,

    /// Presentation options.
    #[serde(default)]
    pub options: GenerationOptions,

    /// Profile fields that must be present.
    #[serde(default = "default_required_fields", skip_serializing)]
    pub required_profile_fields: Vec<String>,

    /// Timestamp when the request was created.
    pub created_at: DateTime<Utc>,
}

fn default_required_fields() -> Vec<String> {
    DEFAULT_REQUIRED_PROFILE_FIELDS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Builder for creating GenerationRequests with a fluent API.
#[derive(Debug)]
pub struct GenerationRequestBuilder {
    profile: Profile,
    tier: Option<Tier>,
    completed_count: u32,
    total_count: u32,
    scores: AggregateScores,
    options: GenerationOptions,
    required_profile_fields: Vec<String>,
}

impl Default for GenerationRequestBuilder {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            tier: None,
            completed_count: 0,
            total_count: 0,
            scores: AggregateScores::default(),
            options: GenerationOptions::default(),
            required_profile_fields: default_required_fields(),
        }
    }
}

impl GenerationRequestBuilder {
    /// Create a new GenerationRequestBuilder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the profile.
    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Set the tier.
    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Set completed/total step counts.
    pub fn progress(mut self, completed_count: u32, total_count: u32) -> Self {
        self.completed_count = completed_count;
        self.total_count = total_count;
        self
    }

    /// Set the scores.
    pub fn scores(mut self, scores: AggregateScores) -> Self {
        self.scores = scores;
        self
    }

    /// Set presentation options.
    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Override which profile fields are required.
    pub fn require_profile_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_profile_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Build the request, reporting every missing field at once.
    pub fn build(self) -> Result<GenerationRequest> {
        let mut missing = Vec::new();
        if self.tier.is_none() {
            missing.push("tier".to_string());
        }

        let request = GenerationRequest {
            id: Uuid::new_v4(),
            profile: self.profile,
            // Placeholder only survives if `missing` is non-empty, which fails below.
            tier: self.tier.unwrap_or_else(|| Tier {
                id: String::new(),
                scoring_multiplier: 1.0,
                rank: 0,
            }),
            completed_count: self.completed_count,
            total_count: self.total_count,
            scores: self.scores,
            options: self.options,
            required_profile_fields: self.required_profile_fields,
            created_at: Utc::now(),
        };

        missing.extend(request.missing_fields());
        if !missing.is_empty() {
            return Err(WaypointError::missing_fields(missing));
        }

        request.check_consistency()?;
        Ok(request)
    }
}

impl GenerationRequest {
    /// Create a new GenerationRequestBuilder.
    pub fn builder() -> GenerationRequestBuilder {
        GenerationRequestBuilder::new()
    }

    /// Validate the request. Never retried by the pipeline.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.tier.id.trim().is_empty() {
            missing.push("tier".to_string());
        }
        missing.extend(self.missing_fields());
        if !missing.is_empty() {
            return Err(WaypointError::missing_fields(missing));
        }

        self.check_consistency()
    }

    /// Calculate a hash of the request content.
    pub fn content_hash(&self) -> String {
        let content = serde_json::json!({
            "id": self.id,
            "profile": self.profile,
            "tier": self.tier.id,
            "completed_count": self.completed_count,
            "total_count": self.total_count,
            "scores": self.scores,
            "options": self.options,
            "created_at": self.created_at,
        });

        let mut hasher = Sha256::new();
        hasher.update(content.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Completion ratio in `[0, 1]`.
    pub fn completion_ratio(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        f64::from(self.completed_count) / f64::from(self.total_count)
    }

    fn missing_fields(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .profile
            .missing(self.required_profile_fields.iter().map(String::as_str))
            .into_iter()
            .map(|field| format!("profile.{}", field))
            .collect();

        if self.completed_count == 0 {
            missing.push("completed_steps".to_string());
        }
        if self.total_count == 0 {
            missing.push("total_steps".to_string());
        }
        missing
    }

    fn check_consistency(&self) -> Result<()> {
        if self.completed_count > self.total_count {
            return Err(WaypointError::rejected(format!(
                "completed step count {} exceeds catalog size {}",
                self.completed_count, self.total_count
            )));
        }
        Ok(())
    }
}
