//! API Models
//!
//! Response bodies of the REST API, documented for OpenAPI with `utoipa`.

use parley_core::topic::Topic;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Presence report for the credentials the service depends on.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    /// `ok` when every required credential is set, `missing` otherwise.
    #[schema(example = "ok")]
    pub status: String,
    /// Names of unset credentials. Values are never reported.
    pub missing: Vec<String>,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Display data of one role-play topic. The model instruction stays server-side.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct TopicSummary {
    #[schema(example = "market")]
    pub id: String,
    #[schema(example = "בשוק")]
    pub title: String,
    #[schema(example = "🛍️")]
    pub emoji: String,
    pub description: String,
}

impl From<&Topic> for TopicSummary {
    fn from(topic: &Topic) -> Self {
        Self {
            id: topic.id.clone(),
            title: topic.title.clone(),
            emoji: topic.emoji.clone(),
            description: topic.description.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
