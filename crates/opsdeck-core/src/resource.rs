use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream resource families. Determines the wire path and the fallback payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Recommendation,
    InventorySignal,
    SeoOpportunity,
}

impl ResourceKind {
    pub const ALL: [Self; 3] = [
        Self::Recommendation,
        Self::InventorySignal,
        Self::SeoOpportunity,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recommendation => "recommendation",
            Self::InventorySignal => "inventory_signal",
            Self::SeoOpportunity => "seo_opportunity",
        }
    }

    /// Path appended to the configured endpoint.
    pub const fn path(self) -> &'static str {
        match self {
            Self::Recommendation => "/recommendations",
            Self::InventorySignal => "/inventory/signals",
            Self::SeoOpportunity => "/seo/opportunities",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "recommendation" | "recommendations" => Ok(Self::Recommendation),
            "inventory_signal" | "inventory_signals" => Ok(Self::InventorySignal),
            "seo_opportunity" | "seo_opportunities" => Ok(Self::SeoOpportunity),
            other => Err(ValidationError::InvalidResource {
                value: other.to_owned(),
            }),
        }
    }
}
