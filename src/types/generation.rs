//! Generation request and result types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Why a generation happened. Used for statistics classification only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GenerationMode {
    Manual,
    Upload,
    Batch,
    Api,
    ApiBatch,
    WooCommerce,
    WooCommerceVariation,
    Cli,
    Other(String),
}

impl GenerationMode {
    /// Storage tag, e.g. `"api_batch"`.
    pub fn as_str(&self) -> &str {
        match self {
            GenerationMode::Manual => "manual",
            GenerationMode::Upload => "upload",
            GenerationMode::Batch => "batch",
            GenerationMode::Api => "api",
            GenerationMode::ApiBatch => "api_batch",
            GenerationMode::WooCommerce => "woocommerce",
            GenerationMode::WooCommerceVariation => "woocommerce_variation",
            GenerationMode::Cli => "cli",
            GenerationMode::Other(tag) => tag,
        }
    }

    /// Human-readable label for reports.
    pub fn label(&self) -> &str {
        match self {
            GenerationMode::Manual => "Manual update",
            GenerationMode::Upload => "Image upload",
            GenerationMode::Batch => "Batch processing",
            GenerationMode::Api => "REST API",
            GenerationMode::ApiBatch => "REST API batch",
            GenerationMode::WooCommerce => "Product image",
            GenerationMode::WooCommerceVariation => "Product variation image",
            GenerationMode::Cli => "Command line",
            GenerationMode::Other(tag) => tag,
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for GenerationMode {
    fn from(s: &str) -> Self {
        match s {
            "manual" => GenerationMode::Manual,
            "upload" => GenerationMode::Upload,
            "batch" => GenerationMode::Batch,
            "api" => GenerationMode::Api,
            "api_batch" => GenerationMode::ApiBatch,
            "woocommerce" => GenerationMode::WooCommerce,
            "woocommerce_variation" => GenerationMode::WooCommerceVariation,
            "cli" => GenerationMode::Cli,
            other => GenerationMode::Other(other.to_string()),
        }
    }
}

impl FromStr for GenerationMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GenerationMode::from(s))
    }
}

impl Serialize for GenerationMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GenerationMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(GenerationMode::from(s.as_str()))
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Text produced by a single vision API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub text: String,
    pub usage: Usage,
}

impl Description {
    pub fn tokens_used(&self) -> u32 {
        self.usage.total_tokens
    }
}

/// Result of [`EnrichmentService::generate`](crate::EnrichmentService::generate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub text: String,
    /// Tokens spent producing this text; 0 for cache hits.
    pub tokens_used: u32,
    /// Served from the description cache.
    pub cached: bool,
    /// Preview result: nothing was cached, persisted or recorded as applied.
    pub preview: bool,
}

/// Requested direction for regenerating an existing description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Improvement {
    MoreDescriptive,
    MoreConcise,
    MoreAccessible,
    BetterSeo,
    TechnicalAccuracy,
    BrandVoice,
    /// Free-form reviewer feedback.
    Custom(String),
}

impl Improvement {
    /// Parse the wire tag used by front-ends. `custom` takes `feedback`.
    pub fn from_tag(tag: &str, feedback: Option<&str>) -> Option<Self> {
        let improvement = match tag {
            "more_descriptive" => Improvement::MoreDescriptive,
            "more_concise" => Improvement::MoreConcise,
            "more_accessible" => Improvement::MoreAccessible,
            "better_seo" => Improvement::BetterSeo,
            "technical_accuracy" => Improvement::TechnicalAccuracy,
            "brand_voice" => Improvement::BrandVoice,
            "custom" => {
                let text = feedback.map(str::trim).filter(|f| !f.is_empty())?;
                Improvement::Custom(text.to_string())
            }
            _ => return None,
        };
        Some(improvement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_tags_round_trip_through_strings() {
        for mode in [
            GenerationMode::Manual,
            GenerationMode::ApiBatch,
            GenerationMode::WooCommerceVariation,
        ] {
            assert_eq!(GenerationMode::from(mode.as_str()), mode);
        }
        assert_eq!(
            GenerationMode::from("import"),
            GenerationMode::Other("import".into())
        );
    }

    #[test]
    fn mode_labels() {
        assert_eq!(GenerationMode::Upload.label(), "Image upload");
        assert_eq!(GenerationMode::Batch.label(), "Batch processing");
        assert_eq!(GenerationMode::Other("x".into()).label(), "x");
    }

    #[test]
    fn mode_serializes_as_tag() {
        let json = serde_json::to_string(&GenerationMode::ApiBatch).unwrap();
        assert_eq!(json, "\"api_batch\"");
    }

    #[test]
    fn custom_improvement_requires_feedback() {
        assert_eq!(Improvement::from_tag("custom", Some("   ")), None);
        assert_eq!(
            Improvement::from_tag("custom", Some("mention the logo")),
            Some(Improvement::Custom("mention the logo".into()))
        );
        assert_eq!(
            Improvement::from_tag("better_seo", None),
            Some(Improvement::BetterSeo)
        );
        assert_eq!(Improvement::from_tag("unknown", None), None);
    }
}
