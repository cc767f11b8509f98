//! Deterministic local payloads served whenever the upstream cannot be used.

use serde::Serialize;
use serde_json::Value;

use crate::envelope::FALLBACK_SOURCE;
use crate::{ResourceKind, ResponseEnvelope, UtcDateTime};

pub const FALLBACK_CONFIDENCE: f64 = 0.35;
pub const DEFAULT_SEED: u64 = 0x0d5e_ed00;

const HISTORY_DAYS: usize = 14;
const FORECAST_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Healthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: String,
    pub title: &'static str,
    pub rationale: &'static str,
    pub impact: f64,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventorySignal {
    pub sku: &'static str,
    pub on_hand: u64,
    pub daily_velocity: f64,
    /// `None` when nothing sells, so cover is unbounded.
    pub days_of_cover: Option<f64>,
    pub trend_slope: f64,
    pub forecast_7d: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeoOpportunity {
    pub keyword: &'static str,
    pub page: &'static str,
    pub search_volume: u64,
    pub current_rank: u32,
    pub difficulty: u32,
    pub estimated_uplift: u64,
}

const RECOMMENDATIONS: [(&str, &str); 3] = [
    (
        "Bundle slow movers with best sellers",
        "Attach-rate on top products is high enough to lift aged stock",
    ),
    (
        "Raise free-shipping threshold",
        "Average basket sits just below the current threshold",
    ),
    (
        "Re-engage lapsed subscribers",
        "Repeat-purchase cohort from last quarter has gone quiet",
    ),
];

const SKUS: [&str; 3] = ["SKU-1001", "SKU-1002", "SKU-1003"];

const KEYWORDS: [(&str, &str); 3] = [
    ("organic cotton tote", "/products/organic-tote"),
    ("reusable coffee cup", "/products/travel-cup"),
    ("gift cards online", "/gift-cards"),
];

/// Pure payload generator keyed by resource kind. Stateless apart from its seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackProvider {
    seed: u64,
}

impl Default for FallbackProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl FallbackProvider {
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Canned envelope: `source = "mock"`, fixed confidence, generated now.
    pub fn get(&self, resource: ResourceKind) -> ResponseEnvelope {
        ResponseEnvelope {
            data: self.payload(resource),
            generated_at: UtcDateTime::now(),
            source: FALLBACK_SOURCE.to_owned(),
            confidence: FALLBACK_CONFIDENCE,
        }
    }

    pub fn payload(&self, resource: ResourceKind) -> Value {
        let value = match resource {
            ResourceKind::Recommendation => serde_json::to_value(self.recommendations()),
            ResourceKind::InventorySignal => serde_json::to_value(self.inventory_signals()),
            ResourceKind::SeoOpportunity => serde_json::to_value(self.seo_opportunities()),
        };
        // Plain structs with finite floats always serialize.
        value.unwrap_or_default()
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        RECOMMENDATIONS
            .iter()
            .enumerate()
            .map(|(index, &(title, rationale))| {
                let seed = self.mix(title);
                let impact = round2(0.45 + (seed % 50) as f64 / 100.0);
                Recommendation {
                    id: format!("rec-{}", index + 1),
                    title,
                    rationale,
                    impact,
                    priority: priority_for(impact),
                }
            })
            .collect()
    }

    pub fn inventory_signals(&self) -> Vec<InventorySignal> {
        SKUS.iter()
            .enumerate()
            .map(|(index, &sku)| {
                let seed = self.mix(sku);
                let history = sales_history(seed, index);
                let daily_velocity = mean(&history);
                let trend = linear_trend(&history);
                let on_hand = 40 + seed % 360;

                let days_of_cover =
                    (daily_velocity > 0.0).then(|| round2(on_hand as f64 / daily_velocity));
                let forecast = (HISTORY_DAYS..HISTORY_DAYS + FORECAST_DAYS)
                    .map(|day| (trend.intercept + trend.slope * day as f64).max(0.0))
                    .sum::<f64>();

                InventorySignal {
                    sku,
                    on_hand,
                    daily_velocity: round2(daily_velocity),
                    days_of_cover,
                    trend_slope: round2(trend.slope),
                    forecast_7d: round2(forecast),
                    severity: severity_for(days_of_cover),
                }
            })
            .collect()
    }

    pub fn seo_opportunities(&self) -> Vec<SeoOpportunity> {
        KEYWORDS
            .iter()
            .map(|&(keyword, page)| {
                let seed = self.mix(keyword);
                let search_volume = 800 + seed % 4_200;
                let current_rank = 4 + (seed % 27) as u32;
                let ctr_gap = 0.28 - 0.28 / f64::from(current_rank).sqrt();
                SeoOpportunity {
                    keyword,
                    page,
                    search_volume,
                    current_rank,
                    difficulty: 15 + ((seed / 7) % 70) as u32,
                    estimated_uplift: (search_volume as f64 * ctr_gap).round() as u64,
                }
            })
            .collect()
    }

    fn mix(&self, label: &str) -> u64 {
        label.bytes().fold(self.seed, |acc, byte| {
            acc.wrapping_mul(37).wrapping_add(byte as u64)
        })
    }
}

/// Least-squares line through `(index, value)` points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trend {
    pub slope: f64,
    pub intercept: f64,
}

/// Fits `value = intercept + slope * index`. Fewer than two points, or a flat
/// history, give slope 0.
pub fn linear_trend(values: &[f64]) -> Trend {
    let n = values.len();
    if n < 2 {
        return Trend {
            slope: 0.0,
            intercept: values.first().copied().unwrap_or(0.0),
        };
    }

    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = mean(values);
    let (covariance, variance) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(cov, var), (index, value)| {
            let dx = index as f64 - mean_x;
            (cov + dx * (value - mean_y), var + dx * dx)
        });

    let slope = if variance > 0.0 && covariance.is_finite() {
        covariance / variance
    } else {
        0.0
    };
    Trend {
        slope,
        intercept: mean_y - slope * mean_x,
    }
}

fn sales_history(seed: u64, index: usize) -> Vec<f64> {
    let base = 4.0 + (seed % 18) as f64;
    // Every third SKU sells a fixed amount per day.
    if index % 3 == 2 {
        return vec![base; HISTORY_DAYS];
    }
    let step = ((seed / 3) % 9) as f64 / 10.0 - 0.3;
    (0..HISTORY_DAYS)
        .map(|day| {
            let wobble = ((seed >> (day % 16)) % 3) as f64 - 1.0;
            (base + step * day as f64 + wobble).max(0.0)
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn priority_for(impact: f64) -> Priority {
    if impact >= 0.75 {
        Priority::High
    } else if impact >= 0.6 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

fn severity_for(days_of_cover: Option<f64>) -> Severity {
    match days_of_cover {
        Some(days) if days < 7.0 => Severity::Critical,
        Some(days) if days < 14.0 => Severity::Warning,
        _ => Severity::Healthy,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_a_pure_function_of_seed_and_resource() {
        let provider = FallbackProvider::new(42);
        for resource in ResourceKind::ALL {
            assert_eq!(provider.payload(resource), FallbackProvider::new(42).payload(resource));
        }
    }

    #[test]
    fn envelope_is_tagged_as_mock() {
        let envelope = FallbackProvider::default().get(ResourceKind::Recommendation);
        assert!(envelope.is_fallback());
        assert_eq!(envelope.confidence, FALLBACK_CONFIDENCE);
        envelope.validate().expect("fallback envelope is valid");
    }

    #[test]
    fn payload_shapes_match_resource_kind() {
        let provider = FallbackProvider::default();

        let recommendations = provider.payload(ResourceKind::Recommendation);
        let first = &recommendations[0];
        for field in ["id", "title", "rationale", "impact", "priority"] {
            assert!(first.get(field).is_some(), "recommendation.{field}");
        }

        let signals = provider.payload(ResourceKind::InventorySignal);
        for field in [
            "sku",
            "on_hand",
            "daily_velocity",
            "days_of_cover",
            "trend_slope",
            "forecast_7d",
            "severity",
        ] {
            assert!(signals[0].get(field).is_some(), "inventory_signal.{field}");
        }

        let seo = provider.payload(ResourceKind::SeoOpportunity);
        for field in [
            "keyword",
            "page",
            "search_volume",
            "current_rank",
            "difficulty",
            "estimated_uplift",
        ] {
            assert!(seo[0].get(field).is_some(), "seo_opportunity.{field}");
        }
    }

    #[test]
    fn flat_history_has_zero_slope() {
        let trend = linear_trend(&[5.0; 14]);
        assert_eq!(trend.slope, 0.0);
        assert_eq!(trend.intercept, 5.0);

        let flat_sku = &FallbackProvider::default().inventory_signals()[2];
        assert_eq!(flat_sku.trend_slope, 0.0);
        assert!(!flat_sku.trend_slope.is_nan());
    }

    #[test]
    fn trend_recovers_a_straight_line() {
        let values = (0..10).map(|x| 3.0 + 2.0 * x as f64).collect::<Vec<_>>();
        let trend = linear_trend(&values);
        assert!((trend.slope - 2.0).abs() < 1e-9);
        assert!((trend.intercept - 3.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_histories_do_not_produce_nan() {
        assert_eq!(linear_trend(&[]).slope, 0.0);
        assert_eq!(linear_trend(&[7.0]).slope, 0.0);
        assert_eq!(linear_trend(&[7.0]).intercept, 7.0);
    }

    #[test]
    fn forecasts_are_never_negative() {
        for seed in 0..64 {
            for signal in FallbackProvider::new(seed).inventory_signals() {
                assert!(signal.forecast_7d >= 0.0, "seed {seed}: {signal:?}");
                assert!(signal.trend_slope.is_finite());
            }
        }
    }
}
