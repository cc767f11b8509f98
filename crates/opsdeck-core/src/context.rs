//! Typed request context handed to the client by dashboard pages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ResourceKind, UtcDateTime, ValidationError};

/// Scalar request parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Scalar {
    /// Parses a CLI-style value: booleans, integers and floats are recognized, anything
    /// else stays text.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            "null" => return Self::Null,
            _ => {}
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::Integer(value);
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Self::Float(value),
            _ => Self::Text(raw.to_owned()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Inclusive reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: UtcDateTime,
    pub end: UtcDateTime,
}

impl DateRange {
    pub fn new(start: UtcDateTime, end: UtcDateTime) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedDateRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }
}

/// Immutable per-call request context.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    tenant_id: String,
    resource: ResourceKind,
    params: BTreeMap<String, Scalar>,
    date_range: Option<DateRange>,
}

impl RequestContext {
    pub fn new(tenant_id: impl Into<String>, resource: ResourceKind) -> Result<Self, ValidationError> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(ValidationError::EmptyTenantId);
        }
        Ok(Self {
            tenant_id,
            resource,
            params: BTreeMap::new(),
            date_range: None,
        })
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = Some(date_range);
        self
    }

    /// Same tenant, params and window against another resource.
    pub fn for_resource(&self, resource: ResourceKind) -> Self {
        Self {
            resource,
            ..self.clone()
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub const fn resource(&self) -> ResourceKind {
        self.resource
    }

    pub fn params(&self) -> &BTreeMap<String, Scalar> {
        &self.params
    }

    pub const fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }
}

/// Outbound JSON body for resource calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundPayload<'a> {
    pub resource: ResourceKind,
    pub params: &'a BTreeMap<String, Scalar>,
    pub tenant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

impl<'a> From<&'a RequestContext> for OutboundPayload<'a> {
    fn from(context: &'a RequestContext) -> Self {
        Self {
            resource: context.resource,
            params: &context.params,
            tenant_id: &context.tenant_id,
            date_range: context.date_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_tenant() {
        let err = RequestContext::new("  ", ResourceKind::Recommendation).expect_err("must fail");
        assert_eq!(err, ValidationError::EmptyTenantId);
    }

    #[test]
    fn rejects_inverted_date_range() {
        let start = UtcDateTime::parse("2024-02-01T00:00:00Z").expect("valid");
        let end = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("valid");
        let err = DateRange::new(start, end).expect_err("must fail");
        assert!(matches!(err, ValidationError::InvertedDateRange { .. }));
    }

    #[test]
    fn payload_serializes_with_camel_case_keys() {
        let start = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("valid");
        let end = UtcDateTime::parse("2024-01-31T00:00:00Z").expect("valid");
        let context = RequestContext::new("tenant-7", ResourceKind::SeoOpportunity)
            .expect("valid context")
            .with_param("limit", 5_i64)
            .with_date_range(DateRange::new(start, end).expect("valid range"));

        let body = serde_json::to_value(OutboundPayload::from(&context)).expect("serializable");
        assert_eq!(body["resource"], "seo_opportunity");
        assert_eq!(body["tenantId"], "tenant-7");
        assert_eq!(body["params"]["limit"], 5);
        assert_eq!(body["dateRange"]["start"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn payload_omits_missing_date_range() {
        let context = RequestContext::new("tenant-7", ResourceKind::Recommendation).expect("valid");
        let body = serde_json::to_value(OutboundPayload::from(&context)).expect("serializable");
        assert!(body.get("dateRange").is_none());
    }

    #[test]
    fn infers_scalar_types() {
        assert_eq!(Scalar::infer("true"), Scalar::Bool(true));
        assert_eq!(Scalar::infer("42"), Scalar::Integer(42));
        assert_eq!(Scalar::infer("0.5"), Scalar::Float(0.5));
        assert_eq!(Scalar::infer("summer-sale"), Scalar::Text(String::from("summer-sale")));
    }
}
