//! Single-attempt HTTP dispatch against the configured upstream.

use std::sync::Arc;
use std::time::Duration;

use crate::context::OutboundPayload;
use crate::http_client::{HttpError, HttpRequest, HttpTransport};
use crate::{ClientConfig, RequestContext, ResponseEnvelope, UpstreamError};

pub const HEALTH_PATH: &str = "/health";
pub const CLIENT_VERSION: &str = concat!("opsdeck/", env!("CARGO_PKG_VERSION"));

/// Successful attempt: the validated envelope plus the HTTP status it came with.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub status: u16,
    pub envelope: ResponseEnvelope,
}

/// Performs one upstream attempt. Holds no per-call state.
#[derive(Clone)]
pub struct RequestDispatcher {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    api_key: Option<String>,
    features: String,
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("endpoint", &self.endpoint)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl RequestDispatcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: &ClientConfig,
    ) -> Result<Self, UpstreamError> {
        let endpoint = config.endpoint.clone().ok_or(UpstreamError::NotConfigured)?;
        Ok(Self {
            transport,
            endpoint,
            api_key: config.api_key.clone(),
            features: config.enabled_features().join(","),
        })
    }

    /// `POST {endpoint}{resource path}` with the context as JSON body.
    pub async fn attempt(
        &self,
        context: &RequestContext,
        request_id: &str,
        timeout: Duration,
    ) -> Result<Dispatched, UpstreamError> {
        let resource = context.resource();
        let body = serde_json::to_string(&OutboundPayload::from(context))
            .map_err(|e| UpstreamError::malformed(format!("failed to encode request body: {e}")))?;

        let request = self
            .request(HttpRequest::post(self.url(resource.path())), request_id, timeout)
            .with_header("content-type", "application/json")
            .with_header("x-tenant-id", context.tenant_id())
            .with_header("x-resource", resource.as_str())
            .with_body(body);

        let response = self.send(request, timeout).await?;
        if !response.is_success() {
            return Err(UpstreamError::Status {
                status: response.status,
            });
        }

        let envelope: ResponseEnvelope = serde_json::from_str(&response.body)
            .map_err(|e| UpstreamError::malformed(e.to_string()))?;
        envelope
            .validate()
            .map_err(|e| UpstreamError::malformed(e.to_string()))?;

        Ok(Dispatched {
            status: response.status,
            envelope,
        })
    }

    /// `GET {endpoint}/health`; any 2xx status is healthy.
    pub async fn probe(&self, request_id: &str, timeout: Duration) -> Result<u16, UpstreamError> {
        let request = self.request(HttpRequest::get(self.url(HEALTH_PATH)), request_id, timeout);
        let response = self.send(request, timeout).await?;
        if response.is_success() {
            Ok(response.status)
        } else {
            Err(UpstreamError::Status {
                status: response.status,
            })
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    fn request(&self, request: HttpRequest, request_id: &str, timeout: Duration) -> HttpRequest {
        request
            .with_bearer_token(self.api_key.as_deref())
            .with_header("x-request-id", request_id)
            .with_header("x-client-version", CLIENT_VERSION)
            .with_header("x-client-features", self.features.as_str())
            .with_timeout(timeout)
    }

    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<crate::http_client::HttpResponse, UpstreamError> {
        match tokio::time::timeout(timeout, self.transport.execute(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(map_http_error(error)),
            Err(_) => Err(UpstreamError::timeout(format!(
                "no response within {}ms",
                timeout.as_millis()
            ))),
        }
    }
}

fn map_http_error(error: HttpError) -> UpstreamError {
    if error.is_timeout() {
        UpstreamError::timeout(error.message())
    } else {
        UpstreamError::transport(error.message())
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use super::*;
    use crate::http_client::HttpResponse;
    use crate::ResourceKind;

    struct CannedTransport {
        response: Result<HttpResponse, HttpError>,
        delay: Duration,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl CannedTransport {
        fn new(response: Result<HttpResponse, HttpError>) -> Self {
            Self {
                response,
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpTransport for CannedTransport {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.seen.lock().expect("not poisoned").push(request);
            Box::pin(async move {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.response.clone()
            })
        }
    }

    fn dispatcher(transport: Arc<CannedTransport>) -> RequestDispatcher {
        let config = ClientConfig {
            api_key: Some(String::from("secret")),
            ..ClientConfig::with_endpoint("https://analytics.example.test/").expect("valid")
        };
        RequestDispatcher::new(transport, &config).expect("endpoint configured")
    }

    fn context() -> RequestContext {
        RequestContext::new("tenant-9", ResourceKind::InventorySignal)
            .expect("valid")
            .with_param("warehouse", "north")
    }

    const ENVELOPE: &str =
        r#"{"data":[],"generatedAt":"2024-05-01T12:00:00Z","source":"engine","confidence":0.9}"#;

    #[tokio::test]
    async fn posts_payload_with_wire_headers() {
        let transport = Arc::new(CannedTransport::new(Ok(HttpResponse::ok_json(ENVELOPE))));
        let dispatched = dispatcher(transport.clone())
            .attempt(&context(), "call:1", Duration::from_secs(1))
            .await
            .expect("success");
        assert_eq!(dispatched.status, 200);
        assert_eq!(dispatched.envelope.source, "engine");

        let seen = transport.seen.lock().expect("not poisoned");
        let request = &seen[0];
        assert_eq!(request.url, "https://analytics.example.test/inventory/signals");
        assert_eq!(request.header("Authorization"), Some("Bearer secret"));
        assert_eq!(request.header("X-Tenant-Id"), Some("tenant-9"));
        assert_eq!(request.header("X-Resource"), Some("inventory_signal"));
        assert_eq!(request.header("X-Request-Id"), Some("call:1"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header("X-Client-Version"), Some(CLIENT_VERSION));

        let body: serde_json::Value =
            serde_json::from_str(request.body.as_deref().expect("body")).expect("json body");
        assert_eq!(body["tenantId"], "tenant-9");
        assert_eq!(body["resource"], "inventory_signal");
        assert_eq!(body["params"]["warehouse"], "north");
        assert!(body.get("dateRange").is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_retryable() {
        let transport = Arc::new(CannedTransport::new(Ok(HttpResponse::new(503, "busy"))));
        let err = dispatcher(transport)
            .attempt(&context(), "call:1", Duration::from_secs(1))
            .await
            .expect_err("503");
        assert_eq!(err, UpstreamError::Status { status: 503 });
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn malformed_or_invalid_body_is_not_retryable() {
        for body in [
            "not json",
            r#"{"data":[],"generatedAt":"2024-05-01T12:00:00Z","source":"engine","confidence":2.0}"#,
        ] {
            let transport = Arc::new(CannedTransport::new(Ok(HttpResponse::ok_json(body))));
            let err = dispatcher(transport)
                .attempt(&context(), "call:1", Duration::from_secs(1))
                .await
                .expect_err("malformed");
            assert!(matches!(err, UpstreamError::Malformed { .. }), "{body}");
            assert!(!err.retryable());
        }
    }

    #[tokio::test]
    async fn slow_transport_is_cut_off_by_attempt_timeout() {
        let mut transport = CannedTransport::new(Ok(HttpResponse::ok_json(ENVELOPE)));
        transport.delay = Duration::from_millis(200);
        let err = dispatcher(Arc::new(transport))
            .attempt(&context(), "call:1", Duration::from_millis(10))
            .await
            .expect_err("timeout");
        assert_eq!(err.code(), "upstream.timeout");
    }

    #[tokio::test]
    async fn probe_targets_health_path() {
        let transport = Arc::new(CannedTransport::new(Ok(HttpResponse::new(204, ""))));
        let status = dispatcher(transport.clone())
            .probe("ping:1", Duration::from_secs(1))
            .await
            .expect("healthy");
        assert_eq!(status, 204);
        let seen = transport.seen.lock().expect("not poisoned");
        assert_eq!(seen[0].url, "https://analytics.example.test/health");
        assert!(seen[0].body.is_none());
    }

    #[test]
    fn missing_endpoint_is_not_configured() {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(CannedTransport::new(Err(HttpError::new("unused"))));
        let err = RequestDispatcher::new(transport, &ClientConfig::default()).expect_err("no endpoint");
        assert_eq!(err, UpstreamError::NotConfigured);
    }
}
