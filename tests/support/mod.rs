//! Scripted transports, recording observers and sleepers shared by the behavior tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opsdeck_core::clock::SleepFuture;
use opsdeck_core::{
    ClientConfig, EventContext, HttpError, HttpRequest, HttpResponse, HttpTransport, Sleeper,
    TelemetryObserver, UpstreamError,
};

pub const ENDPOINT: &str = "https://analytics.example.test";
pub const API_KEY: &str = "test-api-key-123";

pub fn live_config() -> ClientConfig {
    ClientConfig {
        api_key: Some(API_KEY.to_owned()),
        ..ClientConfig::with_endpoint(ENDPOINT).expect("test endpoint is valid")
    }
}

pub fn envelope_body(source: &str) -> String {
    format!(
        r#"{{"data":[{{"id":"live-1"}}],"generatedAt":"2024-05-01T12:00:00Z","source":"{source}","confidence":0.91}}"#
    )
}

pub fn ok() -> Result<HttpResponse, HttpError> {
    Ok(HttpResponse::ok_json(envelope_body("engine-v2")))
}

pub fn status(code: u16) -> Result<HttpResponse, HttpError> {
    Ok(HttpResponse::new(code, "upstream says no"))
}

pub fn refused() -> Result<HttpResponse, HttpError> {
    Err(HttpError::new("connection refused"))
}

/// Answers from a script, repeating `fallback_reply` once the script runs out.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    fallback_reply: Result<HttpResponse, HttpError>,
    delay: Duration,
    requests: Mutex<Vec<HttpRequest>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    pub fn always(reply: Result<HttpResponse, HttpError>) -> Self {
        Self::scripted(Vec::new(), reply)
    }

    pub fn scripted(
        script: Vec<Result<HttpResponse, HttpError>>,
        then: Result<HttpResponse, HttpError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback_reply: then,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Every reply is delayed by `delay` of real time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl HttpTransport for ScriptedTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests.lock().expect("requests lock").push(request);
        let reply = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| self.fallback_reply.clone());

        Box::pin(async move {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            reply
        })
    }
}

/// Records requested sleeps and returns immediately without moving any clock.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("sleeps lock").clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        self.sleeps.lock().expect("sleeps lock").push(duration);
        Box::pin(tokio::task::yield_now())
    }
}

/// One observed hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub hook: &'static str,
    pub attempt: u32,
    pub request_id: String,
    pub detail: Option<String>,
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    pub fn hooks(&self) -> Vec<&'static str> {
        self.seen().into_iter().map(|observed| observed.hook).collect()
    }

    pub fn seen(&self) -> Vec<Observed> {
        self.seen.lock().expect("observer lock").clone()
    }

    fn record(&self, hook: &'static str, context: &EventContext, detail: Option<String>) {
        self.seen.lock().expect("observer lock").push(Observed {
            hook,
            attempt: context.attempt,
            request_id: context.request_id.clone(),
            detail,
        });
    }
}

impl TelemetryObserver for RecordingObserver {
    fn on_request(&self, context: &EventContext) {
        self.record("request", context, None);
    }

    fn on_response(&self, context: &EventContext, status: u16) {
        self.record("response", context, Some(status.to_string()));
    }

    fn on_retry(&self, context: &EventContext, error: &UpstreamError) {
        self.record("retry", context, Some(error.code().to_owned()));
    }

    fn on_error(&self, context: &EventContext, error: &UpstreamError) {
        self.record("error", context, Some(error.code().to_owned()));
    }

    fn on_rate_limit_delay(&self, context: &EventContext, delay: Duration) {
        self.record("rate_limit_delay", context, Some(delay.as_millis().to_string()));
    }

    fn on_breaker_open(&self, context: &EventContext) {
        self.record("breaker_open", context, None);
    }

    fn on_breaker_half_open(&self, context: &EventContext) {
        self.record("breaker_half_open", context, None);
    }

    fn on_breaker_close(&self, context: &EventContext) {
        self.record("breaker_close", context, None);
    }
}

/// Panics from every hook.
pub struct PanickingObserver;

impl TelemetryObserver for PanickingObserver {
    fn on_request(&self, _context: &EventContext) {
        panic!("observer failure on request");
    }

    fn on_response(&self, _context: &EventContext, _status: u16) {
        panic!("observer failure on response");
    }

    fn on_retry(&self, _context: &EventContext, _error: &UpstreamError) {
        panic!("observer failure on retry");
    }

    fn on_error(&self, _context: &EventContext, _error: &UpstreamError) {
        panic!("observer failure on error");
    }
}
