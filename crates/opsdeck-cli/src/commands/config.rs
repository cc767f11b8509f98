use opsdeck_core::ClientConfig;
use serde::Serialize;

use crate::error::CliError;

use super::CommandOutput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigView<'a> {
    endpoint: Option<&'a str>,
    api_key: Option<&'static str>,
    max_retries: u32,
    timeout_ms: u128,
    max_concurrent: usize,
    rate_limit_rps: u32,
    gate_timeout_ms: u128,
    breaker: BreakerView,
    use_mocks: bool,
    keep_alive: bool,
    live: bool,
    features: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BreakerView {
    failure_threshold: u32,
    cooldown_ms: u128,
    half_open_max: u32,
}

pub fn run(config: &ClientConfig) -> Result<CommandOutput, CliError> {
    let view = ConfigView {
        endpoint: config.endpoint.as_deref(),
        api_key: config.api_key.as_ref().map(|_| "<redacted>"),
        max_retries: config.retry.max_attempts,
        timeout_ms: config.retry.timeout_per_attempt.as_millis(),
        max_concurrent: config.max_concurrent,
        rate_limit_rps: config.rate_limit_rps,
        gate_timeout_ms: config.gate_timeout.as_millis(),
        breaker: BreakerView {
            failure_threshold: config.breaker.failure_threshold,
            cooldown_ms: config.breaker.cooldown.as_millis(),
            half_open_max: config.breaker.half_open_max,
        },
        use_mocks: config.use_mocks,
        keep_alive: config.keep_alive,
        live: config.is_live(),
        features: config.enabled_features(),
    };
    Ok(CommandOutput::new(serde_json::to_value(view)?, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_redacted() {
        let config = ClientConfig {
            api_key: Some(String::from("super-secret")),
            ..ClientConfig::default()
        };

        let output = run(&config).expect("serializable");
        assert_eq!(output.data["apiKey"], "<redacted>");
        assert!(!output.data.to_string().contains("super-secret"));
        assert_eq!(output.data["live"], false);
    }
}
