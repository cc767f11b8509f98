use opsdeck_core::{ClientConfig, DateRange, RequestContext, Scalar, UpstreamClient, UtcDateTime};

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(args: &FetchArgs, config: ClientConfig) -> Result<CommandOutput, CliError> {
    let context = request_context(args)?;
    let client = UpstreamClient::new(config);

    let envelope = client.fetch(&context).await;
    if envelope.is_fallback() {
        tracing::info!(
            resource = context.resource().as_str(),
            tenant = context.tenant_id(),
            "served fallback data"
        );
    }

    let degraded = envelope.is_fallback();
    Ok(CommandOutput::new(serde_json::to_value(envelope)?, degraded))
}

fn request_context(args: &FetchArgs) -> Result<RequestContext, CliError> {
    let mut context = RequestContext::new(args.tenant.as_str(), args.resource)?;

    for raw in &args.params {
        let (key, value) = raw
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| CliError::InvalidParam(raw.clone()))?;
        context = context.with_param(key.trim(), Scalar::infer(value));
    }

    if let (Some(from), Some(to)) = (&args.from, &args.to) {
        let range = DateRange::new(
            UtcDateTime::parse_day_or_instant(from)?,
            UtcDateTime::parse_day_or_instant(to)?,
        )?;
        context = context.with_date_range(range);
    }

    Ok(context)
}

#[cfg(test)]
mod tests {
    use opsdeck_core::ResourceKind;

    use super::*;

    fn args(params: &[&str]) -> FetchArgs {
        FetchArgs {
            resource: ResourceKind::Recommendation,
            tenant: String::from("acme"),
            params: params.iter().map(|param| (*param).to_owned()).collect(),
            from: None,
            to: None,
        }
    }

    #[test]
    fn params_are_typed() {
        let context = request_context(&args(&["limit=5", "region=eu", "active=true"]))
            .expect("valid context");
        assert_eq!(context.params()["limit"], Scalar::Integer(5));
        assert_eq!(context.params()["region"], Scalar::Text(String::from("eu")));
        assert_eq!(context.params()["active"], Scalar::Bool(true));
    }

    #[test]
    fn param_without_separator_is_rejected() {
        let err = request_context(&args(&["limit"])).expect_err("missing '='");
        assert!(matches!(err, CliError::InvalidParam(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn inverted_window_is_a_validation_error() {
        let mut args = args(&[]);
        args.from = Some(String::from("2024-06-01"));
        args.to = Some(String::from("2024-05-01"));
        let err = request_context(&args).expect_err("inverted");
        assert!(matches!(err, CliError::Validation(_)));
    }

    #[tokio::test]
    async fn mocked_fetch_is_degraded() {
        let output = run(&args(&[]), ClientConfig::mocks_only())
            .await
            .expect("fallback never fails");
        assert!(output.degraded);
        assert_eq!(output.data["source"], "mock");
    }
}
