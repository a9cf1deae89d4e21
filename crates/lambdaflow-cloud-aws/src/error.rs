//! Classification of SDK errors into provisioning errors

use aws_sdk_lambda::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use lambdaflow_cloud::ProvisionError;

const NOT_FOUND_CODES: &[&str] = &["ResourceNotFoundException", "NoSuchEntity"];

/// Lambda reports the role propagation race with this message
const PROPAGATION_MARKER: &str = "cannot be assumed by Lambda";

pub(crate) fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> ProvisionError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = err.message().map(str::to_string);
    let detail = DisplayErrorContext(&err).to_string();
    tracing::debug!("{} failed: {}", operation, detail);

    classify_parts(operation, code.as_deref(), message.as_deref(), detail)
}

pub(crate) fn classify_parts(
    operation: &'static str,
    code: Option<&str>,
    message: Option<&str>,
    detail: String,
) -> ProvisionError {
    if code.is_some_and(|c| NOT_FOUND_CODES.contains(&c)) {
        return ProvisionError::NotFound(message.unwrap_or(operation).to_string());
    }
    if let Some(message) = message.filter(|m| m.contains(PROPAGATION_MARKER)) {
        return ProvisionError::RolePropagation(message.to_string());
    }
    ProvisionError::remote(operation, detail)
}
