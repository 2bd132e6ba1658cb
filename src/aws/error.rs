//! Classification of AWS SDK failures into [`ProviderError`].
//!
//! Absence is recognised by error code rather than by message text, so every
//! service's "not found" flavour collapses into [`ProviderError::NotFound`].

use std::error::Error as StdError;
use std::fmt::Display;

use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata};

use crate::provider::{ProviderError, ResourceKind};

/// Codes that signal a missing resource across the services in use.
const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchEntity",
    "ResourceNotFoundException",
    "ResourceNotFound",
    "NotFound",
];

/// Error code returned by the SDK call, when there is one.
pub(crate) fn error_code<E: ProvideErrorMetadata>(err: &E) -> Option<&str> {
    err.code()
}

/// Maps an SDK error for `operation` on `name` into a [`ProviderError`].
pub(crate) fn classify<E>(kind: ResourceKind, operation: &str, name: &str, err: &E) -> ProviderError
where
    E: ProvideErrorMetadata + StdError + 'static,
{
    classify_code(
        kind,
        operation,
        name,
        err.code(),
        DisplayErrorContext(err).to_string(),
    )
}

/// Maps an error code and rendered message into a [`ProviderError`].
pub(crate) fn classify_code(
    kind: ResourceKind,
    operation: &str,
    name: &str,
    code: Option<&str>,
    message: String,
) -> ProviderError {
    match code {
        Some(code) if NOT_FOUND_CODES.contains(&code) => ProviderError::not_found(kind, name),
        _ => ProviderError::transport(kind, operation, message),
    }
}

/// Maps a request builder failure into a [`ProviderError`].
pub(crate) fn build_error(kind: ResourceKind, operation: &str, err: impl Display) -> ProviderError {
    ProviderError::transport(kind, operation, format!("invalid request: {err}"))
}

/// Error for a response that lacks a field the caller relies on.
pub(crate) fn missing_field(kind: ResourceKind, operation: &str, field: &str) -> ProviderError {
    ProviderError::transport(kind, operation, format!("response carried no {field}"))
}

/// Converts a not-found failure into `Ok(None)`.
pub(crate) fn absent_as_none<T>(result: Result<T, ProviderError>) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
