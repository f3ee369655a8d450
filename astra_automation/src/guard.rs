use crate::astra_api::HostResult;
use crate::error::{AutomationError, AutomationResult};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// What a client does when the host rejects a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Log and continue with the type's default, so long unattended scripts keep going.
    #[default]
    Suppress,
    Raise,
}

impl FromStr for ErrorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suppress" => Ok(ErrorMode::Suppress),
            "raise" => Ok(ErrorMode::Raise),
            other => Err(format!("unknown error mode {other:?} (expected suppress or raise)")),
        }
    }
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMode::Suppress => f.write_str("suppress"),
            ErrorMode::Raise => f.write_str("raise"),
        }
    }
}

/// Applies the error policy to one host outcome. `Ok(None)` means the failure was suppressed.
pub(crate) fn settle<T>(
    mode: ErrorMode,
    operation: &str,
    outcome: HostResult<T>,
) -> AutomationResult<Option<T>> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(err) => match mode {
            ErrorMode::Suppress => {
                warn!(operation, error = %err, "host call failed; continuing");
                Ok(None)
            }
            ErrorMode::Raise => Err(AutomationError::host(operation, err)),
        },
    }
}

pub(crate) fn get_or_default<T: Default>(
    mode: ErrorMode,
    operation: &str,
    outcome: HostResult<T>,
) -> AutomationResult<T> {
    settle(mode, operation, outcome).map(Option::unwrap_or_default)
}

pub(crate) fn executed(
    mode: ErrorMode,
    operation: &str,
    outcome: HostResult<()>,
) -> AutomationResult<bool> {
    settle(mode, operation, outcome).map(|done| done.is_some())
}
