pub(crate) mod cronjob_trigger;
pub(crate) mod function;

use anyhow::Error;
use cronjob_trigger_provider::Error as ProviderError;

/// Malformed objects and foreign scheduled jobs stay broken until someone
/// edits them, and that edit arrives as a fresh event.
fn is_permanent(error: &Error) -> bool {
    match error.downcast_ref::<ProviderError>() {
        Some(
            ProviderError::Conflict { .. }
            | ProviderError::FunctionNotFound { .. }
            | ProviderError::InvalidSchedule { .. }
            | ProviderError::InvalidTimeout { .. }
            | ProviderError::JobNameTooLong { .. }
            | ProviderError::Payload(_),
        ) => true,
        // rejected by the API server's validation
        Some(ProviderError::Kube(::kube::Error::Api(response))) => {
            response.code == 400 || response.code == 422
        }
        _ => false,
    }
}
