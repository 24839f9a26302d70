// ============================================================================
// spark-store - Errors
// Construction-time programmer errors; runtime failures stay silent
// ============================================================================

use thiserror::Error;

/// Errors raised when wiring up an observer.
///
/// Runtime access failures are deliberately not errors: a missing keypath
/// reads as the default and an unwritable target ignores the write. Only
/// registrations that can never be valid report back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Computed properties live at concrete keypaths; wildcard and empty
    /// keypaths cannot shadow a store location.
    #[error("computed keypath `{0}` must be a concrete, non-empty keypath")]
    InvalidComputedKeypath(String),

    /// The observer has been destroyed and accepts no new registrations.
    #[error("observer has been destroyed")]
    Destroyed,
}
