use thiserror::Error;

/// Errors reported to producers of async handles.
///
/// The bridge itself never fails: it relays whatever result the handle holds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Handle already completed")]
    AlreadyCompleted,
}
