/*!
Error types for the rotation engine.
*/

use thiserror::Error;

/// Result type used throughout the rotation engine.
pub type Result<T> = std::result::Result<T, RotateError>;

/// Errors that can occur during a rotation run.
///
/// No error is retried or swallowed: the first failure at any phase aborts
/// the whole run and propagates to the invoking trigger.
#[derive(Error, Debug)]
pub enum RotateError {
    /// The retention declaration tag is absent from an instance that reached
    /// classification. Enumeration filters on the tag key, so hitting this
    /// means the provider broke its contract.
    #[error("instance {instance_id} carries no retention declaration tag")]
    MissingDeclaration { instance_id: String },

    /// Volume lookup, the snapshot request, or labeling failed
    #[error("snapshot creation failed for instance {instance_id}: {reason}")]
    CreateFailed { instance_id: String, reason: String },

    /// Retrieval of an instance's managed snapshots failed
    #[error("snapshot inventory failed for instance {instance_id}: {reason}")]
    InventoryFailed { instance_id: String, reason: String },

    /// Deletion of a surplus snapshot failed
    #[error("deletion of snapshot {snapshot_id} failed: {reason}")]
    DeleteFailed { snapshot_id: String, reason: String },

    /// Any other provider API failure
    #[error("provider error: {0}")]
    Provider(String),

    /// Invalid engine configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RotateError {
    /// Create a new missing-declaration error
    pub fn missing_declaration<S: Into<String>>(instance_id: S) -> Self {
        Self::MissingDeclaration {
            instance_id: instance_id.into(),
        }
    }

    /// Create a new creation failure for one instance
    pub fn create_failed<S, R>(instance_id: S, reason: R) -> Self
    where
        S: Into<String>,
        R: Into<String>,
    {
        Self::CreateFailed {
            instance_id: instance_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new inventory failure for one instance
    pub fn inventory_failed<S, R>(instance_id: S, reason: R) -> Self
    where
        S: Into<String>,
        R: Into<String>,
    {
        Self::InventoryFailed {
            instance_id: instance_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new deletion failure for one snapshot
    pub fn delete_failed<S, R>(snapshot_id: S, reason: R) -> Self
    where
        S: Into<String>,
        R: Into<String>,
    {
        Self::DeleteFailed {
            snapshot_id: snapshot_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new generic provider error
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
