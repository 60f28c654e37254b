/// `reason` for `ReconcileSuccess=True` after a cycle with no provider errors.
pub const REASON_SYNCED: &str = "Synced";

/// `message` paired with [`REASON_SYNCED`].
pub const MESSAGE_SYNCED: &str = "All providers synced successfully.";

/// `reason` for `ReconcileError=True` when spec validation rejected the
/// `GroupSync` before any provider ran.
pub const REASON_CONFIG_INVALID: &str = "ConfigInvalid";

/// `reason` for `ReconcileError=True` when one or more providers failed
/// during the cycle.
pub const REASON_SYNC_FAILED: &str = "SyncFailed";
