//! Read-only status snapshots.

use serde_json::Value;

/// A component that can describe its state as JSON.
///
/// Mounted by the admin server at `/status/{name}`; `path` is whatever
/// follows the mount point, without the leading slash (empty for the root).
/// Returns `None` for paths the component does not know.
pub trait StatusProvider: Send + Sync {
    fn status(&self, path: &str) -> Option<Value>;
}
