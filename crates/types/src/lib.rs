//! CRD schema and in-memory data model shared by the group-sync controller.
//!
//! Schema-only (no I/O, no adapter logic), so it can be depended on
//! by anything that needs to read or admission-validate a [`GroupSync`]
//! object without pulling in the controller's provider clients.

mod groupsync;
mod objectref;
mod platform_group;
mod provider;
mod remote_group;

pub use groupsync::*;
pub use objectref::*;
pub use platform_group::*;
pub use provider::*;
pub use remote_group::*;
