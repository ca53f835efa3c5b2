//! Shared data model and process-adapter contract for the memory inspection core.
//!
//! This crate holds the pieces every other crate in the workspace depends
//! on: `Region` and `Snapshot` (spec data model), the `ProcessMemoryAdapter`
//! trait the search engine and freezer consume, the cooperative
//! cancellation registry, and the cross-cutting `CoreError` taxonomy.
//!
//! Nothing in this crate talks to an actual operating system. The adapter
//! is a trait; a real Mach-based implementation lives outside this
//! workspace and is plugged in by the caller.

mod adapter;
mod cancel;
mod error;
mod pause;
mod region;
mod snapshot;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use adapter::{Protection, ProcessMemoryAdapter, ThreadRegisterAccess, ThreadRegisters};
pub use cancel::{CancelRegistry, CancelToken};
pub use error::CoreError;
pub use pause::PauseGuard;
pub use region::Region;
pub use snapshot::Snapshot;
