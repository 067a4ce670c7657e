//! Process and cancellation plumbing.
//!
//! - `cancel`: the run-wide cancellation token
//! - `process`: streaming child-process execution with a registry that can
//!   terminate every running child on cancellation

pub mod cancel;
pub mod process;

pub use cancel::CancellationToken;
pub use process::{ChildRegistry, ProcessContext, StreamExit, StreamOutput, run_streaming};
