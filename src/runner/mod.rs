//! Process execution: single downloads, the concurrency pool, and
//! single-shot metadata and format queries.

mod download;
mod oneshot;
mod pool;
mod process;
mod state;

pub use download::*;
pub use oneshot::*;
pub use pool::*;
pub use process::*;
pub use state::*;
