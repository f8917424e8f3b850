//! Construction of downloader argument vectors.

mod builder;
mod flags;

pub use builder::*;
pub use flags::*;
