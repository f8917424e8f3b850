//! Parsing of downloader output: streaming progress lines, the `-F` format
//! table, and the `--dump-single-json` metadata document.

mod classifier;
mod events;
mod formats;
mod metadata;
pub mod numeric;
mod patterns;
mod stream;

pub use classifier::*;
pub use events::*;
pub use formats::*;
pub use metadata::*;
pub use patterns::*;
pub use stream::*;
