//! Decoders for a handheld's GBM hierarchical block-based video bitstream
//! and GBS multi-mode ADPCM audio bitstream, plus the A/V sync contract and
//! GBFS container that bind them together at play time.

pub mod audio;
pub mod container;
pub mod errors;
pub mod io;
pub mod playback;
pub mod sync;
pub mod utils;
pub mod video;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, errors::Error>;

pub use errors::Error;
