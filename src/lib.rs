//! Workspace facade crate.
//!
//! Re-exports the decode API from `core-decode` and logging setup from
//! `core-runtime`, so host applications can depend on `pcmtap` alone and
//! select backends through its features.
//!
//! ```rust,no_run
//! use pcmtap::logging::{init_logging, LoggingConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! init_logging(LoggingConfig::default())?;
//!
//! let stream = pcmtap::audio_open("/music/tone.wav")?;
//! let total: usize = stream.map(|block| block.map(|b| b.len())).sum::<pcmtap::Result<usize>>()?;
//! println!("{} bytes of PCM", total);
//! # Ok(())
//! # }
//! ```

pub use core_decode::*;
pub use core_runtime::logging;
