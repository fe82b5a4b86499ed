//! Rewrites a QuickTime/MP4 container so its `moov` metadata index precedes
//! its `mdat` media payload, so a streaming client can read the index
//! before the media bytes arrive.
//!
//! The two entry points are [`flatten_to_new_file`] and [`flatten_in_place`];
//! the latter reuses a pre-reserved `free` atom ahead of `moov` instead of
//! rewriting the whole file.
#![warn(missing_docs)]

pub mod atom;
mod driver;
mod editlist;
mod envelope;
mod error;
mod ioutil;
mod offsets;

pub use driver::{flatten_in_place, flatten_to_new_file};
pub use error::{Error, ErrorKind, Result};
