//! v8forge-lib: pinned acquisition and static-library builds of V8.
//!
//! The pipeline has two stages:
//! - `source`: fetch a pinned V8 revision plus its gclient dependencies into
//!   a consistent, marker-validated tree
//! - `build`: merge base GN args with target overrides, run `gn gen` and
//!   `ninja`, and install a normalized layout of headers and archives

pub mod args;
pub mod build;
pub mod consts;
pub mod lock;
pub mod platform;
pub mod process;
pub mod source;
pub mod target;
pub mod toolchain;
pub mod util;
