//! JSON output for command results.

pub mod writer;

pub use writer::{render_json, write_output};
