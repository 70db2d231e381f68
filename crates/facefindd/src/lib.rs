//! facefindd — line-protocol face search service.
//!
//! Reads `<image_path>,<cache_directory>` jobs from a stream, runs them
//! through a [`facefind_core::FaceFinder`], saves one crop per detected face
//! and answers each job with a single JSON array line.

pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod job;

pub use config::Config;
pub use dispatcher::{Dispatcher, Termination};
pub use encoder::ResponseEncoder;
