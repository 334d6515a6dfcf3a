//! Video record store.
//!
//! Records associate a store-assigned id with the uploaded filename and the
//! latest finished artifact. Two stores are provided: an in-memory one for
//! tests and ephemeral runs, and a JSON file store for everything else.

pub mod error;
pub mod file;
pub mod memory;
pub mod repository;

pub use error::{RecordError, RecordResult};
pub use file::JsonFileVideoRepository;
pub use memory::MemoryVideoRepository;
pub use repository::VideoRepository;
