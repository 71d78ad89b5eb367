pub mod error;
pub mod models;
pub mod sources;
pub mod storage;
pub mod text;
pub mod types;

pub use error::{Error, Result};
pub use models::{InferenceModel, Task};
pub use sources::RawItemSource;
pub use storage::ContentStore;
pub use types::*;
