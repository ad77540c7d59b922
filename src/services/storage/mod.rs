pub mod path;
pub mod store;

pub use path::{PathError, PublishPath};
pub use store::{StorageError, UploadBatch, UploadStore};
