mod storage;

pub use storage::AttachmentStorage;
