mod export;

pub use export::{ExportConfig, Settings};
