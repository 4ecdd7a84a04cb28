// pixbatch/src/processors/mod.rs
mod batch;
mod classifier;
mod compressor;
mod loader;
mod metadata;
mod raw;
mod resizer;

pub use batch::{BatchHandle, BatchProcessor, BatchProgress, BatchState, BatchSummary, CompressionSummary};
pub use classifier::{classify, classify_path, is_supported_input, SUPPORTED_INPUT_EXTENSIONS};
pub use compressor::Compressor;
pub use loader::{DecodeStrategy, Loader};
pub use metadata::{MetadataProcessor, Orientation};
pub use raw::{develop, RawDecoder, SensorData};
pub use resizer::Resizer;

pub mod prelude {
    pub use super::{BatchProcessor, Compressor, Loader, MetadataProcessor, Resizer};
}
