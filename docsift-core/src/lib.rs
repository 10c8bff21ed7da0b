// Docsift Core Library
//
// Extraction pipeline: turns files of heterogeneous formats into canonical,
// language-tagged Documents, and scans directory trees into per-user queues
// that extraction workers drain.

pub mod types;
pub mod error;
pub mod config;
pub mod decoders;
pub mod language;
pub mod metadata;
pub mod extractor;
pub mod queue;
pub mod scanner;
pub mod worker;

// Re-export main types and functions for easy use
pub use types::*;
pub use config::ExtractionConfig;
pub use decoders::{Decoder, DecoderId, MediaType, ParserRegistry, RegistryBuilder};
pub use error::{DecodeError, ExtractError, QueueError, ScanError};
pub use extractor::{Extracted, Extractor, ExtractorBuilder};
pub use language::{normalize, Language, LanguageDetector, RawLanguage};
pub use queue::{DocumentQueue, MemoryQueue};
pub use scanner::{ScanReport, ScanTask, Scanner};
pub use worker::{run_pool, ExtractionWorker, WorkerReport};

// Re-export backends for direct use
#[cfg(feature = "jni-backend")]
pub use decoders::TikaJniDecoder;
