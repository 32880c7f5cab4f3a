pub mod catalog;
pub mod correction;
pub mod file;
pub mod job;
pub mod loaders;
pub mod paper;
pub mod subject;

pub use catalog::{CatalogNode, CatalogTree, CATALOG_DEPTH};
pub use correction::{CorrectionItem, CorrectionRequest, FinalizedCorrection, FinalizedMark};
pub use file::FilePayload;
pub use job::{JobSnapshot, JobState, TransferProgress, UploadReceipt};
pub use loaders::load_catalog;
pub use paper::{
    Difficulty, FinalizedPaper, FinalizedQuestion, GeneratedPaper, GeneratedQuestion,
    GenerationParams, GenerationRequest, RegenerateRequest,
};
pub use subject::Subject;
