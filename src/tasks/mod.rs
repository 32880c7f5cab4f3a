//! 任务层
//!
//! - `upload` - 单个文件的传输，字节级进度
//! - `processing` - 后端长任务，模拟或轮询进度
//! - `progress` - 进度模拟策略与阶段文案

pub mod processing;
pub mod progress;
pub mod upload;

pub use processing::{PollingDriver, ProcessingStatus, ProcessingTask, SimulatedDriver};
pub use progress::{FixedStepSimulator, PhaseTable, ProgressSimulator, RandomStepSimulator};
pub use upload::{validate_page_range, FileRule, UploadStatus, UploadTask};
