//! # Exam Wizard
//!
//! 分步上传向导：上传文档出卷、上传答卷批改
//!
//! ## 架构设计
//!
//! ### ① 数据层（Models）
//! - `models/` - 文件、出题参数、试卷、批改结果、后台任务、级联目录
//! - `session` - 会话上下文，提供 token 和注册状态
//!
//! ### ② 后端能力层（Clients）
//! - `clients/backend` - 后端接口（登录、上传抽取、出题、换题、批改、后台任务）
//! - `clients/http_backend` - 基于 reqwest 的实现
//! - `clients/memory` - 内存实现，本地演示和测试用
//! - `repository` - 定稿结果的持久化
//!
//! ### ③ 任务层（Tasks）
//! - `tasks/upload` - 带校验和字节进度的上传任务
//! - `tasks/processing` - 模拟进度 / 轮询两种后台处理任务
//! - `review` - 可复核、可改分的结果集
//!
//! ### ④ 向导层（Wizard）
//! - `wizard/controller` - 阶段顺序与守卫
//! - `wizard/state` - 生命周期状态机
//! - `wizard/generator` / `wizard/correction` - 出题向导和批改向导
//!
//! ### ⑤ 编排层（App）
//! - `app` - 命令行下依次驱动两个向导
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod repository;
pub mod review;
pub mod session;
pub mod tasks;
pub mod utils;
pub mod wizard;

// 重新导出常用类型
pub use app::App;
pub use clients::{Backend, HttpBackend, MemoryBackend};
pub use config::{Config, WizardTimings};
pub use error::{AppError, AppResult};
pub use events::{EventSink, RecordingSink, TracingSink, WizardEvent};
pub use repository::{InMemoryRepository, Record, Repository};
pub use review::{ReviewableItem, ReviewableResultSet};
pub use wizard::{CorrectionWizard, GeneratorWizard, WizardPhase};
