//! 向导事件
//!
//! 界面需要看到的每一次状态变化（进度条、阶段切换、错误横幅）都以事件发出，
//! 由调用方注入的 [`EventSink`] 接收。

use std::sync::Mutex;

use tracing::{info, warn};

use crate::tasks::{ProcessingStatus, UploadStatus};

/// 向导事件
#[derive(Debug, Clone, PartialEq)]
pub enum WizardEvent {
    /// 阶段切换
    StageChanged {
        wizard: &'static str,
        from: &'static str,
        to: &'static str,
    },
    /// 上传进度
    UploadProgress {
        task: &'static str,
        percent: u8,
        status: UploadStatus,
    },
    /// 本地校验失败（显示在控件旁边）
    ValidationFailed { task: &'static str, message: String },
    /// 后台处理进度
    ProcessingProgress {
        task: &'static str,
        percent: u8,
        phase: &'static str,
        status: ProcessingStatus,
    },
    /// 需要横幅提示的错误
    Notice { task: &'static str, message: String },
    /// 向导完成
    Finalized { wizard: &'static str },
}

/// 事件接收端
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WizardEvent);
}

/// 只写日志的接收端
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: WizardEvent) {
        match event {
            WizardEvent::StageChanged { wizard, from, to } => {
                info!("[{}] ➡️ {} → {}", wizard, from, to);
            }
            WizardEvent::UploadProgress {
                task,
                percent,
                status,
            } => {
                info!("[{}] 📤 上传进度 {}% ({:?})", task, percent, status);
            }
            WizardEvent::ValidationFailed { task, message } => {
                warn!("[{}] ⚠️ {}", task, message);
            }
            WizardEvent::ProcessingProgress {
                task,
                percent,
                phase,
                status,
            } => {
                info!("[{}] ⏳ {}% {} ({:?})", task, percent, phase, status);
            }
            WizardEvent::Notice { task, message } => {
                warn!("[{}] ❌ {}", task, message);
            }
            WizardEvent::Finalized { wizard } => {
                info!("[{}] ✅ 向导已完成", wizard);
            }
        }
    }
}

/// 把事件记录下来，测试和调试用
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<WizardEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WizardEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// 某个上传任务依次显示过的进度
    pub fn upload_percents(&self, task: &str) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WizardEvent::UploadProgress { task: t, percent, .. } if t == task => Some(percent),
                _ => None,
            })
            .collect()
    }

    /// 某个处理任务依次显示过的进度
    pub fn processing_percents(&self, task: &str) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WizardEvent::ProcessingProgress { task: t, percent, .. } if t == task => {
                    Some(percent)
                }
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WizardEvent::Notice { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: WizardEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
