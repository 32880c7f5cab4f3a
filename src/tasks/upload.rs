//! 上传任务
//!
//! 一次文件传输：本地校验 → 传输（字节进度）→ 成功 / 失败。

use std::future::Future;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ApiError, AppError, AppResult, ValidationError, WizardError};
use crate::events::{EventSink, WizardEvent};
use crate::models::{FilePayload, TransferProgress, UploadReceipt};

/// 上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadStatus {
    Idle,
    InProgress,
    Succeeded,
    Failed,
}

/// 上传前的文件校验规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRule {
    /// 允许的 MIME 类型，`image/*` 表示所有图片；为空表示不限
    allowed: Vec<&'static str>,
    max_bytes: Option<u64>,
}

impl FileRule {
    pub fn any() -> Self {
        Self {
            allowed: Vec::new(),
            max_bytes: None,
        }
    }

    /// 只接受 PDF（参考答案）
    pub fn pdf_only() -> Self {
        Self {
            allowed: vec!["application/pdf"],
            max_bytes: None,
        }
    }

    /// 图片或 PDF（学生答卷）
    pub fn image_or_pdf() -> Self {
        Self {
            allowed: vec!["application/pdf", "image/*"],
            max_bytes: None,
        }
    }

    pub fn with_max_bytes(mut self, limit: u64) -> Self {
        self.max_bytes = Some(limit);
        self
    }

    pub fn accepts_mime(&self, mime: &str) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        let mime = mime.trim().to_ascii_lowercase();
        self.allowed.iter().any(|pattern| match pattern.strip_suffix("/*") {
            Some(family) => mime
                .split_once('/')
                .map(|(f, _)| f == family)
                .unwrap_or(false),
            None => mime == *pattern,
        })
    }

    pub fn check(&self, file: &FilePayload) -> Result<(), ValidationError> {
        if file.is_empty() {
            return Err(ValidationError::EmptyFile {
                name: file.name.clone(),
            });
        }
        if !self.accepts_mime(&file.mime) {
            return Err(ValidationError::UnsupportedType {
                name: file.name.clone(),
                mime: file.mime.clone(),
                allowed: self.allowed.join(", "),
            });
        }
        if let Some(limit) = self.max_bytes {
            if file.size() > limit {
                return Err(ValidationError::FileTooLarge {
                    name: file.name.clone(),
                    size: file.size(),
                    limit,
                });
            }
        }
        Ok(())
    }
}

/// 校验页码范围，例如 `1-3,5`
///
/// 空串视为“全部页”。
pub fn validate_page_range(range: &str) -> Result<Option<String>, ValidationError> {
    let trimmed = range.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    let pattern = Regex::new(r"^\d+(-\d+)?(,\d+(-\d+)?)*$")
        .map_err(|_| ValidationError::InvalidPageRange(trimmed.to_string()))?;
    if !pattern.is_match(&compact) {
        return Err(ValidationError::InvalidPageRange(trimmed.to_string()));
    }

    for part in compact.split(',') {
        let bounds: Vec<u32> = part.split('-').filter_map(|n| n.parse().ok()).collect();
        let valid = match bounds.as_slice() {
            [single] => *single >= 1,
            [start, end] => *start >= 1 && start <= end,
            _ => false,
        };
        if !valid {
            return Err(ValidationError::InvalidPageRange(trimmed.to_string()));
        }
    }

    Ok(Some(compact))
}

/// 上传任务
pub struct UploadTask {
    label: &'static str,
    rule: FileRule,
    status: UploadStatus,
    progress: u8,
    file: Option<FilePayload>,
    receipt: Option<UploadReceipt>,
    error: Option<String>,
    validation_error: Option<ValidationError>,
    sink: Arc<dyn EventSink>,
}

impl UploadTask {
    pub fn new(label: &'static str, rule: FileRule, sink: Arc<dyn EventSink>) -> Self {
        Self {
            label,
            rule,
            status: UploadStatus::Idle,
            progress: 0,
            file: None,
            receipt: None,
            error: None,
            validation_error: None,
            sink,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// 最近一次提交的文件（重试时复用）
    pub fn file(&self) -> Option<&FilePayload> {
        self.file.as_ref()
    }

    pub fn receipt(&self) -> Option<&UploadReceipt> {
        self.receipt.as_ref()
    }

    /// 传输失败时给用户看的提示
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 本地校验失败的原因
    pub fn validation_error(&self) -> Option<&ValidationError> {
        self.validation_error.as_ref()
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == UploadStatus::Succeeded
    }

    /// 本地校验，不通过时记录在任务上，状态不变
    pub fn validate(&mut self, file: &FilePayload) -> Result<(), ValidationError> {
        if let Err(e) = self.rule.check(file) {
            warn!("[{}] ⚠️ 文件校验未通过: {}", self.label, e);
            self.validation_error = Some(e.clone());
            self.sink.emit(WizardEvent::ValidationFailed {
                task: self.label,
                message: e.to_string(),
            });
            return Err(e);
        }
        self.validation_error = None;
        Ok(())
    }

    /// 开始上传
    ///
    /// `send` 负责真正的传输，它通过给定的通道汇报已发送字节数。
    /// 校验不通过时不会调用 `send`，状态保持 `Idle`。
    pub async fn start<F, Fut>(
        &mut self,
        file: FilePayload,
        cancel: &CancellationToken,
        send: F,
    ) -> AppResult<UploadReceipt>
    where
        F: FnOnce(FilePayload, mpsc::UnboundedSender<TransferProgress>) -> Fut,
        Fut: Future<Output = Result<UploadReceipt, ApiError>>,
    {
        self.validate(&file)?;

        info!(
            "[{}] 📤 开始上传 {} ({} 字节, {})",
            self.label,
            file.name,
            file.size(),
            file.mime
        );

        self.error = None;
        self.receipt = None;
        self.file = Some(file.clone());
        self.status = UploadStatus::InProgress;
        self.progress = 0;
        self.emit_progress();

        let (tx, mut rx) = mpsc::unbounded_channel::<TransferProgress>();
        let request = send(file, tx);
        tokio::pin!(request);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                Some(update) = rx.recv() => self.record_progress(update),
                result = &mut request => break Some(result),
            }
        };

        match outcome {
            None => {
                info!("[{}] 上传已取消", self.label);
                self.reset();
                Err(WizardError::Cancelled.into())
            }
            Some(Ok(receipt)) => {
                while let Ok(update) = rx.try_recv() {
                    self.record_progress(update);
                }
                self.status = UploadStatus::Succeeded;
                self.progress = 100;
                self.receipt = Some(receipt.clone());
                self.emit_progress();
                info!("[{}] ✓ 上传成功", self.label);
                Ok(receipt)
            }
            Some(Err(e)) => {
                let message = e.user_message();
                warn!("[{}] ❌ 上传失败: {}", self.label, e);
                self.status = UploadStatus::Failed;
                self.error = Some(message.clone());
                self.emit_progress();
                self.sink.emit(WizardEvent::Notice {
                    task: self.label,
                    message,
                });
                Err(AppError::Api(e))
            }
        }
    }

    /// 回到初始状态
    pub fn reset(&mut self) {
        self.status = UploadStatus::Idle;
        self.progress = 0;
        self.file = None;
        self.receipt = None;
        self.error = None;
        self.validation_error = None;
        self.emit_progress();
    }

    /// 记录一次字节进度
    ///
    /// 乱序到达的较小值不会让进度倒退；收到响应前最多显示 99。
    fn record_progress(&mut self, update: TransferProgress) {
        if self.status != UploadStatus::InProgress {
            return;
        }
        let next = update.percent().min(99).max(self.progress);
        if next != self.progress {
            debug!("[{}] 已发送 {}/{} 字节", self.label, update.sent, update.total);
            self.progress = next;
            self.emit_progress();
        }
    }

    fn emit_progress(&self) {
        self.sink.emit(WizardEvent::UploadProgress {
            task: self.label,
            percent: self.progress,
            status: self.status,
        });
    }
}
