use serde::{Deserialize, Serialize};

/// 上传成功后后端的回执
///
/// 这是上传阶段交给下一阶段的唯一数据。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// 后端保存的文件 ID
    #[serde(default)]
    pub file_id: Option<String>,
    /// 后端抽取出的文本
    #[serde(default, alias = "text")]
    pub extracted_text: Option<String>,
}

/// 字节级上传进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub sent: u64,
    pub total: u64,
}

impl TransferProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.sent.min(self.total) * 100) / self.total) as u8
    }
}

/// 后端长任务的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// 一次轮询拿到的任务快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot<T> {
    pub state: JobState,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub message: Option<String>,
    pub result: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_percent() {
        let p = TransferProgress { sent: 512, total: 2048 };
        assert_eq!(p.percent(), 25);
        let overshoot = TransferProgress { sent: 4096, total: 2048 };
        assert_eq!(overshoot.percent(), 100);
        let empty = TransferProgress { sent: 0, total: 0 };
        assert_eq!(empty.percent(), 0);
    }

    #[test]
    fn test_receipt_accepts_text_alias() {
        let receipt: UploadReceipt =
            serde_json::from_str(r#"{"file_id":"f-1","text":"光合作用"}"#).unwrap();
        assert_eq!(receipt.file_id.as_deref(), Some("f-1"));
        assert_eq!(receipt.extracted_text.as_deref(), Some("光合作用"));
    }
}
