use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::file::FilePayload;
use crate::review::ReviewBody;

/// 批改请求
#[derive(Debug, Clone)]
pub struct CorrectionRequest {
    pub paper_id: String,
    /// 学生答卷扫描件
    pub answers: FilePayload,
    /// 参考答案上传后后端返回的文件 ID
    pub answer_key_id: String,
}

/// 后端返回的单题批改结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionItem {
    pub question_no: u32,
    pub ai_mark: f64,
    pub max_mark: f64,
    #[serde(default)]
    pub ai_feedback: String,
    #[serde(default)]
    pub ocr_text: String,
}

impl ReviewBody for CorrectionItem {
    fn max_score(&self) -> f64 {
        self.max_mark
    }

    fn suggested_score(&self) -> f64 {
        self.ai_mark
    }

    fn suggested_feedback(&self) -> String {
        self.ai_feedback.clone()
    }
}

/// 定稿后的批改结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedCorrection {
    pub paper_id: String,
    pub student_file: String,
    pub marks: Vec<FinalizedMark>,
    pub earned: f64,
    pub total: f64,
    pub finalized_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedMark {
    pub question_no: u32,
    pub awarded: f64,
    pub max_mark: f64,
    pub ai_mark: f64,
    pub feedback: String,
    pub reviewed: bool,
}
