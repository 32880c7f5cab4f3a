use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::file::FilePayload;
use crate::models::subject::Subject;
use crate::review::ReviewBody;

/// 难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "简单" => Some(Difficulty::Easy),
            "medium" | "中等" => Some(Difficulty::Medium),
            "hard" | "困难" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// 出题参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub board: String,
    pub class: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_code: Option<Subject>,
    pub paper_type: String,
    /// 主题关键词
    pub topics: Vec<String>,
    /// 选中的题型
    pub question_types: BTreeSet<String>,
    pub question_count: u32,
    pub difficulty: Difficulty,
}

/// 出题请求
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub source: FilePayload,
    /// 上传阶段从源文档里抽取的文本
    pub source_text: Option<String>,
    pub params: GenerationParams,
}

/// 重新生成单道题的请求
#[derive(Debug, Clone, Serialize)]
pub struct RegenerateRequest {
    pub paper_title: String,
    pub question: GeneratedQuestion,
    pub params: GenerationParams,
}

/// 后端生成的试卷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPaper {
    pub title: String,
    pub questions: Vec<GeneratedQuestion>,
}

/// 后端生成的单道题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub text: String,
    pub marks: f64,
    #[serde(default)]
    pub model_answer: String,
}

impl ReviewBody for GeneratedQuestion {
    fn max_score(&self) -> f64 {
        self.marks
    }

    fn suggested_score(&self) -> f64 {
        self.marks
    }

    fn suggested_feedback(&self) -> String {
        String::new()
    }
}

/// 定稿后的试卷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedPaper {
    pub title: String,
    pub params: GenerationParams,
    pub questions: Vec<FinalizedQuestion>,
    pub total_marks: f64,
    pub finalized_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedQuestion {
    pub number: u32,
    pub text: String,
    pub marks: f64,
    pub model_answer: String,
    /// 老师的备注
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}
