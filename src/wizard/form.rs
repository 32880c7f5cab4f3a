//! 出题参数表单
//!
//! 教材体系、年级、科目、试卷类型走级联选择；题型是必选的多选项；
//! 主题关键词可以留空，源文档上传后会用抽取的文本补上。

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::ValidationError;
use crate::models::catalog::CATALOG_DEPTH;
use crate::models::{CatalogTree, Difficulty, GenerationParams, Subject};
use crate::wizard::select_chain::{DependentSelectChain, OptionSource};

/// 可选题型
pub const QUESTION_TYPES: &[&str] = &["选择题", "填空题", "判断题", "简答题", "计算题"];

/// 关键词最多保留几个
const MAX_TOPICS: usize = 8;

/// 级联各层按位置对应的出题参数字段，层名以目录文件为准
const PARAM_FIELDS: [&str; CATALOG_DEPTH] = ["board", "class", "subject", "paper_type"];

/// 出题参数表单
#[derive(Debug, Clone)]
pub struct GenerationForm {
    chain: DependentSelectChain,
    topics: Vec<String>,
    question_types: BTreeSet<String>,
    question_count: u32,
    difficulty: Option<Difficulty>,
}

impl GenerationForm {
    pub fn new(keys: Vec<String>, source: Arc<dyn OptionSource>) -> Self {
        Self {
            chain: DependentSelectChain::new(keys, source),
            topics: Vec::new(),
            question_types: BTreeSet::new(),
            question_count: 10,
            difficulty: None,
        }
    }

    pub fn from_catalog(catalog: Arc<CatalogTree>) -> Self {
        let keys = catalog.levels.clone();
        Self::new(keys, catalog)
    }

    pub fn chain(&self) -> &DependentSelectChain {
        &self.chain
    }

    /// 选择级联中的某一层，例如 `select("subject", "数学")`
    pub fn select(&mut self, key: &str, value: &str) -> Result<(), ValidationError> {
        self.chain.select_key(key, value)
    }

    pub fn options(&self, key: &str) -> Vec<String> {
        self.chain
            .level_of(key)
            .map(|level| self.chain.options(level))
            .unwrap_or_default()
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn set_topics<I, T>(&mut self, topics: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.topics = topics
            .into_iter()
            .map(Into::into)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }

    /// 关键词为空时，从抽取的文本里取
    ///
    /// 返回是否真的填充了。
    pub fn fill_topics_from(&mut self, extracted: &str) -> bool {
        if !self.topics.is_empty() {
            return false;
        }
        let mut seen = BTreeSet::new();
        let topics: Vec<String> = extracted
            .split(|c: char| c.is_whitespace() || "，,、；;。".contains(c))
            .map(str::trim)
            .filter(|t| t.chars().count() >= 2)
            .filter(|t| seen.insert(t.to_string()))
            .take(MAX_TOPICS)
            .map(str::to_string)
            .collect();
        self.topics = topics;
        !self.topics.is_empty()
    }

    pub fn question_types(&self) -> &BTreeSet<String> {
        &self.question_types
    }

    /// 勾选或取消一个题型，返回勾选后的状态
    pub fn toggle_question_type(&mut self, kind: &str) -> Result<bool, ValidationError> {
        if !QUESTION_TYPES.contains(&kind) {
            return Err(ValidationError::UnknownOption {
                level: "question_types".to_string(),
                value: kind.to_string(),
            });
        }
        if self.question_types.remove(kind) {
            Ok(false)
        } else {
            self.question_types.insert(kind.to_string());
            Ok(true)
        }
    }

    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    pub fn set_question_count(&mut self, count: u32) {
        self.question_count = count;
    }

    pub fn difficulty(&self) -> Option<Difficulty> {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = Some(difficulty);
    }

    /// 第一个不满足的条件
    pub fn check(&self) -> Result<(), ValidationError> {
        if let Some(key) = self.chain.first_missing() {
            return Err(ValidationError::MissingField(key.to_string()));
        }
        // 层数不够时缺的参数也算未填
        if let Some(field) = PARAM_FIELDS
            .iter()
            .enumerate()
            .find(|(level, _)| self.chain.selected(*level).is_none())
            .map(|(_, field)| field)
        {
            return Err(ValidationError::MissingField(field.to_string()));
        }
        if self.difficulty.is_none() {
            return Err(ValidationError::MissingField("difficulty".to_string()));
        }
        if self.question_count == 0 {
            return Err(ValidationError::MissingField("question_count".to_string()));
        }
        if self.question_types.is_empty() {
            return Err(ValidationError::EmptySelection("question_types".to_string()));
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.check().is_ok()
    }

    pub fn to_params(&self) -> Result<GenerationParams, ValidationError> {
        self.check()?;
        let field = |level: usize| self.chain.selected(level).unwrap_or_default().to_string();
        let subject = field(2);

        Ok(GenerationParams {
            board: field(0),
            class: field(1),
            subject_code: Subject::find(&subject),
            subject,
            paper_type: field(3),
            topics: self.topics.clone(),
            question_types: self.question_types.clone(),
            question_count: self.question_count,
            difficulty: self.difficulty.unwrap_or_default(),
        })
    }

    pub fn reset(&mut self) {
        self.chain.reset();
        self.topics.clear();
        self.question_types.clear();
        self.question_count = 10;
        self.difficulty = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::sample_catalog;

    fn filled_form() -> GenerationForm {
        let mut form = GenerationForm::from_catalog(Arc::new(sample_catalog()));
        form.select("board", "人教版").unwrap();
        form.select("class", "八年级").unwrap();
        form.select("subject", "数学").unwrap();
        form.select("paper_type", "单元测试").unwrap();
        form.set_difficulty(Difficulty::Hard);
        form.toggle_question_type("选择题").unwrap();
        form
    }

    #[test]
    fn test_complete_form_builds_params() {
        let params = filled_form().to_params().unwrap();
        assert_eq!(params.board, "人教版");
        assert_eq!(params.subject_code, Some(Subject::Math));
        assert_eq!(params.difficulty, Difficulty::Hard);
        assert!(params.question_types.contains("选择题"));
    }

    #[test]
    fn test_params_follow_level_position_not_name() {
        let catalog = CatalogTree {
            levels: ["edition", "grade", "course", "exam"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            nodes: sample_catalog().nodes,
        };
        let mut form = GenerationForm::from_catalog(Arc::new(catalog));
        form.select("edition", "人教版").unwrap();
        form.select("grade", "八年级").unwrap();
        form.select("course", "数学").unwrap();
        form.select("exam", "期中").unwrap();
        form.set_difficulty(Difficulty::Easy);
        form.toggle_question_type("填空题").unwrap();

        assert!(form.is_complete());
        let params = form.to_params().unwrap();
        assert_eq!(params.board, "人教版");
        assert_eq!(params.class, "八年级");
        assert_eq!(params.subject, "数学");
        assert_eq!(params.paper_type, "期中");
    }

    #[test]
    fn test_shallow_chain_is_never_complete() {
        let catalog = CatalogTree {
            levels: vec!["board".to_string(), "class".to_string()],
            nodes: sample_catalog().nodes,
        };
        let mut form = GenerationForm::from_catalog(Arc::new(catalog));
        form.select("board", "人教版").unwrap();
        form.select("class", "八年级").unwrap();
        form.set_difficulty(Difficulty::Easy);
        form.toggle_question_type("填空题").unwrap();

        assert_eq!(
            form.check(),
            Err(ValidationError::MissingField("subject".to_string()))
        );
        assert!(form.to_params().is_err());
    }

    #[test]
    fn test_missing_field_reported_first() {
        let mut form = filled_form();
        form.select("class", "九年级").unwrap();
        assert_eq!(
            form.check(),
            Err(ValidationError::MissingField("subject".to_string()))
        );
        assert!(!form.is_complete());
    }

    #[test]
    fn test_multi_select_needs_one_value() {
        let mut form = filled_form();
        assert!(!form.toggle_question_type("选择题").unwrap());
        assert_eq!(
            form.check(),
            Err(ValidationError::EmptySelection("question_types".to_string()))
        );
        assert!(form.toggle_question_type("作文").is_err());
    }

    #[test]
    fn test_topics_filled_only_when_empty() {
        let mut form = filled_form();
        assert!(form.fill_topics_from("一次函数，一次函数 图像、斜率 y"));
        assert_eq!(form.topics(), ["一次函数", "图像", "斜率"]);

        form.set_topics(["勾股定理"]);
        assert!(!form.fill_topics_from("三角形"));
        assert_eq!(form.topics(), ["勾股定理"]);
    }
}
