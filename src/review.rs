//! 可复核结果集
//!
//! 保存 AI 生成的题目或批改结果，每一条都可以单独修改，
//! 汇总分数在读取时重新计算，不单独存储。

use std::future::Future;

use serde::Serialize;
use tracing::debug;

use crate::error::{AppError, AppResult, WizardError};

/// 可复核条目的内容
pub trait ReviewBody {
    /// 满分
    fn max_score(&self) -> f64;
    /// AI 建议的得分
    fn suggested_score(&self) -> f64;
    /// AI 给出的评语
    fn suggested_feedback(&self) -> String;
}

/// 单条可复核条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewableItem<B> {
    pub id: u32,
    pub max_score: f64,
    pub current_score: f64,
    pub feedback: String,
    pub reviewed: bool,
    pub body: B,
}

impl<B: ReviewBody> ReviewableItem<B> {
    fn seeded(id: u32, body: B) -> Self {
        let max_score = body.max_score().max(0.0);
        Self {
            id,
            max_score,
            current_score: clamp_score(body.suggested_score(), max_score),
            feedback: body.suggested_feedback(),
            reviewed: false,
            body,
        }
    }
}

/// 汇总分数
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aggregate {
    pub earned: f64,
    pub total: f64,
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.earned, self.total)
    }
}

/// 可复核结果集
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewableResultSet<B> {
    items: Vec<ReviewableItem<B>>,
    next_id: u32,
}

impl<B> Default for ReviewableResultSet<B> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
        }
    }
}

impl<B: ReviewBody> ReviewableResultSet<B> {
    /// 按后端返回的顺序建立结果集，ID 从 1 开始
    pub fn from_bodies(bodies: impl IntoIterator<Item = B>) -> Self {
        let mut set = Self::default();
        for body in bodies {
            let id = set.next_id;
            set.next_id += 1;
            set.items.push(ReviewableItem::seeded(id, body));
        }
        set
    }

    pub fn items(&self) -> &[ReviewableItem<B>] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&ReviewableItem<B>> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.items.iter().map(|item| item.id).collect()
    }

    /// 当前汇总
    pub fn aggregate(&self) -> Aggregate {
        self.items.iter().fold(
            Aggregate {
                earned: 0.0,
                total: 0.0,
            },
            |acc, item| Aggregate {
                earned: acc.earned + item.current_score,
                total: acc.total + item.max_score,
            },
        )
    }

    /// 修改得分，超出 `[0, max]` 时取最近的边界
    ///
    /// 返回实际写入的分数。
    pub fn set_score(&mut self, id: u32, value: f64) -> AppResult<f64> {
        let item = self.item_mut(id)?;
        item.current_score = clamp_score(value, item.max_score);
        debug!("条目 #{} 得分改为 {}", id, item.current_score);
        Ok(item.current_score)
    }

    /// 替换评语
    pub fn set_feedback(&mut self, id: u32, text: impl Into<String>) -> AppResult<()> {
        self.item_mut(id)?.feedback = text.into();
        Ok(())
    }

    /// 切换“已复核”标记，不影响分数
    pub fn toggle_reviewed(&mut self, id: u32) -> AppResult<bool> {
        let item = self.item_mut(id)?;
        item.reviewed = !item.reviewed;
        Ok(item.reviewed)
    }

    /// 就地修改条目内容（例如编辑题干），分数和满分保持不变
    pub fn edit_body(&mut self, id: u32, edit: impl FnOnce(&mut B)) -> AppResult<()> {
        edit(&mut self.item_mut(id)?.body);
        Ok(())
    }

    /// 删除条目，其它条目的 ID 不变
    pub fn remove_item(&mut self, id: u32) -> AppResult<ReviewableItem<B>> {
        let pos = self.position(id)?;
        Ok(self.items.remove(pos))
    }

    /// 重新生成条目内容
    ///
    /// ID 和位置保持不变；分数、评语和复核标记按新内容重新初始化。
    /// 外部调用失败时条目保持原样。
    pub async fn regenerate<F, Fut, E>(&mut self, id: u32, produce: F) -> AppResult<&ReviewableItem<B>>
    where
        F: FnOnce(&B) -> Fut,
        Fut: Future<Output = Result<B, E>>,
        E: Into<AppError>,
    {
        let pos = self.position(id)?;
        let fresh = produce(&self.items[pos].body).await.map_err(Into::into)?;
        self.items[pos] = ReviewableItem::seeded(id, fresh);
        debug!("条目 #{} 已重新生成", id);
        Ok(&self.items[pos])
    }

    fn position(&self, id: u32) -> AppResult<usize> {
        self.items
            .iter()
            .position(|item| item.id == id)
            .ok_or(AppError::Wizard(WizardError::UnknownItem { id }))
    }

    fn item_mut(&mut self, id: u32) -> AppResult<&mut ReviewableItem<B>> {
        let pos = self.position(id)?;
        Ok(&mut self.items[pos])
    }
}

fn clamp_score(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, max)
}
