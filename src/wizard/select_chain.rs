//! 级联选择
//!
//! 若干层下拉框，每层的选项只由上面几层的选择决定。
//! 改动某一层时，它下面的所有层都会被清空。

use std::sync::Arc;

use tracing::debug;

use crate::error::ValidationError;

/// 各层选项的来源
pub trait OptionSource: Send + Sync {
    /// `path` 是前 `level` 层已选的值
    fn options(&self, level: usize, path: &[String]) -> Vec<String>;
}

/// 级联选择链
#[derive(Clone)]
pub struct DependentSelectChain {
    keys: Vec<String>,
    selections: Vec<Option<String>>,
    source: Arc<dyn OptionSource>,
}

impl std::fmt::Debug for DependentSelectChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependentSelectChain")
            .field("keys", &self.keys)
            .field("selections", &self.selections)
            .finish()
    }
}

impl DependentSelectChain {
    pub fn new(keys: Vec<String>, source: Arc<dyn OptionSource>) -> Self {
        let selections = vec![None; keys.len()];
        Self {
            keys,
            selections,
            source,
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn level_of(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// 上面几层都选好之后才有选项
    pub fn options(&self, level: usize) -> Vec<String> {
        match self.path_to(level) {
            Some(path) if level < self.keys.len() => self.source.options(level, &path),
            _ => Vec::new(),
        }
    }

    /// 选择某一层的值，并清空下面各层
    pub fn select(&mut self, level: usize, value: &str) -> Result<(), ValidationError> {
        let key = self
            .keys
            .get(level)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownOption {
                level: level.to_string(),
                value: value.to_string(),
            })?;

        if !self.options(level).iter().any(|o| o == value) {
            return Err(ValidationError::UnknownOption {
                level: key,
                value: value.to_string(),
            });
        }

        if self.selections[level].as_deref() == Some(value) {
            return Ok(());
        }
        self.selections[level] = Some(value.to_string());
        self.clear_below(level);
        debug!("级联选择 {} = {}", key, value);
        Ok(())
    }

    pub fn select_key(&mut self, key: &str, value: &str) -> Result<(), ValidationError> {
        let level = self
            .level_of(key)
            .ok_or_else(|| ValidationError::UnknownOption {
                level: key.to_string(),
                value: value.to_string(),
            })?;
        self.select(level, value)
    }

    /// 清空某一层及其下面各层
    pub fn clear(&mut self, level: usize) {
        if level < self.selections.len() {
            self.selections[level] = None;
            self.clear_below(level);
        }
    }

    pub fn reset(&mut self) {
        self.selections.iter_mut().for_each(|s| *s = None);
    }

    pub fn selected(&self, level: usize) -> Option<&str> {
        self.selections.get(level).and_then(|s| s.as_deref())
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.level_of(key).and_then(|level| self.selected(level))
    }

    /// 第一个未选择的层
    pub fn first_missing(&self) -> Option<&str> {
        self.selections
            .iter()
            .position(Option::is_none)
            .map(|level| self.keys[level].as_str())
    }

    pub fn is_complete(&self) -> bool {
        self.selections.iter().all(Option::is_some)
    }

    fn clear_below(&mut self, level: usize) {
        for deeper in self.selections.iter_mut().skip(level + 1) {
            *deeper = None;
        }
    }

    fn path_to(&self, level: usize) -> Option<Vec<String>> {
        self.selections
            .iter()
            .take(level)
            .map(|s| s.clone())
            .collect()
    }
}
