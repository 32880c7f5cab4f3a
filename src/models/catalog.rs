//! 级联下拉目录
//!
//! 教材体系 → 年级 → 科目 → 试卷类型，每一层的可选项只取决于上面几层的选择。

use serde::{Deserialize, Serialize};

use crate::wizard::select_chain::OptionSource;

/// 目录层数：教材体系、年级、科目、试卷类型
pub const CATALOG_DEPTH: usize = 4;

/// 目录节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogNode {
    pub value: String,
    #[serde(default)]
    pub children: Vec<CatalogNode>,
}

impl CatalogNode {
    pub fn leaf(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(value: impl Into<String>, children: Vec<CatalogNode>) -> Self {
        Self {
            value: value.into(),
            children,
        }
    }
}

/// 目录树
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTree {
    /// 每一层的名字，例如 `["board", "class", "subject", "paper_type"]`
    pub levels: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<CatalogNode>,
}

impl CatalogTree {
    /// 按已选路径找到下一层的节点
    fn children_at(&self, path: &[String]) -> Option<&[CatalogNode]> {
        let mut current: &[CatalogNode] = &self.nodes;
        for value in path {
            let node = current.iter().find(|n| &n.value == value)?;
            current = &node.children;
        }
        Some(current)
    }
}

impl OptionSource for CatalogTree {
    fn options(&self, level: usize, path: &[String]) -> Vec<String> {
        if level >= self.levels.len() || path.len() != level {
            return Vec::new();
        }
        self.children_at(path)
            .map(|nodes| nodes.iter().map(|n| n.value.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) fn sample_catalog() -> CatalogTree {
    CatalogTree {
        levels: vec![
            "board".to_string(),
            "class".to_string(),
            "subject".to_string(),
            "paper_type".to_string(),
        ],
        nodes: vec![
            CatalogNode::with_children(
                "人教版",
                vec![
                    CatalogNode::with_children(
                        "八年级",
                        vec![
                            CatalogNode::with_children(
                                "数学",
                                vec![CatalogNode::leaf("单元测试"), CatalogNode::leaf("期中")],
                            ),
                            CatalogNode::with_children("物理", vec![CatalogNode::leaf("期末")]),
                        ],
                    ),
                    CatalogNode::with_children(
                        "九年级",
                        vec![CatalogNode::with_children(
                            "化学",
                            vec![CatalogNode::leaf("模拟考")],
                        )],
                    ),
                ],
            ),
            CatalogNode::with_children(
                "北师大版",
                vec![CatalogNode::with_children(
                    "七年级",
                    vec![CatalogNode::with_children(
                        "数学",
                        vec![CatalogNode::leaf("单元测试")],
                    )],
                )],
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_follow_path() {
        let catalog = sample_catalog();
        assert_eq!(catalog.options(0, &[]), vec!["人教版", "北师大版"]);
        assert_eq!(
            catalog.options(1, &["人教版".to_string()]),
            vec!["八年级", "九年级"]
        );
        assert_eq!(
            catalog.options(2, &["人教版".to_string(), "八年级".to_string()]),
            vec!["数学", "物理"]
        );
    }

    #[test]
    fn test_options_empty_for_unknown_path_or_level() {
        let catalog = sample_catalog();
        assert!(catalog.options(1, &["不存在".to_string()]).is_empty());
        assert!(catalog.options(2, &["人教版".to_string()]).is_empty());
        assert!(catalog.options(9, &[]).is_empty());
    }
}
