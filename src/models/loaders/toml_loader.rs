use crate::models::catalog::{CatalogTree, CATALOG_DEPTH};
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载级联下拉目录
///
/// 文件格式：
///
/// ```toml
/// levels = ["board", "class", "subject", "paper_type"]
///
/// [[nodes]]
/// value = "人教版"
///
/// [[nodes.children]]
/// value = "八年级"
/// ```
pub async fn load_catalog(toml_file_path: &Path) -> Result<CatalogTree> {
    if !toml_file_path.exists() {
        anyhow::bail!("目录文件不存在: {}", toml_file_path.display());
    }

    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let catalog = parse_catalog(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "✓ 目录加载完成: {} 层, {} 个顶层选项",
        catalog.levels.len(),
        catalog.nodes.len()
    );

    Ok(catalog)
}

/// 解析目录文本
pub fn parse_catalog(content: &str) -> Result<CatalogTree> {
    let catalog: CatalogTree = toml::from_str(content)?;

    if catalog.levels.len() != CATALOG_DEPTH {
        anyhow::bail!(
            "目录需要 {} 层 levels，实际 {} 层",
            CATALOG_DEPTH,
            catalog.levels.len()
        );
    }

    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::select_chain::OptionSource;

    const CATALOG: &str = r#"
levels = ["board", "class", "subject", "paper_type"]

[[nodes]]
value = "人教版"

[[nodes.children]]
value = "八年级"

[[nodes.children.children]]
value = "数学"

[[nodes.children.children.children]]
value = "单元测试"

[[nodes]]
value = "北师大版"
"#;

    #[test]
    fn test_parse_nested_catalog() {
        let catalog = parse_catalog(CATALOG).unwrap();
        assert_eq!(catalog.levels.len(), 4);
        assert_eq!(catalog.options(0, &[]), vec!["人教版", "北师大版"]);
        assert_eq!(
            catalog.options(
                3,
                &["人教版".to_string(), "八年级".to_string(), "数学".to_string()]
            ),
            vec!["单元测试"]
        );
    }

    #[test]
    fn test_parse_rejects_missing_levels() {
        assert!(parse_catalog("levels = []").is_err());
        assert!(parse_catalog(r#"levels = ["board", "class", "subject"]"#).is_err());
    }

    #[test]
    fn test_parse_accepts_renamed_levels() {
        let renamed = CATALOG.replace(
            r#"levels = ["board", "class", "subject", "paper_type"]"#,
            r#"levels = ["board", "grade", "subject", "exam"]"#,
        );
        let catalog = parse_catalog(&renamed).unwrap();
        assert_eq!(catalog.levels[1], "grade");
    }

    #[tokio::test]
    async fn test_load_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, CATALOG).unwrap();

        let catalog = load_catalog(&path).await.unwrap();
        assert_eq!(catalog.nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_load_catalog_missing_file() {
        let result = load_catalog(Path::new("/no/such/catalog.toml")).await;
        assert!(result.is_err());
    }
}
