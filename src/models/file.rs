use bytes::Bytes;
use std::path::Path;

use crate::error::{AppError, AppResult, FileError};

/// 待上传的文件
///
/// 字节内容用 `Bytes` 保存，克隆只增加引用计数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// 文件大小（字节）
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// 从磁盘读取文件，MIME 类型按扩展名推断
    pub async fn from_path(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::File(FileError::NotFound {
                path: path.display().to_string(),
            }));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let mime = guess_mime(&name).to_string();

        Ok(Self::new(name, mime, bytes))
    }
}

/// 根据文件名推断 MIME 类型
pub fn guess_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime_is_case_insensitive() {
        assert_eq!(guess_mime("Answer-Key.PDF"), "application/pdf");
        assert_eq!(guess_mime("scan.JPEG"), "image/jpeg");
        assert_eq!(guess_mime("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_from_path_reads_bytes_and_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let file = FilePayload::from_path(&path).await.unwrap();
        assert_eq!(file.name, "sheet.png");
        assert_eq!(file.mime, "image/png");
        assert_eq!(file.size(), 3);
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let err = FilePayload::from_path(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::File(FileError::NotFound { .. })));
    }
}
