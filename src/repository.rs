//! 记录仓库
//!
//! 定稿后的试卷和批改结果通过这里保存。内存实现用于本地运行和测试，
//! HTTP 实现对应后端的 `{base}/{collection}` 资源。

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clients::ApiClient;
use crate::error::{ApiError, AppResult};

/// 带 ID 的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: String,
    #[serde(flatten)]
    pub value: T,
}

/// 仓库接口
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Send + Sync,
{
    async fn list(&self) -> AppResult<Vec<Record<T>>>;

    /// 新增记录，返回带 ID 的记录
    async fn add(&self, value: T) -> AppResult<Record<T>>;

    async fn update(&self, id: &str, value: T) -> AppResult<Record<T>>;

    async fn remove(&self, id: &str) -> AppResult<()>;
}

fn not_found(collection: &str, id: &str) -> ApiError {
    ApiError::BadResponse {
        endpoint: format!("{}/{}", collection, id),
        status: 404,
        message: Some("记录不存在".to_string()),
    }
}

/// 内存仓库
pub struct InMemoryRepository<T> {
    collection: &'static str,
    records: RwLock<Vec<Record<T>>>,
}

impl<T> InMemoryRepository<T> {
    pub fn new(collection: &'static str) -> Self {
        Self {
            collection,
            records: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl<T> Repository<T> for InMemoryRepository<T>
where
    T: Clone + Send + Sync,
{
    async fn list(&self) -> AppResult<Vec<Record<T>>> {
        Ok(self.records.read().await.clone())
    }

    async fn add(&self, value: T) -> AppResult<Record<T>> {
        let record = Record {
            id: Uuid::new_v4().to_string(),
            value,
        };
        self.records.write().await.push(record.clone());
        debug!("[{}] 新增记录 {}", self.collection, record.id);
        Ok(record)
    }

    async fn update(&self, id: &str, value: T) -> AppResult<Record<T>> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found(self.collection, id))?;
        record.value = value;
        Ok(record.clone())
    }

    async fn remove(&self, id: &str) -> AppResult<()> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(not_found(self.collection, id).into());
        }
        Ok(())
    }
}

/// HTTP 仓库
pub struct HttpRepository<T> {
    api: ApiClient,
    collection: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HttpRepository<T> {
    pub fn new(api: ApiClient, collection: impl Into<String>) -> Self {
        Self {
            api,
            collection: collection.into(),
            _marker: PhantomData,
        }
    }

    fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.collection, id)
    }
}

#[async_trait]
impl<T> Repository<T> for HttpRepository<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn list(&self) -> AppResult<Vec<Record<T>>> {
        let builder = self.api.authorized(self.api.get(&self.collection))?;
        Ok(self.api.send_json(&self.collection, builder).await?)
    }

    async fn add(&self, value: T) -> AppResult<Record<T>> {
        let builder = self
            .api
            .authorized(self.api.post(&self.collection))?
            .json(&value);
        let record: Record<T> = self.api.send_json(&self.collection, builder).await?;
        info!("💾 已保存到 {}: {}", self.collection, record.id);
        Ok(record)
    }

    async fn update(&self, id: &str, value: T) -> AppResult<Record<T>> {
        let path = self.item_path(id);
        let builder = self.api.authorized(self.api.put(&path))?.json(&value);
        Ok(self.api.send_json(&path, builder).await?)
    }

    async fn remove(&self, id: &str) -> AppResult<()> {
        let path = self.item_path(id);
        let builder = self.api.authorized(self.api.delete(&path))?;
        self.api.send(&path, builder).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    fn note(text: &str) -> Note {
        Note {
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_crud() {
        let repo = InMemoryRepository::new("notes");
        let a = repo.add(note("甲")).await.unwrap();
        let b = repo.add(note("乙")).await.unwrap();
        assert_ne!(a.id, b.id);

        repo.update(&a.id, note("甲改")).await.unwrap();
        repo.remove(&b.id).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, note("甲改"));
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let repo: InMemoryRepository<Note> = InMemoryRepository::new("notes");
        let err = repo.remove("nope").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Api(ApiError::BadResponse { status: 404, .. })
        ));
        assert_eq!(err.user_message(), "记录不存在");
    }

    #[test]
    fn test_record_flattens_value() {
        let record = Record {
            id: "r1".to_string(),
            value: note("丙"),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"id": "r1", "text": "丙"}));
    }

    #[tokio::test]
    async fn test_http_repository_needs_session() {
        let api = ApiClient::new(
            "http://localhost:8000/api",
            Duration::from_secs(1),
            Arc::new(crate::session::AnonymousSession),
        )
        .unwrap();
        let repo: HttpRepository<Note> = HttpRepository::new(api, "notes");
        let err = repo.list().await.unwrap_err();
        assert!(matches!(err, AppError::Api(ApiError::Unauthenticated)));
    }
}
