/// 后端 HTTP 客户端
///
/// 封装地址拼接、Bearer 认证、错误响应解析
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::session::SessionContext;

/// HTTP 客户端
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    session: Arc<dyn SessionContext>,
}

impl ApiClient {
    /// 创建新的客户端
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        session: Arc<dyn SessionContext>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::request_failed("client", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            session,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(self.url(path))
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path))
    }

    /// 附加 Bearer token；没有有效 token 时不发请求
    pub fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.session.token().ok_or(ApiError::Unauthenticated)?;
        Ok(builder.bearer_auth(token.value))
    }

    /// 发送请求并解析 JSON 响应
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(endpoint, builder).await?;
        response.json::<T>().await.map_err(|e| ApiError::JsonParseFailed {
            source: Box::new(e),
        })
    }

    /// 发送请求，只检查状态码
    pub async fn send(
        &self,
        endpoint: &str,
        builder: RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        debug!("请求 {}", endpoint);

        let response = builder.send().await.map_err(|e| self.map_error(endpoint, e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_message(&body);
            warn!(
                "API 返回错误 ({}): status={}, message={:?}",
                endpoint,
                status.as_u16(),
                message
            );
            return Err(ApiError::BadResponse {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    fn map_error(&self, endpoint: &str, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout {
                endpoint: endpoint.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            ApiError::request_failed(endpoint, err)
        }
    }
}

/// 从错误响应体里取 `message`
pub fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("detail"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
