/// 基于 HTTP 的后端实现
///
/// 接口约定见 `Backend`，所有需要登录的请求都带 Bearer token
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::clients::api_client::ApiClient;
use crate::clients::backend::Backend;
use crate::error::ApiError;
use crate::models::{
    CorrectionItem, CorrectionRequest, FilePayload, GeneratedPaper, GeneratedQuestion,
    GenerationRequest, JobSnapshot, RegenerateRequest, TransferProgress, UploadReceipt,
};
use crate::session::{AuthGrant, Credentials};

/// 上传时每段的大小
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

const EXTRACT_ENDPOINT: &str = "documents/extract";
const GENERATE_ENDPOINT: &str = "papers/generate";
const REGENERATE_ENDPOINT: &str = "papers/regenerate-question";
const CORRECTION_ENDPOINT: &str = "corrections";
const CORRECTION_JOB_ENDPOINT: &str = "corrections/jobs";
const LOGIN_ENDPOINT: &str = "auth/login";

#[derive(Debug, Deserialize)]
struct JobCreated {
    job_id: String,
}

/// HTTP 后端
#[derive(Clone)]
pub struct HttpBackend {
    api: ApiClient,
}

impl HttpBackend {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthGrant, ApiError> {
        info!("🔑 正在登录: {}", credentials.email);
        let builder = self.api.post(LOGIN_ENDPOINT).json(credentials);
        self.api.send_json(LOGIN_ENDPOINT, builder).await
    }

    async fn upload_document(
        &self,
        file: FilePayload,
        page_range: Option<String>,
        progress: UnboundedSender<TransferProgress>,
    ) -> Result<UploadReceipt, ApiError> {
        let part = streaming_part(&file, progress)
            .map_err(|e| ApiError::request_failed(EXTRACT_ENDPOINT, e))?;

        let mut form = Form::new().part("file", part);
        if let Some(range) = page_range {
            form = form.text("page_range", range);
        }

        let builder = self.api.authorized(self.api.post(EXTRACT_ENDPOINT))?.multipart(form);
        self.api.send_json(EXTRACT_ENDPOINT, builder).await
    }

    async fn generate_paper(&self, request: GenerationRequest) -> Result<GeneratedPaper, ApiError> {
        let params = serde_json::to_string(&request.params).map_err(|e| {
            ApiError::JsonParseFailed {
                source: Box::new(e),
            }
        })?;
        debug!("出题参数: {}", params);

        let part = file_part(&request.source)
            .map_err(|e| ApiError::request_failed(GENERATE_ENDPOINT, e))?;
        let mut form = Form::new().part("file", part).text("params", params);
        if let Some(text) = request.source_text {
            form = form.text("source_text", text);
        }

        let builder = self.api.authorized(self.api.post(GENERATE_ENDPOINT))?.multipart(form);
        self.api.send_json(GENERATE_ENDPOINT, builder).await
    }

    async fn regenerate_question(
        &self,
        request: RegenerateRequest,
    ) -> Result<GeneratedQuestion, ApiError> {
        let builder = self
            .api
            .authorized(self.api.post(REGENERATE_ENDPOINT))?
            .json(&request);
        self.api.send_json(REGENERATE_ENDPOINT, builder).await
    }

    async fn submit_correction(
        &self,
        request: CorrectionRequest,
    ) -> Result<Vec<CorrectionItem>, ApiError> {
        let form = correction_form(&request)
            .map_err(|e| ApiError::request_failed(CORRECTION_ENDPOINT, e))?;
        let builder = self.api.authorized(self.api.post(CORRECTION_ENDPOINT))?.multipart(form);
        self.api.send_json(CORRECTION_ENDPOINT, builder).await
    }

    async fn start_correction_job(&self, request: CorrectionRequest) -> Result<String, ApiError> {
        let form = correction_form(&request)
            .map_err(|e| ApiError::request_failed(CORRECTION_JOB_ENDPOINT, e))?;
        let builder = self
            .api
            .authorized(self.api.post(CORRECTION_JOB_ENDPOINT))?
            .multipart(form);
        let created: JobCreated = self.api.send_json(CORRECTION_JOB_ENDPOINT, builder).await?;
        Ok(created.job_id)
    }

    async fn correction_job(
        &self,
        job_id: &str,
    ) -> Result<JobSnapshot<Vec<CorrectionItem>>, ApiError> {
        let endpoint = format!("jobs/{}", job_id);
        let builder = self.api.authorized(self.api.get(&endpoint))?;
        self.api.send_json(&endpoint, builder).await
    }
}

/// 一次性发送的文件段
fn file_part(file: &FilePayload) -> Result<Part, reqwest::Error> {
    Part::bytes(file.bytes.to_vec())
        .file_name(file.name.clone())
        .mime_str(&file.mime)
}

/// 分段发送并汇报进度的文件段
fn streaming_part(
    file: &FilePayload,
    progress: UnboundedSender<TransferProgress>,
) -> Result<Part, reqwest::Error> {
    let stream = progress_chunks(file, progress);
    Part::stream_with_length(reqwest::Body::wrap_stream(stream), file.size())
        .file_name(file.name.clone())
        .mime_str(&file.mime)
}

/// 把文件切成若干段，每交出一段就汇报一次累计字节数
fn progress_chunks(
    file: &FilePayload,
    progress: UnboundedSender<TransferProgress>,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let total = file.size();
    let len = file.bytes.len();
    let chunks: Vec<Bytes> = (0..len)
        .step_by(UPLOAD_CHUNK_BYTES)
        .map(|start| file.bytes.slice(start..(start + UPLOAD_CHUNK_BYTES).min(len)))
        .collect();

    let mut sent = 0u64;
    futures::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        // 接收端已经放弃时忽略
        let _ = progress.send(TransferProgress { sent, total });
        Ok::<Bytes, std::io::Error>(chunk)
    }))
}

fn correction_form(request: &CorrectionRequest) -> Result<Form, reqwest::Error> {
    Ok(Form::new()
        .part("answers", file_part(&request.answers)?)
        .text("answer_key_id", request.answer_key_id.clone())
        .text("paper_id", request.paper_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_chunks_report_monotonic_progress_up_to_total() {
        let size = UPLOAD_CHUNK_BYTES * 3 + 100;
        let file = FilePayload::new("answers.pdf", "application/pdf", vec![3u8; size]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let chunks: Vec<Bytes> = progress_chunks(&file, tx)
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), size);

        let mut reports = Vec::new();
        while let Ok(update) = rx.try_recv() {
            reports.push(update);
        }
        assert_eq!(reports.len(), 4);
        assert!(reports.windows(2).all(|w| w[0].sent < w[1].sent));
        assert!(reports.iter().all(|r| r.total == size as u64));
        assert_eq!(reports.last().map(|r| r.sent), Some(size as u64));
        assert_eq!(reports.last().map(TransferProgress::percent), Some(100));
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_stop_upload() {
        let file = FilePayload::new("key.pdf", "application/pdf", vec![1u8; 10]);
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let chunks: Vec<_> = progress_chunks(&file, tx).collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_ok());
        assert!(streaming_part(&file, mpsc::unbounded_channel().0).is_ok());
    }
}
