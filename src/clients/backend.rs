//! 后端能力接口
//!
//! 出题、批改、文本抽取、登录都由后端完成，向导只依赖这里的接口。

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::ApiError;
use crate::models::{
    CorrectionItem, CorrectionRequest, FilePayload, GeneratedPaper, GeneratedQuestion,
    GenerationRequest, JobSnapshot, RegenerateRequest, TransferProgress, UploadReceipt,
};
use crate::session::{AuthGrant, Credentials};

/// 后端接口
#[async_trait]
pub trait Backend: Send + Sync {
    /// 登录
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthGrant, ApiError>;

    /// 上传文件并抽取内容
    ///
    /// 每发送一段数据就往 `progress` 里写一次累计字节数。
    async fn upload_document(
        &self,
        file: FilePayload,
        page_range: Option<String>,
        progress: UnboundedSender<TransferProgress>,
    ) -> Result<UploadReceipt, ApiError>;

    /// 生成整张试卷（一次请求，不汇报进度）
    async fn generate_paper(&self, request: GenerationRequest) -> Result<GeneratedPaper, ApiError>;

    /// 重新生成一道题
    async fn regenerate_question(
        &self,
        request: RegenerateRequest,
    ) -> Result<GeneratedQuestion, ApiError>;

    /// 提交批改（一次请求，不汇报进度）
    async fn submit_correction(
        &self,
        request: CorrectionRequest,
    ) -> Result<Vec<CorrectionItem>, ApiError>;

    /// 以后台任务方式提交批改，返回任务 ID
    async fn start_correction_job(&self, request: CorrectionRequest) -> Result<String, ApiError>;

    /// 查询批改任务状态
    async fn correction_job(
        &self,
        job_id: &str,
    ) -> Result<JobSnapshot<Vec<CorrectionItem>>, ApiError>;
}
