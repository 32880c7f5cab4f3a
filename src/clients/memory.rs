//! 内存后端
//!
//! 本地演示和测试用。返回固定的试卷和批改结果，可以注入失败、设置延迟，
//! 并统计每个接口被调用的次数。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;

use crate::clients::backend::Backend;
use crate::error::ApiError;
use crate::models::{
    CorrectionItem, CorrectionRequest, FilePayload, GeneratedPaper, GeneratedQuestion,
    GenerationRequest, JobSnapshot, JobState, RegenerateRequest, TransferProgress, UploadReceipt,
};
use crate::session::{AuthGrant, Credentials};

/// 接口种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Authenticate,
    Upload,
    Generate,
    Regenerate,
    Correct,
    StartJob,
    PollJob,
}

struct Job {
    polls: u32,
}

/// 内存后端
pub struct MemoryBackend {
    paper: GeneratedPaper,
    corrections: Vec<CorrectionItem>,
    extracted_text: Option<String>,
    account: Option<Credentials>,
    upload_steps: u32,
    latency: Duration,
    processing_latency: Duration,
    /// 轮询几次后任务完成
    job_polls_to_finish: u32,
    failures: Mutex<HashMap<Operation, VecDeque<Option<String>>>>,
    jobs: Mutex<HashMap<String, Job>>,
    calls: Mutex<HashMap<Operation, usize>>,
    regenerations: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            paper: sample_paper(),
            corrections: sample_corrections(),
            extracted_text: Some("光合作用 细胞呼吸".to_string()),
            account: None,
            upload_steps: 4,
            latency: Duration::from_millis(200),
            processing_latency: Duration::from_secs(5),
            job_polls_to_finish: 4,
            failures: Mutex::new(HashMap::new()),
            jobs: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            regenerations: AtomicUsize::new(0),
        }
    }

    pub fn with_paper(mut self, paper: GeneratedPaper) -> Self {
        self.paper = paper;
        self
    }

    pub fn with_corrections(mut self, corrections: Vec<CorrectionItem>) -> Self {
        self.corrections = corrections;
        self
    }

    pub fn with_extracted_text(mut self, text: Option<&str>) -> Self {
        self.extracted_text = text.map(str::to_string);
        self
    }

    /// 只接受这一组账号密码
    pub fn with_account(mut self, email: &str, password: &str) -> Self {
        self.account = Some(Credentials {
            email: email.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_processing_latency(mut self, latency: Duration) -> Self {
        self.processing_latency = latency;
        self
    }

    pub fn with_upload_steps(mut self, steps: u32) -> Self {
        self.upload_steps = steps.max(1);
        self
    }

    pub fn with_job_polls(mut self, polls: u32) -> Self {
        self.job_polls_to_finish = polls.max(1);
        self
    }

    /// 下一次调用该接口时返回错误
    pub fn fail_next(&self, op: Operation, message: Option<&str>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures
                .entry(op)
                .or_default()
                .push_back(message.map(str::to_string));
        }
    }

    /// 接口被调用的次数
    pub fn calls(&self, op: Operation) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn enter(&self, op: Operation, endpoint: &str) -> Result<(), ApiError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(op).or_insert(0) += 1;
        }
        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|mut f| f.get_mut(&op).and_then(VecDeque::pop_front));
        match failure {
            Some(message) => Err(ApiError::BadResponse {
                endpoint: endpoint.to_string(),
                status: 500,
                message,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthGrant, ApiError> {
        sleep(self.latency).await;
        self.enter(Operation::Authenticate, "auth/login")?;

        let accepted = match &self.account {
            Some(account) => {
                account.email == credentials.email && account.password == credentials.password
            }
            None => !credentials.password.is_empty(),
        };
        if !accepted {
            return Err(ApiError::BadResponse {
                endpoint: "auth/login".to_string(),
                status: 401,
                message: Some("账号或密码错误".to_string()),
            });
        }

        Ok(AuthGrant {
            token: format!("memory-{}", credentials.email),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            enrolled: true,
            user_id: Some(credentials.email.clone()),
        })
    }

    async fn upload_document(
        &self,
        file: FilePayload,
        _page_range: Option<String>,
        progress: UnboundedSender<TransferProgress>,
    ) -> Result<UploadReceipt, ApiError> {
        let total = file.size();
        let step_delay = self.latency / self.upload_steps;
        for step in 1..=self.upload_steps as u64 {
            sleep(step_delay).await;
            let _ = progress.send(TransferProgress {
                sent: total * step / self.upload_steps as u64,
                total,
            });
        }
        // 字节发完之后才知道服务端是否接受
        self.enter(Operation::Upload, "documents/extract")?;

        Ok(UploadReceipt {
            file_id: Some(format!("file-{}", file.name)),
            extracted_text: self.extracted_text.clone(),
        })
    }

    async fn generate_paper(&self, request: GenerationRequest) -> Result<GeneratedPaper, ApiError> {
        sleep(self.processing_latency).await;
        self.enter(Operation::Generate, "papers/generate")?;

        let count = request.params.question_count as usize;
        let mut paper = self.paper.clone();
        if count > 0 && count < paper.questions.len() {
            paper.questions.truncate(count);
        }
        Ok(paper)
    }

    async fn regenerate_question(
        &self,
        request: RegenerateRequest,
    ) -> Result<GeneratedQuestion, ApiError> {
        sleep(self.latency).await;
        self.enter(Operation::Regenerate, "papers/regenerate-question")?;

        let n = self.regenerations.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GeneratedQuestion {
            text: format!("{}（换题 #{}）", request.question.text, n),
            marks: request.question.marks,
            model_answer: request.question.model_answer,
        })
    }

    async fn submit_correction(
        &self,
        _request: CorrectionRequest,
    ) -> Result<Vec<CorrectionItem>, ApiError> {
        sleep(self.processing_latency).await;
        self.enter(Operation::Correct, "corrections")?;
        Ok(self.corrections.clone())
    }

    async fn start_correction_job(&self, request: CorrectionRequest) -> Result<String, ApiError> {
        sleep(self.latency).await;
        self.enter(Operation::StartJob, "corrections/jobs")?;

        let job_id = format!("job-{}-{}", request.paper_id, self.calls(Operation::StartJob));
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(job_id.clone(), Job { polls: 0 });
        }
        Ok(job_id)
    }

    async fn correction_job(
        &self,
        job_id: &str,
    ) -> Result<JobSnapshot<Vec<CorrectionItem>>, ApiError> {
        let endpoint = format!("jobs/{}", job_id);
        self.enter(Operation::PollJob, &endpoint)?;

        let polls = {
            let mut jobs = self.jobs.lock().map_err(|_| ApiError::JobFailed {
                endpoint: endpoint.clone(),
                message: None,
            })?;
            let job = jobs.get_mut(job_id).ok_or_else(|| ApiError::BadResponse {
                endpoint: endpoint.clone(),
                status: 404,
                message: Some("任务不存在".to_string()),
            })?;
            job.polls += 1;
            job.polls
        };

        if polls >= self.job_polls_to_finish {
            Ok(JobSnapshot {
                state: JobState::Succeeded,
                progress: Some(100),
                message: None,
                result: Some(self.corrections.clone()),
            })
        } else {
            Ok(JobSnapshot {
                state: JobState::Running,
                progress: Some((polls * 100 / self.job_polls_to_finish) as u8),
                message: None,
                result: None,
            })
        }
    }
}

/// 演示用试卷
pub fn sample_paper() -> GeneratedPaper {
    GeneratedPaper {
        title: "八年级生物 单元测试".to_string(),
        questions: vec![
            GeneratedQuestion {
                text: "简述光合作用的原料和产物。".to_string(),
                marks: 5.0,
                model_answer: "原料：二氧化碳和水；产物：有机物和氧气。".to_string(),
            },
            GeneratedQuestion {
                text: "比较光合作用与呼吸作用的区别。".to_string(),
                marks: 6.0,
                model_answer: "场所、条件、物质和能量变化各不相同。".to_string(),
            },
            GeneratedQuestion {
                text: "说出叶绿体的主要功能。".to_string(),
                marks: 4.0,
                model_answer: "进行光合作用的场所。".to_string(),
            },
        ],
    }
}

/// 演示用批改结果
pub fn sample_corrections() -> Vec<CorrectionItem> {
    vec![
        CorrectionItem {
            question_no: 1,
            ai_mark: 4.0,
            max_mark: 5.0,
            ai_feedback: "漏写了氧气。".to_string(),
            ocr_text: "二氧化碳、水；有机物".to_string(),
        },
        CorrectionItem {
            question_no: 2,
            ai_mark: 6.0,
            max_mark: 6.0,
            ai_feedback: "回答完整。".to_string(),
            ocr_text: "场所不同……".to_string(),
        },
        CorrectionItem {
            question_no: 3,
            ai_mark: 1.5,
            max_mark: 4.0,
            ai_feedback: "只答出一半。".to_string(),
            ocr_text: "叶绿体含有叶绿素".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fail_next_is_consumed_once() {
        let backend = MemoryBackend::new();
        backend.fail_next(Operation::Authenticate, Some("服务维护中"));

        let creds = Credentials {
            email: "t@school.cn".to_string(),
            password: "pw".to_string(),
        };
        let first = backend.authenticate(&creds).await.unwrap_err();
        assert_eq!(first.user_message(), "服务维护中");
        assert!(backend.authenticate(&creds).await.is_ok());
        assert_eq!(backend.calls(Operation::Authenticate), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_password_rejected() {
        let backend = MemoryBackend::new().with_account("t@school.cn", "secret");
        let creds = Credentials {
            email: "t@school.cn".to_string(),
            password: "guess".to_string(),
        };
        let err = backend.authenticate(&creds).await.unwrap_err();
        assert_eq!(err.user_message(), "账号或密码错误");
    }
}
