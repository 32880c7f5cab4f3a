//! 批改向导
//!
//! 选择试卷 → 上传学生答卷 → 上传参考答案 → 复核 AI 评分 → 定稿
//!
//! 参考答案上传成功后立即开始批改。批改可以是一次请求加模拟进度，
//! 也可以是后台任务加轮询，由 [`CorrectionMode`] 决定。

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clients::Backend;
use crate::config::WizardTimings;
use crate::error::{AppError, AppResult, ValidationError, WizardError};
use crate::events::{EventSink, WizardEvent};
use crate::models::{
    CorrectionItem, CorrectionRequest, FilePayload, FinalizedCorrection, FinalizedMark,
    UploadReceipt,
};
use crate::repository::{Record, Repository};
use crate::review::ReviewableResultSet;
use crate::tasks::{
    FileRule, PhaseTable, PollingDriver, ProcessingTask, ProgressSimulator, SimulatedDriver,
    UploadTask,
};
use crate::wizard::controller::{StageId, WizardController};
use crate::wizard::state::{FailedStage, PhaseEvent, WizardPhase};
use crate::wizard::{wait_before_advance, AbortHandle};

const WIZARD: &str = "correction";

/// 批改向导的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum CorrectionStage {
    SelectPaper,
    UploadAnswers,
    UploadAnswerKey,
    Review,
    Finalize,
}

impl StageId for CorrectionStage {
    fn label(self) -> &'static str {
        match self {
            CorrectionStage::SelectPaper => "select_paper",
            CorrectionStage::UploadAnswers => "upload_answers",
            CorrectionStage::UploadAnswerKey => "upload_answer_key",
            CorrectionStage::Review => "review",
            CorrectionStage::Finalize => "finalize",
        }
    }
}

/// 批改进度的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrectionMode {
    /// 一次请求，本地模拟进度
    #[default]
    Simulated,
    /// 后台任务，轮询进度
    Polling,
}

struct CorrectionState {
    paper_id: Option<String>,
    answers: UploadTask,
    answer_key: UploadTask,
    correction: ProcessingTask<Vec<CorrectionItem>>,
    review: ReviewableResultSet<CorrectionItem>,
}

/// 批改向导
pub struct CorrectionWizard {
    controller: WizardController<CorrectionStage, CorrectionState>,
    state: CorrectionState,
    phase: WizardPhase,
    mode: CorrectionMode,
    backend: Arc<dyn Backend>,
    repository: Arc<dyn Repository<FinalizedCorrection>>,
    timings: WizardTimings,
    simulated: SimulatedDriver,
    polling: PollingDriver,
    abort: AbortHandle,
    sink: Arc<dyn EventSink>,
    saved: Option<Record<FinalizedCorrection>>,
}

impl CorrectionWizard {
    pub fn new(
        backend: Arc<dyn Backend>,
        repository: Arc<dyn Repository<FinalizedCorrection>>,
        timings: WizardTimings,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let controller = WizardController::<CorrectionStage, CorrectionState>::new(
            WIZARD,
            CorrectionStage::SelectPaper,
            [
                CorrectionStage::UploadAnswers,
                CorrectionStage::UploadAnswerKey,
                CorrectionStage::Review,
                CorrectionStage::Finalize,
            ],
            sink.clone(),
        )
        .with_guard(CorrectionStage::SelectPaper, |s| {
            s.paper_id.as_deref().is_some_and(|id| !id.is_empty())
        })
        .with_guard(CorrectionStage::UploadAnswers, |s| s.answers.is_succeeded())
        .with_guard(CorrectionStage::UploadAnswerKey, |s| {
            s.answer_key.is_succeeded() && s.correction.is_succeeded()
        });

        let limit = timings.max_upload_bytes;
        let state = CorrectionState {
            paper_id: None,
            answers: UploadTask::new(
                "answers",
                FileRule::image_or_pdf().with_max_bytes(limit),
                sink.clone(),
            ),
            answer_key: UploadTask::new(
                "answer_key",
                FileRule::pdf_only().with_max_bytes(limit),
                sink.clone(),
            ),
            correction: ProcessingTask::new("correct", PhaseTable::correction(), sink.clone()),
            review: ReviewableResultSet::default(),
        };

        Self {
            controller,
            state,
            phase: WizardPhase::Configuring,
            mode: CorrectionMode::default(),
            backend,
            repository,
            timings,
            simulated: SimulatedDriver::from_timings(&timings),
            polling: PollingDriver::from_timings(&timings),
            abort: AbortHandle::new(),
            sink,
            saved: None,
        }
    }

    pub fn with_mode(mut self, mode: CorrectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_simulator(mut self, simulator: impl ProgressSimulator + 'static) -> Self {
        self.simulated.simulator = Box::new(simulator);
        self
    }

    pub fn stage(&self) -> CorrectionStage {
        self.controller.current()
    }

    pub fn phase(&self) -> WizardPhase {
        self.phase
    }

    pub fn mode(&self) -> CorrectionMode {
        self.mode
    }

    pub fn is_finalized(&self) -> bool {
        self.controller.is_finalized()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn paper_id(&self) -> Option<&str> {
        self.state.paper_id.as_deref()
    }

    pub fn answers(&self) -> &UploadTask {
        &self.state.answers
    }

    pub fn answer_key(&self) -> &UploadTask {
        &self.state.answer_key
    }

    pub fn correction(&self) -> &ProcessingTask<Vec<CorrectionItem>> {
        &self.state.correction
    }

    pub fn review(&self) -> &ReviewableResultSet<CorrectionItem> {
        &self.state.review
    }

    pub fn review_mut(&mut self) -> AppResult<&mut ReviewableResultSet<CorrectionItem>> {
        self.ensure_editable()?;
        Ok(&mut self.state.review)
    }

    pub fn saved(&self) -> Option<&Record<FinalizedCorrection>> {
        self.saved.as_ref()
    }

    pub fn can_advance(&self) -> bool {
        self.controller.can_advance(&self.state)
    }

    pub fn next(&mut self) -> bool {
        let moved = self.controller.advance(&self.state);
        if moved && self.phase == WizardPhase::Configuring {
            self.apply(PhaseEvent::Configured);
        }
        moved
    }

    pub fn back(&mut self) -> bool {
        self.controller.retreat()
    }

    /// 选择要批改的试卷
    ///
    /// 换了试卷之后，已有的批改结果作废；上传过的文件保留。
    pub fn select_paper(&mut self, paper_id: &str) -> AppResult<()> {
        self.ensure_editable()?;
        self.ensure_stage(CorrectionStage::SelectPaper)?;

        let paper_id = paper_id.trim();
        if paper_id.is_empty() {
            let e = ValidationError::MissingField("paper_id".to_string());
            self.sink.emit(WizardEvent::ValidationFailed {
                task: "select_paper",
                message: e.to_string(),
            });
            return Err(e.into());
        }

        if self.state.paper_id.as_deref() == Some(paper_id) {
            return Ok(());
        }
        if self.phase != WizardPhase::Configuring {
            self.discard_results();
            self.apply(PhaseEvent::Rewind(WizardPhase::Configuring));
        }
        info!("[{}] 📄 选择试卷: {}", WIZARD, paper_id);
        self.state.paper_id = Some(paper_id.to_string());
        Ok(())
    }

    /// 上传学生答卷（图片或 PDF），成功后自动进入下一步
    pub async fn upload_answers(&mut self, file: FilePayload) -> AppResult<UploadReceipt> {
        self.ensure_stage(CorrectionStage::UploadAnswers)?;
        self.state.answers.validate(&file)?;
        self.prepare_upload();

        let cancel = self.abort.token();
        let backend = self.backend.clone();
        let result = self
            .state
            .answers
            .start(file, &cancel, move |file, tx| async move {
                backend.upload_document(file, None, tx).await
            })
            .await;
        let receipt = self.settle_upload(result)?;

        if wait_before_advance(&cancel, self.timings.auto_advance_delay).await {
            self.next();
        }
        Ok(receipt)
    }

    /// 上传参考答案（仅 PDF），成功后直接开始批改
    pub async fn upload_answer_key(&mut self, file: FilePayload) -> AppResult<()> {
        self.ensure_stage(CorrectionStage::UploadAnswerKey)?;
        self.state.answer_key.validate(&file)?;
        self.prepare_upload();

        let cancel = self.abort.token();
        let backend = self.backend.clone();
        let result = self
            .state
            .answer_key
            .start(file, &cancel, move |file, tx| async move {
                backend.upload_document(file, None, tx).await
            })
            .await;
        self.settle_upload(result)?;

        self.run_correction().await
    }

    /// 批改；失败后再次调用即为重试
    pub async fn run_correction(&mut self) -> AppResult<()> {
        self.ensure_stage(CorrectionStage::UploadAnswerKey)?;
        let request = self.correction_request()?;
        self.enter_processing()?;
        info!(
            "[{}] 🧮 开始批改: 试卷 {}, 答卷 {} ({:?})",
            WIZARD, request.paper_id, request.answers.name, self.mode
        );

        let cancel = self.abort.token();
        let backend = self.backend.clone();
        let result = match self.mode {
            CorrectionMode::Simulated => {
                self.state
                    .correction
                    .run_simulated(&mut self.simulated, &cancel, async move {
                        backend.submit_correction(request).await
                    })
                    .await
            }
            CorrectionMode::Polling => {
                // 第一次轮询时创建后台任务，之后只查状态
                let job: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
                self.state
                    .correction
                    .run_polling(&self.polling, &cancel, || {
                        let backend = backend.clone();
                        let job = job.clone();
                        let request = request.clone();
                        async move {
                            let mut slot = job.lock().await;
                            let job_id = match slot.as_ref() {
                                Some(id) => id.clone(),
                                None => {
                                    let id = backend.start_correction_job(request).await?;
                                    info!("[{}] 后台批改任务: {}", WIZARD, id);
                                    *slot = Some(id.clone());
                                    id
                                }
                            };
                            drop(slot);
                            backend.correction_job(&job_id).await
                        }
                    })
                    .await
            }
        };

        match result {
            Ok(()) => {
                if let Some(items) = self.state.correction.result() {
                    self.state.review = ReviewableResultSet::from_bodies(items.clone());
                }
                info!(
                    "[{}] ✓ 批改完成: AI 评分 {}",
                    WIZARD,
                    self.state.review.aggregate()
                );
                self.apply(PhaseEvent::ProcessingSucceeded);
                if wait_before_advance(&cancel, self.timings.auto_advance_delay).await {
                    self.next();
                }
                Ok(())
            }
            Err(AppError::Wizard(WizardError::Cancelled)) => {
                self.apply(PhaseEvent::Rewind(WizardPhase::Uploading));
                Err(WizardError::Cancelled.into())
            }
            Err(e) => {
                self.apply(PhaseEvent::ProcessingFailed);
                Err(e)
            }
        }
    }

    /// 重试失败的步骤
    pub async fn retry(&mut self) -> AppResult<()> {
        match self.phase {
            WizardPhase::Failed(FailedStage::Uploading) => match self.stage() {
                CorrectionStage::UploadAnswers => {
                    let file = self.last_file(CorrectionStage::UploadAnswers)?;
                    self.upload_answers(file).await.map(|_| ())
                }
                _ => {
                    let file = self.last_file(CorrectionStage::UploadAnswerKey)?;
                    self.upload_answer_key(file).await
                }
            },
            WizardPhase::Failed(FailedStage::Processing) => self.run_correction().await,
            other => Err(WizardError::InvalidTransition {
                from: other.name().to_string(),
                event: format!("{:?}", PhaseEvent::Retry),
            }
            .into()),
        }
    }

    /// 定稿并保存
    pub async fn finalize(&mut self) -> AppResult<Record<FinalizedCorrection>> {
        self.ensure_editable()?;
        self.ensure_stage(CorrectionStage::Finalize)?;

        let aggregate = self.state.review.aggregate();
        let marks = self
            .state
            .review
            .items()
            .iter()
            .map(|item| FinalizedMark {
                question_no: item.body.question_no,
                awarded: item.current_score,
                max_mark: item.max_score,
                ai_mark: item.body.ai_mark,
                feedback: item.feedback.clone(),
                reviewed: item.reviewed,
            })
            .collect();
        let correction = FinalizedCorrection {
            paper_id: self.state.paper_id.clone().unwrap_or_default(),
            student_file: self
                .state
                .answers
                .file()
                .map(|f| f.name.clone())
                .unwrap_or_default(),
            marks,
            earned: aggregate.earned,
            total: aggregate.total,
            finalized_at: Utc::now(),
        };

        let record = match self.repository.add(correction).await {
            Ok(record) => record,
            Err(e) => {
                warn!("[{}] ❌ 保存批改结果失败: {}", WIZARD, e);
                self.sink.emit(WizardEvent::Notice {
                    task: "finalize",
                    message: e.user_message(),
                });
                return Err(e);
            }
        };

        self.controller.finalize(&self.state)?;
        self.apply(PhaseEvent::Finalize);
        info!("[{}] ✅ 批改已定稿: {} 得分 {}", WIZARD, record.id, aggregate);
        self.saved = Some(record.clone());
        Ok(record)
    }

    /// 放弃当前进度，回到第一步
    pub fn reset(&mut self) -> AppResult<()> {
        self.ensure_editable()?;
        self.abort.abort();
        self.state.paper_id = None;
        self.state.answers.reset();
        self.state.answer_key.reset();
        self.discard_results();
        self.controller.reset();
        self.apply(PhaseEvent::Reset);
        self.apply(PhaseEvent::Begin);
        info!("[{}] 🔄 向导已重置", WIZARD);
        Ok(())
    }

    fn correction_request(&self) -> AppResult<CorrectionRequest> {
        let paper_id = self
            .state
            .paper_id
            .clone()
            .ok_or(ValidationError::MissingField("paper_id".to_string()))?;
        let answers = match (self.state.answers.file(), self.state.answers.is_succeeded()) {
            (Some(file), true) => file.clone(),
            _ => {
                return Err(WizardError::GuardNotSatisfied {
                    stage: CorrectionStage::UploadAnswers.label(),
                }
                .into())
            }
        };
        let answer_key_id = match (self.state.answer_key.receipt(), self.state.answer_key.file()) {
            (Some(receipt), Some(file)) => receipt
                .file_id
                .clone()
                .unwrap_or_else(|| file.name.clone()),
            _ => {
                return Err(WizardError::GuardNotSatisfied {
                    stage: CorrectionStage::UploadAnswerKey.label(),
                }
                .into())
            }
        };

        Ok(CorrectionRequest {
            paper_id,
            answers,
            answer_key_id,
        })
    }

    fn last_file(&self, stage: CorrectionStage) -> Result<FilePayload, WizardError> {
        let task = match stage {
            CorrectionStage::UploadAnswers => &self.state.answers,
            _ => &self.state.answer_key,
        };
        task.file()
            .cloned()
            .ok_or(WizardError::GuardNotSatisfied {
                stage: stage.label(),
            })
    }

    fn settle_upload(&mut self, result: AppResult<UploadReceipt>) -> AppResult<UploadReceipt> {
        if let Err(AppError::Api(_)) = &result {
            self.apply(PhaseEvent::UploadFailed);
        }
        result
    }

    fn ensure_stage(&self, expected: CorrectionStage) -> Result<(), WizardError> {
        let actual = self.stage();
        if actual != expected {
            return Err(WizardError::WrongStage {
                expected: expected.label(),
                actual: actual.label(),
            });
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), WizardError> {
        if self.controller.is_finalized() {
            return Err(WizardError::AlreadyFinalized);
        }
        Ok(())
    }

    /// 重新上传会让已有的批改结果作废
    fn prepare_upload(&mut self) {
        match self.phase {
            WizardPhase::Failed(FailedStage::Uploading) => self.apply(PhaseEvent::Retry),
            WizardPhase::Processing
            | WizardPhase::Failed(FailedStage::Processing)
            | WizardPhase::Reviewing => {
                self.discard_results();
                self.apply(PhaseEvent::Rewind(WizardPhase::Uploading));
            }
            _ => {}
        }
    }

    fn enter_processing(&mut self) -> Result<(), WizardError> {
        match self.phase {
            WizardPhase::Failed(FailedStage::Processing) => self.transition(PhaseEvent::Retry),
            WizardPhase::Reviewing => {
                self.discard_results();
                self.transition(PhaseEvent::Rewind(WizardPhase::Uploading))?;
                self.transition(PhaseEvent::ProcessingStarted)
            }
            _ => self.transition(PhaseEvent::ProcessingStarted),
        }
    }

    fn discard_results(&mut self) {
        self.state.correction.reset();
        self.state.review = ReviewableResultSet::default();
    }

    fn transition(&mut self, event: PhaseEvent) -> Result<(), WizardError> {
        let next = self.phase.on(event)?;
        if next != self.phase {
            info!("[{}] {} → {}", WIZARD, self.phase.name(), next.name());
        }
        self.phase = next;
        Ok(())
    }

    fn apply(&mut self, event: PhaseEvent) {
        if let Err(e) = self.transition(event) {
            warn!("[{}] ⚠️ {}", WIZARD, e);
        }
    }
}

impl Drop for CorrectionWizard {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MemoryBackend, Operation};
    use crate::events::RecordingSink;
    use crate::repository::InMemoryRepository;
    use crate::tasks::{FixedStepSimulator, ProcessingStatus, UploadStatus};

    fn wizard(backend: Arc<MemoryBackend>) -> (CorrectionWizard, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let wizard = CorrectionWizard::new(
            backend,
            Arc::new(InMemoryRepository::new("corrections")),
            WizardTimings::default(),
            sink.clone(),
        )
        .with_simulator(FixedStepSimulator::new(3));
        (wizard, sink)
    }

    fn scan() -> FilePayload {
        FilePayload::new("zhang_san.jpg", "image/jpeg", vec![9u8; 2048])
    }

    fn key() -> FilePayload {
        FilePayload::new("key.pdf", "application/pdf", vec![1u8; 1024])
    }

    #[test]
    fn test_empty_paper_id_is_inline_error() {
        let (mut wizard, sink) = wizard(Arc::new(MemoryBackend::new()));
        assert!(matches!(
            wizard.select_paper("  "),
            Err(AppError::Validation(ValidationError::MissingField(_)))
        ));
        assert!(!wizard.next());
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, WizardEvent::ValidationFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_png_answer_key_rejected_without_network() {
        let backend = Arc::new(MemoryBackend::new());
        let (mut wizard, _) = wizard(backend.clone());
        wizard.select_paper("paper-1").unwrap();
        wizard.next();
        wizard.upload_answers(scan()).await.unwrap();
        assert_eq!(wizard.stage(), CorrectionStage::UploadAnswerKey);
        let uploads_before = backend.calls(Operation::Upload);

        let png = FilePayload::new("key.png", "image/png", vec![1u8; 1024]);
        let err = wizard.upload_answer_key(png).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(backend.calls(Operation::Upload), uploads_before);
        assert_eq!(wizard.answer_key().status(), UploadStatus::Idle);
        assert!(wizard.answer_key().validation_error().is_some());
        assert!(!wizard.can_advance());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_mode_runs_background_job() {
        let backend = Arc::new(MemoryBackend::new().with_job_polls(3));
        let (wizard, sink) = wizard(backend.clone());
        let mut wizard = wizard.with_mode(CorrectionMode::Polling);
        wizard.select_paper("paper-1").unwrap();
        wizard.next();
        wizard.upload_answers(scan()).await.unwrap();
        wizard.upload_answer_key(key()).await.unwrap();

        assert_eq!(wizard.stage(), CorrectionStage::Review);
        assert_eq!(backend.calls(Operation::StartJob), 1);
        assert_eq!(backend.calls(Operation::PollJob), 3);
        assert_eq!(backend.calls(Operation::Correct), 0);
        let shown = sink.processing_percents("correct");
        assert_eq!(shown.last(), Some(&100));
        assert!(shown.windows(2).all(|w| w[1] >= w[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_failure_keeps_stage_and_retries() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next(Operation::Correct, Some("答题卡无法识别"));
        let (mut wizard, sink) = wizard(backend.clone());
        wizard.select_paper("paper-1").unwrap();
        wizard.next();
        wizard.upload_answers(scan()).await.unwrap();

        let err = wizard.upload_answer_key(key()).await.unwrap_err();
        assert_eq!(err.user_message(), "答题卡无法识别");
        assert_eq!(wizard.stage(), CorrectionStage::UploadAnswerKey);
        assert_eq!(wizard.phase(), WizardPhase::Failed(FailedStage::Processing));
        assert_eq!(wizard.correction().status(), ProcessingStatus::Failed);
        assert!(!wizard.can_advance());
        assert!(sink.notices().contains(&"答题卡无法识别".to_string()));

        wizard.retry().await.unwrap();
        assert_eq!(wizard.stage(), CorrectionStage::Review);
        assert_eq!(backend.calls(Operation::Correct), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjusted_marks_are_saved() {
        let (mut wizard, _) = wizard(Arc::new(MemoryBackend::new()));
        wizard.select_paper("paper-1").unwrap();
        wizard.next();
        wizard.upload_answers(scan()).await.unwrap();
        wizard.upload_answer_key(key()).await.unwrap();

        assert_eq!(wizard.review().aggregate().to_string(), "11.5/15");
        let review = wizard.review_mut().unwrap();
        review.set_score(3, 3.0).unwrap();
        review.toggle_reviewed(3).unwrap();
        wizard.next();

        let record = wizard.finalize().await.unwrap();
        assert_eq!(record.value.earned, 13.0);
        assert_eq!(record.value.total, 15.0);
        assert_eq!(record.value.student_file, "zhang_san.jpg");
        assert!(record.value.marks[2].reviewed);
        assert_eq!(record.value.marks[2].ai_mark, 1.5);
    }
}
