//! 出题向导
//!
//! 填写参数 → 上传源文档 → 生成题目（模拟进度）→ 复核 / 编辑 → 定稿
//!
//! 上传成功后，抽取的文本会补全空着的主题关键词。上传和生成成功后
//! 都会在短暂延迟后自动进入下一步。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::clients::Backend;
use crate::config::WizardTimings;
use crate::error::{AppError, AppResult, WizardError};
use crate::events::{EventSink, WizardEvent};
use crate::models::{
    CatalogTree, FilePayload, FinalizedPaper, FinalizedQuestion, GeneratedPaper,
    GeneratedQuestion, GenerationRequest, RegenerateRequest, UploadReceipt,
};
use crate::repository::{Record, Repository};
use crate::review::ReviewableResultSet;
use crate::tasks::{
    validate_page_range, FileRule, PhaseTable, ProcessingTask, ProgressSimulator,
    SimulatedDriver, UploadTask,
};
use crate::utils::truncate_text;
use crate::wizard::controller::{StageId, WizardController};
use crate::wizard::form::GenerationForm;
use crate::wizard::state::{FailedStage, PhaseEvent, WizardPhase};
use crate::wizard::{wait_before_advance, AbortHandle};

const WIZARD: &str = "generator";

/// 出题向导的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum GeneratorStage {
    Configure,
    UploadSource,
    Generate,
    Review,
    Summary,
}

impl StageId for GeneratorStage {
    fn label(self) -> &'static str {
        match self {
            GeneratorStage::Configure => "configure",
            GeneratorStage::UploadSource => "upload_source",
            GeneratorStage::Generate => "generate",
            GeneratorStage::Review => "review",
            GeneratorStage::Summary => "summary",
        }
    }
}

/// 守卫读取的向导数据
struct GeneratorState {
    form: GenerationForm,
    source: UploadTask,
    generation: ProcessingTask<GeneratedPaper>,
    review: ReviewableResultSet<GeneratedQuestion>,
    paper_title: String,
    page_range: String,
}

/// 出题向导
pub struct GeneratorWizard {
    controller: WizardController<GeneratorStage, GeneratorState>,
    state: GeneratorState,
    phase: WizardPhase,
    backend: Arc<dyn Backend>,
    repository: Arc<dyn Repository<FinalizedPaper>>,
    timings: WizardTimings,
    driver: SimulatedDriver,
    abort: AbortHandle,
    sink: Arc<dyn EventSink>,
    saved: Option<Record<FinalizedPaper>>,
}

impl GeneratorWizard {
    pub fn new(
        backend: Arc<dyn Backend>,
        repository: Arc<dyn Repository<FinalizedPaper>>,
        catalog: Arc<CatalogTree>,
        timings: WizardTimings,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let controller = WizardController::<GeneratorStage, GeneratorState>::new(
            WIZARD,
            GeneratorStage::Configure,
            [
                GeneratorStage::UploadSource,
                GeneratorStage::Generate,
                GeneratorStage::Review,
                GeneratorStage::Summary,
            ],
            sink.clone(),
        )
        .with_guard(GeneratorStage::Configure, |s| s.form.is_complete())
        .with_guard(GeneratorStage::UploadSource, |s| s.source.is_succeeded())
        .with_guard(GeneratorStage::Generate, |s| s.generation.is_succeeded());

        let state = GeneratorState {
            form: GenerationForm::from_catalog(catalog),
            source: UploadTask::new(
                "source_document",
                FileRule::pdf_only().with_max_bytes(timings.max_upload_bytes),
                sink.clone(),
            ),
            generation: ProcessingTask::new("generate", PhaseTable::generation(), sink.clone()),
            review: ReviewableResultSet::default(),
            paper_title: String::new(),
            page_range: String::new(),
        };

        Self {
            controller,
            state,
            phase: WizardPhase::Configuring,
            backend,
            repository,
            timings,
            driver: SimulatedDriver::from_timings(&timings),
            abort: AbortHandle::new(),
            sink,
            saved: None,
        }
    }

    /// 替换模拟进度策略
    pub fn with_simulator(mut self, simulator: impl ProgressSimulator + 'static) -> Self {
        self.driver.simulator = Box::new(simulator);
        self
    }

    pub fn stage(&self) -> GeneratorStage {
        self.controller.current()
    }

    pub fn phase(&self) -> WizardPhase {
        self.phase
    }

    pub fn is_finalized(&self) -> bool {
        self.controller.is_finalized()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn form(&self) -> &GenerationForm {
        &self.state.form
    }

    pub fn form_mut(&mut self) -> AppResult<&mut GenerationForm> {
        self.ensure_editable()?;
        Ok(&mut self.state.form)
    }

    pub fn source(&self) -> &UploadTask {
        &self.state.source
    }

    pub fn generation(&self) -> &ProcessingTask<GeneratedPaper> {
        &self.state.generation
    }

    pub fn review(&self) -> &ReviewableResultSet<GeneratedQuestion> {
        &self.state.review
    }

    pub fn review_mut(&mut self) -> AppResult<&mut ReviewableResultSet<GeneratedQuestion>> {
        self.ensure_editable()?;
        Ok(&mut self.state.review)
    }

    pub fn paper_title(&self) -> &str {
        &self.state.paper_title
    }

    /// 定稿后保存的记录
    pub fn saved(&self) -> Option<&Record<FinalizedPaper>> {
        self.saved.as_ref()
    }

    pub fn can_advance(&self) -> bool {
        self.controller.can_advance(&self.state)
    }

    /// 下一步
    pub fn next(&mut self) -> bool {
        let moved = self.controller.advance(&self.state);
        if moved && self.phase == WizardPhase::Configuring {
            self.apply(PhaseEvent::Configured);
        }
        moved
    }

    /// 上一步，已填写的内容都保留
    pub fn back(&mut self) -> bool {
        self.controller.retreat()
    }

    /// 上传源文档
    ///
    /// `page_range` 为空表示全部页。成功后等待自动前进的延迟，然后进入生成步骤。
    pub async fn upload_source(
        &mut self,
        file: FilePayload,
        page_range: &str,
    ) -> AppResult<UploadReceipt> {
        self.ensure_stage(GeneratorStage::UploadSource)?;
        let range = validate_page_range(page_range).map_err(|e| {
            self.sink.emit(WizardEvent::ValidationFailed {
                task: self.state.source.label(),
                message: e.to_string(),
            });
            e
        })?;
        self.state.source.validate(&file)?;
        self.prepare_upload();
        self.state.page_range = page_range.to_string();

        let cancel = self.abort.token();
        let backend = self.backend.clone();
        let result = self
            .state
            .source
            .start(file, &cancel, move |file, tx| async move {
                backend.upload_document(file, range, tx).await
            })
            .await;

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                if matches!(e, AppError::Api(_)) {
                    self.apply(PhaseEvent::UploadFailed);
                }
                return Err(e);
            }
        };

        if let Some(text) = receipt.extracted_text.as_deref() {
            if self.state.form.fill_topics_from(text) {
                info!(
                    "[{}] 📝 用源文档内容补全关键词: {}",
                    WIZARD,
                    truncate_text(&self.state.form.topics().join(" "), 40)
                );
            }
        }

        if wait_before_advance(&cancel, self.timings.auto_advance_delay).await {
            self.next();
        }
        Ok(receipt)
    }

    /// 生成试卷
    ///
    /// 后端不汇报进度，这里用模拟进度显示；失败后再次调用即为重试。
    pub async fn generate(&mut self) -> AppResult<()> {
        self.ensure_stage(GeneratorStage::Generate)?;
        let params = self.state.form.to_params()?;
        let source = match (self.state.source.file(), self.state.source.is_succeeded()) {
            (Some(file), true) => file.clone(),
            _ => {
                return Err(WizardError::GuardNotSatisfied {
                    stage: GeneratorStage::UploadSource.label(),
                }
                .into())
            }
        };
        let request = GenerationRequest {
            source,
            source_text: self
                .state
                .source
                .receipt()
                .and_then(|r| r.extracted_text.clone()),
            params,
        };

        self.enter_processing()?;
        info!(
            "[{}] 🧠 开始生成: {} 道题, 题型 {:?}",
            WIZARD, request.params.question_count, request.params.question_types
        );

        let cancel = self.abort.token();
        let backend = self.backend.clone();
        let result = self
            .state
            .generation
            .run_simulated(&mut self.driver, &cancel, async move {
                backend.generate_paper(request).await
            })
            .await;

        match result {
            Ok(()) => {
                if let Some(paper) = self.state.generation.result() {
                    self.state.paper_title = paper.title.clone();
                    self.state.review = ReviewableResultSet::from_bodies(paper.questions.clone());
                }
                info!(
                    "[{}] ✓ 生成完成: 《{}》共 {} 道题",
                    WIZARD,
                    self.state.paper_title,
                    self.state.review.len()
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

    /// 重试失败的步骤，输入保持不变
    pub async fn retry(&mut self) -> AppResult<()> {
        match self.phase {
            WizardPhase::Failed(FailedStage::Uploading) => {
                let file = self.state.source.file().cloned().ok_or(
                    WizardError::GuardNotSatisfied {
                        stage: GeneratorStage::UploadSource.label(),
                    },
                )?;
                let range = self.state.page_range.clone();
                self.upload_source(file, &range).await.map(|_| ())
            }
            WizardPhase::Failed(FailedStage::Processing) => self.generate().await,
            other => Err(WizardError::InvalidTransition {
                from: other.name().to_string(),
                event: format!("{:?}", PhaseEvent::Retry),
            }
            .into()),
        }
    }

    /// 重新生成一道题，ID 和位置不变
    pub async fn regenerate_question(&mut self, id: u32) -> AppResult<()> {
        self.ensure_editable()?;
        let params = self.state.form.to_params()?;
        let paper_title = self.state.paper_title.clone();
        let backend = self.backend.clone();

        let result = self
            .state
            .review
            .regenerate(id, move |question: &GeneratedQuestion| {
                let request = RegenerateRequest {
                    paper_title,
                    question: question.clone(),
                    params,
                };
                async move { backend.regenerate_question(request).await }
            })
            .await
            .map(|_| ());

        if let Err(e) = &result {
            warn!("[{}] ❌ 第 {} 题重新生成失败: {}", WIZARD, id, e);
            self.sink.emit(WizardEvent::Notice {
                task: "regenerate",
                message: e.user_message(),
            });
        }
        result
    }

    /// 定稿并保存
    pub async fn finalize(&mut self) -> AppResult<Record<FinalizedPaper>> {
        self.ensure_editable()?;
        self.ensure_stage(GeneratorStage::Summary)?;
        let params = self.state.form.to_params()?;

        let questions: Vec<FinalizedQuestion> = self
            .state
            .review
            .items()
            .iter()
            .enumerate()
            .map(|(i, item)| FinalizedQuestion {
                number: i as u32 + 1,
                text: item.body.text.clone(),
                marks: item.max_score,
                model_answer: item.body.model_answer.clone(),
                note: item.feedback.clone(),
            })
            .collect();
        let paper = FinalizedPaper {
            title: self.state.paper_title.clone(),
            params,
            total_marks: self.state.review.aggregate().total,
            questions,
            finalized_at: Utc::now(),
        };

        let record = match self.repository.add(paper).await {
            Ok(record) => record,
            Err(e) => {
                warn!("[{}] ❌ 保存试卷失败: {}", WIZARD, e);
                self.sink.emit(WizardEvent::Notice {
                    task: "finalize",
                    message: e.user_message(),
                });
                return Err(e);
            }
        };

        self.controller.finalize(&self.state)?;
        self.apply(PhaseEvent::Finalize);
        info!("[{}] ✅ 试卷已定稿: {}", WIZARD, record.id);
        self.saved = Some(record.clone());
        Ok(record)
    }

    /// 放弃当前进度，回到第一步
    pub fn reset(&mut self) -> AppResult<()> {
        self.ensure_editable()?;
        self.abort.abort();
        self.state.source.reset();
        self.state.generation.reset();
        self.state.review = ReviewableResultSet::default();
        self.state.form.reset();
        self.state.paper_title.clear();
        self.state.page_range.clear();
        self.controller.reset();
        self.apply(PhaseEvent::Reset);
        self.apply(PhaseEvent::Begin);
        info!("[{}] 🔄 向导已重置", WIZARD);
        Ok(())
    }

    fn ensure_stage(&self, expected: GeneratorStage) -> Result<(), WizardError> {
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

    /// 新的上传会让之后的生成结果作废
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
        self.state.generation.reset();
        self.state.review = ReviewableResultSet::default();
        self.state.paper_title.clear();
    }

    fn transition(&mut self, event: PhaseEvent) -> Result<(), WizardError> {
        let next = self.phase.on(event)?;
        if next != self.phase {
            info!("[{}] {} → {}", WIZARD, self.phase.name(), next.name());
        }
        self.phase = next;
        Ok(())
    }

    /// 内部驱动的转换按流程一定合法，出错只记日志
    fn apply(&mut self, event: PhaseEvent) {
        if let Err(e) = self.transition(event) {
            warn!("[{}] ⚠️ {}", WIZARD, e);
        }
    }
}

impl Drop for GeneratorWizard {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MemoryBackend, Operation};
    use crate::events::RecordingSink;
    use crate::models::catalog::sample_catalog;
    use crate::models::Difficulty;
    use crate::repository::InMemoryRepository;
    use crate::tasks::FixedStepSimulator;

    fn wizard(backend: Arc<MemoryBackend>) -> (GeneratorWizard, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let wizard = GeneratorWizard::new(
            backend,
            Arc::new(InMemoryRepository::new("papers")),
            Arc::new(sample_catalog()),
            WizardTimings::default(),
            sink.clone(),
        )
        .with_simulator(FixedStepSimulator::new(5));
        (wizard, sink)
    }

    fn fill(wizard: &mut GeneratorWizard) {
        let form = wizard.form_mut().unwrap();
        form.select("board", "人教版").unwrap();
        form.select("class", "八年级").unwrap();
        form.select("subject", "数学").unwrap();
        form.select("paper_type", "单元测试").unwrap();
        form.set_difficulty(Difficulty::Medium);
        form.toggle_question_type("简答题").unwrap();
    }

    fn pdf() -> FilePayload {
        FilePayload::new("source.pdf", "application/pdf", vec![1u8; 4096])
    }

    #[test]
    fn test_configure_guard_blocks_next() {
        let (mut wizard, _) = wizard(Arc::new(MemoryBackend::new()));
        assert!(!wizard.can_advance());
        assert!(!wizard.next());
        assert_eq!(wizard.stage(), GeneratorStage::Configure);

        fill(&mut wizard);
        assert!(wizard.next());
        assert_eq!(wizard.stage(), GeneratorStage::UploadSource);
        assert_eq!(wizard.phase(), WizardPhase::Uploading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_fills_topics_and_advances() {
        let (mut wizard, _) = wizard(Arc::new(MemoryBackend::new()));
        fill(&mut wizard);
        wizard.next();

        wizard.upload_source(pdf(), "1-2").await.unwrap();
        assert_eq!(wizard.stage(), GeneratorStage::Generate);
        assert_eq!(wizard.form().topics(), ["光合作用", "细胞呼吸"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_page_range_rejected_before_upload() {
        let backend = Arc::new(MemoryBackend::new());
        let (mut wizard, sink) = wizard(backend.clone());
        fill(&mut wizard);
        wizard.next();

        let err = wizard.upload_source(pdf(), "5-2").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(backend.calls(Operation::Upload), 0);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, WizardEvent::ValidationFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_then_regenerate_keeps_position() {
        let (mut wizard, _) = wizard(Arc::new(MemoryBackend::new()));
        fill(&mut wizard);
        wizard.next();
        wizard.upload_source(pdf(), "").await.unwrap();
        wizard.generate().await.unwrap();

        assert_eq!(wizard.stage(), GeneratorStage::Review);
        assert_eq!(wizard.phase(), WizardPhase::Reviewing);
        assert_eq!(wizard.review().ids(), vec![1, 2, 3]);

        wizard.regenerate_question(2).await.unwrap();
        assert_eq!(wizard.review().ids(), vec![1, 2, 3]);
        let item = wizard.review().get(2).unwrap();
        assert!(item.body.text.contains("换题 #1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_out_of_stage_is_rejected() {
        let (mut wizard, _) = wizard(Arc::new(MemoryBackend::new()));
        let err = wizard.generate().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Wizard(WizardError::WrongStage {
                expected: "generate",
                actual: "configure",
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_saves_and_locks() {
        let (mut wizard, sink) = wizard(Arc::new(MemoryBackend::new()));
        fill(&mut wizard);
        wizard.next();
        wizard.upload_source(pdf(), "").await.unwrap();
        wizard.generate().await.unwrap();
        wizard.review_mut().unwrap().remove_item(3).unwrap();
        wizard.next();

        let record = wizard.finalize().await.unwrap();
        assert_eq!(record.value.questions.len(), 2);
        assert_eq!(record.value.total_marks, 11.0);
        assert_eq!(wizard.phase(), WizardPhase::Finalized);
        assert!(!wizard.back());
        assert!(wizard.review_mut().is_err());
        assert!(wizard.reset().is_err());
        assert!(sink
            .events()
            .contains(&WizardEvent::Finalized { wizard: "generator" }));
    }
}
