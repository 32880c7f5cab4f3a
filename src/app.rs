//! 应用编排层
//!
//! 命令行运行时依次驱动两个向导：先用源文档出一份试卷，再批改一份学生答卷。
//! 每个向导都按界面上的顺序走完所有步骤，参数取目录里的第一个可选项。

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::clients::{ApiClient, Backend, HttpBackend};
use crate::config::Config;
use crate::events::{EventSink, TracingSink};
use crate::models::{load_catalog, CatalogTree, Difficulty, FilePayload};
use crate::repository::HttpRepository;
use crate::session::{Credentials, MemorySession};
use crate::utils::logging::{init_log_file, log_startup, print_run_summary};
use crate::wizard::{CorrectionMode, CorrectionWizard, GeneratorWizard, QUESTION_TYPES};

/// 运行统计
#[derive(Debug, Default)]
struct RunStats {
    finalized: usize,
    failed: usize,
}

impl RunStats {
    fn record(&mut self, name: &str, result: Result<()>) {
        match result {
            Ok(()) => self.finalized += 1,
            Err(e) => {
                error!("[{}] ❌ 向导未完成: {:#}", name, e);
                self.failed += 1;
            }
        }
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    api: ApiClient,
    backend: Arc<dyn Backend>,
    sink: Arc<dyn EventSink>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(&config.api_base_url);

        let session = Arc::new(MemorySession::new());
        let api = ApiClient::new(
            config.api_base_url.clone(),
            config.request_timeout(),
            session.clone(),
        )?;
        let backend = Arc::new(HttpBackend::new(api.clone()));

        // 有账号就先登录，之后的请求都带上 token
        if let (Some(email), Some(password)) = (&config.login_email, &config.login_password) {
            let credentials = Credentials {
                email: email.clone(),
                password: password.clone(),
            };
            let grant = backend
                .authenticate(&credentials)
                .await
                .map_err(|e| anyhow::anyhow!("登录失败: {}", e.user_message()))?;
            session.store(grant);
        } else {
            warn!("⚠️ 未配置登录账号，以匿名身份访问后端");
        }

        Ok(Self {
            config,
            api,
            backend,
            sink: Arc::new(TracingSink),
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let mut stats = RunStats::default();

        match &self.config.source_document {
            Some(path) => {
                let result = self.run_generator(Path::new(path)).await;
                stats.record("generator", result);
            }
            None => info!("💡 未配置 SOURCE_DOCUMENT，跳过出题"),
        }

        match (&self.config.answer_sheet, &self.config.answer_key) {
            (Some(sheet), Some(key)) => {
                let result = self
                    .run_correction(Path::new(sheet), Path::new(key))
                    .await;
                stats.record("correction", result);
            }
            _ => info!("💡 未配置 ANSWER_SHEET / ANSWER_KEY，跳过批改"),
        }

        print_run_summary(stats.finalized, stats.failed, &self.config.output_log_file);
        Ok(())
    }

    /// 出题向导：填参数 → 上传 → 生成 → 复核 → 定稿
    async fn run_generator(&self, source_path: &Path) -> Result<()> {
        let catalog = Arc::new(load_catalog(Path::new(&self.config.catalog_path)).await?);
        let repository = Arc::new(HttpRepository::new(self.api.clone(), "papers"));
        let mut wizard = GeneratorWizard::new(
            self.backend.clone(),
            repository,
            catalog.clone(),
            self.config.timings(),
            self.sink.clone(),
        );

        fill_form(&mut wizard, &catalog)?;
        if !wizard.next() {
            anyhow::bail!("出题参数不完整");
        }

        let file = FilePayload::from_path(source_path).await?;
        wizard.upload_source(file, "").await?;
        wizard.generate().await?;

        info!(
            "📋 《{}》共 {} 道题, 总分 {}",
            wizard.paper_title(),
            wizard.review().len(),
            wizard.review().aggregate().total
        );
        wizard.next();
        let record = wizard.finalize().await?;
        info!("✓ 试卷已保存: {}", record.id);
        Ok(())
    }

    /// 批改向导：选试卷 → 上传答卷 → 上传参考答案并批改 → 复核 → 定稿
    async fn run_correction(&self, sheet_path: &Path, key_path: &Path) -> Result<()> {
        let paper_id = self
            .config
            .paper_id
            .as_deref()
            .context("批改需要 PAPER_ID")?;
        let mode = if self.config.correction_polling {
            CorrectionMode::Polling
        } else {
            CorrectionMode::Simulated
        };
        let repository = Arc::new(HttpRepository::new(self.api.clone(), "corrections"));
        let mut wizard = CorrectionWizard::new(
            self.backend.clone(),
            repository,
            self.config.timings(),
            self.sink.clone(),
        )
        .with_mode(mode);

        wizard.select_paper(paper_id)?;
        wizard.next();

        let answers = FilePayload::from_path(sheet_path).await?;
        wizard.upload_answers(answers).await?;

        let key = FilePayload::from_path(key_path).await?;
        wizard.upload_answer_key(key).await?;

        // 命令行下直接采用 AI 给分
        info!("📋 AI 评分: {}", wizard.review().aggregate());
        wizard.next();
        let record = wizard.finalize().await?;
        info!("✓ 批改结果已保存: {}", record.id);
        Ok(())
    }
}

/// 每一层都选第一个可选项，其余参数取默认值
fn fill_form(wizard: &mut GeneratorWizard, catalog: &CatalogTree) -> Result<()> {
    let form = wizard.form_mut()?;
    for key in catalog.levels.iter() {
        let first = form
            .options(key)
            .into_iter()
            .next()
            .with_context(|| format!("目录中 {} 没有可选项", key))?;
        form.select(key, &first)?;
    }
    form.set_difficulty(Difficulty::default());
    if form.question_types().is_empty() {
        form.toggle_question_type(QUESTION_TYPES[0])?;
    }
    form.check()?;
    Ok(())
}
