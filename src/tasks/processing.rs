//! 后台处理任务
//!
//! 跟踪一个耗时的后端操作。进度有两种来源：
//! - 模拟：后端不汇报进度，本地计时器按策略推进，封顶在 ceiling；
//! - 轮询：定期查询后端任务状态。
//!
//! 两种方式都只有在请求真正成功后才会显示 100%。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WizardTimings;
use crate::error::{ApiError, AppError, AppResult, WizardError};
use crate::events::{EventSink, WizardEvent};
use crate::models::{JobSnapshot, JobState};
use crate::tasks::progress::{PhaseTable, ProgressSimulator, RandomStepSimulator};

/// 处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessingStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

/// 模拟进度驱动
pub struct SimulatedDriver {
    pub tick: Duration,
    pub ceiling: u8,
    pub timeout: Option<Duration>,
    pub simulator: Box<dyn ProgressSimulator>,
}

impl SimulatedDriver {
    pub fn from_timings(timings: &WizardTimings) -> Self {
        Self {
            tick: timings.simulated_tick,
            ceiling: timings.simulated_ceiling,
            timeout: timings.processing_timeout,
            simulator: Box::new(RandomStepSimulator::new()),
        }
    }

    pub fn with_simulator(mut self, simulator: impl ProgressSimulator + 'static) -> Self {
        self.simulator = Box::new(simulator);
        self
    }
}

/// 轮询驱动
#[derive(Debug, Clone, Copy)]
pub struct PollingDriver {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl PollingDriver {
    pub fn from_timings(timings: &WizardTimings) -> Self {
        Self {
            interval: timings.poll_interval,
            timeout: timings.processing_timeout,
        }
    }
}

/// 计时器周期下限，`interval` 不接受 0
const MIN_PERIOD: Duration = Duration::from_millis(1);

enum Outcome<T> {
    Done(Result<T, ApiError>),
    TimedOut,
    Cancelled,
}

/// 后台处理任务
pub struct ProcessingTask<T> {
    label: &'static str,
    phases: PhaseTable,
    status: ProcessingStatus,
    progress: u8,
    result: Option<T>,
    error: Option<String>,
    sink: Arc<dyn EventSink>,
}

impl<T> ProcessingTask<T> {
    pub fn new(label: &'static str, phases: PhaseTable, sink: Arc<dyn EventSink>) -> Self {
        Self {
            label,
            phases,
            status: ProcessingStatus::NotStarted,
            progress: 0,
            result: None,
            error: None,
            sink,
        }
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// 当前阶段文案，由进度唯一决定
    pub fn phase_message(&self) -> &'static str {
        self.phases.message(self.progress)
    }

    pub fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == ProcessingStatus::Succeeded
    }

    /// 用模拟进度跟踪一个不汇报进度的请求
    pub async fn run_simulated<Fut>(
        &mut self,
        driver: &mut SimulatedDriver,
        cancel: &CancellationToken,
        request: Fut,
    ) -> AppResult<()>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.begin();
        let deadline = driver.timeout.map(|limit| Instant::now() + limit);
        let ceiling = driver.ceiling.min(99);

        let tick = driver.tick.max(MIN_PERIOD);
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(request);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Outcome::Cancelled,
                result = &mut request => break Outcome::Done(result),
                _ = sleep_until_opt(deadline) => break Outcome::TimedOut,
                _ = ticker.tick() => {
                    let next = driver.simulator.tick(self.progress).min(ceiling);
                    self.advance_to(next);
                }
            }
        };

        // 先停掉计时器，再写最终状态
        drop(ticker);
        self.settle(outcome, driver.timeout)
    }

    /// 轮询后端任务状态直到结束
    pub async fn run_polling<P, Fut>(
        &mut self,
        driver: &PollingDriver,
        cancel: &CancellationToken,
        mut poll: P,
    ) -> AppResult<()>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<JobSnapshot<T>, ApiError>>,
    {
        self.begin();
        let deadline = driver.timeout.map(|limit| Instant::now() + limit);

        let period = driver.interval.max(MIN_PERIOD);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Outcome::Cancelled,
                _ = sleep_until_opt(deadline) => break Outcome::TimedOut,
                _ = ticker.tick() => {}
            }

            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Outcome::Cancelled,
                _ = sleep_until_opt(deadline) => break Outcome::TimedOut,
                snapshot = poll() => snapshot,
            };

            match snapshot {
                Err(e) => break Outcome::Done(Err(e)),
                Ok(snapshot) => match snapshot.state {
                    JobState::Succeeded => match snapshot.result {
                        Some(result) => break Outcome::Done(Ok(result)),
                        None => {
                            break Outcome::Done(Err(ApiError::JobFailed {
                                endpoint: self.label.to_string(),
                                message: snapshot.message,
                            }))
                        }
                    },
                    JobState::Failed => {
                        break Outcome::Done(Err(ApiError::JobFailed {
                            endpoint: self.label.to_string(),
                            message: snapshot.message,
                        }))
                    }
                    JobState::Queued | JobState::Running => {
                        if let Some(reported) = snapshot.progress {
                            self.advance_to(reported.min(99));
                        }
                    }
                },
            }
        };

        drop(ticker);
        self.settle(outcome, driver.timeout)
    }

    /// 回到初始状态
    pub fn reset(&mut self) {
        self.status = ProcessingStatus::NotStarted;
        self.progress = 0;
        self.result = None;
        self.error = None;
        self.emit_progress();
    }

    fn begin(&mut self) {
        info!("[{}] ⏳ 开始后台处理", self.label);
        self.status = ProcessingStatus::Running;
        self.progress = 0;
        self.result = None;
        self.error = None;
        self.emit_progress();
    }

    /// 进度只增不减
    fn advance_to(&mut self, next: u8) {
        if self.status != ProcessingStatus::Running || next <= self.progress {
            return;
        }
        self.progress = next;
        debug!("[{}] {}% {}", self.label, next, self.phase_message());
        self.emit_progress();
    }

    fn settle(&mut self, outcome: Outcome<T>, timeout: Option<Duration>) -> AppResult<()> {
        match outcome {
            Outcome::Done(Ok(result)) => {
                self.succeed(result);
                Ok(())
            }
            Outcome::Done(Err(e)) => {
                warn!("[{}] ❌ 后台处理失败: {}", self.label, e);
                self.fail(e.user_message());
                Err(AppError::Api(e))
            }
            Outcome::TimedOut => {
                let e = ApiError::Timeout {
                    endpoint: self.label.to_string(),
                    seconds: timeout.map(|d| d.as_secs()).unwrap_or_default(),
                };
                warn!("[{}] ❌ 后台处理超时", self.label);
                self.fail(e.user_message());
                Err(AppError::Api(e))
            }
            Outcome::Cancelled => {
                info!("[{}] 后台处理已取消", self.label);
                self.reset();
                Err(WizardError::Cancelled.into())
            }
        }
    }

    /// 状态、进度、结果一次写入
    fn succeed(&mut self, result: T) {
        self.status = ProcessingStatus::Succeeded;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
        info!("[{}] ✓ 后台处理完成", self.label);
        self.emit_progress();
    }

    fn fail(&mut self, message: String) {
        self.status = ProcessingStatus::Failed;
        self.result = None;
        self.error = Some(message.clone());
        self.emit_progress();
        self.sink.emit(WizardEvent::Notice {
            task: self.label,
            message,
        });
    }

    fn emit_progress(&self) {
        self.sink.emit(WizardEvent::ProcessingProgress {
            task: self.label,
            percent: self.progress,
            phase: self.phase_message(),
            status: self.status,
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::tasks::progress::FixedStepSimulator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn driver(step: u8) -> SimulatedDriver {
        SimulatedDriver {
            tick: Duration::from_secs(1),
            ceiling: 98,
            timeout: None,
            simulator: Box::new(FixedStepSimulator::new(step)),
        }
    }

    fn new_task(sink: &Arc<RecordingSink>) -> ProcessingTask<String> {
        ProcessingTask::new("generate", PhaseTable::generation(), sink.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_caps_below_100_until_response() {
        let sink = Arc::new(RecordingSink::new());
        let mut task = new_task(&sink);

        task.run_simulated(&mut driver(2), &CancellationToken::new(), async {
            sleep(Duration::from_secs(120)).await;
            Ok("试卷".to_string())
        })
        .await
        .unwrap();

        let shown = sink.processing_percents("generate");
        assert!(shown.windows(2).all(|w| w[1] >= w[0]));
        assert!(shown.contains(&98));
        assert_eq!(shown.iter().filter(|&&p| p == 100).count(), 1);
        assert_eq!(shown.last(), Some(&100));

        assert_eq!(task.status(), ProcessingStatus::Succeeded);
        assert_eq!(task.result().map(String::as_str), Some("试卷"));
        assert_eq!(task.phase_message(), "试卷已生成");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_at_98_never_shows_100() {
        let sink = Arc::new(RecordingSink::new());
        let mut task = new_task(&sink);

        let result = task
            .run_simulated(&mut driver(7), &CancellationToken::new(), async {
                sleep(Duration::from_secs(60)).await;
                Err(ApiError::BadResponse {
                    endpoint: "/papers/generate".to_string(),
                    status: 500,
                    message: Some("模型繁忙".to_string()),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(task.status(), ProcessingStatus::Failed);
        assert_eq!(task.progress(), 98);
        assert!(task.result().is_none());
        assert_eq!(task.error(), Some("模型繁忙"));
        assert!(!sink.processing_percents("generate").contains(&100));
        assert_eq!(sink.notices(), vec!["模型繁忙".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_after_completion() {
        let sink = Arc::new(RecordingSink::new());
        let mut task = new_task(&sink);

        task.run_simulated(&mut driver(1), &CancellationToken::new(), async {
            sleep(Duration::from_millis(3500)).await;
            Ok("done".to_string())
        })
        .await
        .unwrap();

        let count = sink.events().len();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(sink.events().len(), count);
        assert_eq!(task.progress(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_task() {
        let sink = Arc::new(RecordingSink::new());
        let mut task = new_task(&sink);
        let mut driver = driver(1);
        driver.timeout = Some(Duration::from_secs(5));

        let result = task
            .run_simulated(&mut driver, &CancellationToken::new(), async {
                sleep(Duration::from_secs(600)).await;
                Ok("late".to_string())
            })
            .await;

        assert!(matches!(
            result,
            Err(AppError::Api(ApiError::Timeout { seconds: 5, .. }))
        ));
        assert_eq!(task.status(), ProcessingStatus::Failed);
        assert!(task.progress() < 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_tears_down_and_resets() {
        let sink = Arc::new(RecordingSink::new());
        let mut task = new_task(&sink);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(10)).await;
            trigger.cancel();
        });

        let result = task
            .run_simulated(&mut driver(3), &cancel, async {
                sleep(Duration::from_secs(600)).await;
                Ok("never".to_string())
            })
            .await;

        assert!(matches!(result, Err(AppError::Wizard(WizardError::Cancelled))));
        assert_eq!(task.status(), ProcessingStatus::NotStarted);

        let count = sink.events().len();
        sleep(Duration::from_secs(60)).await;
        assert_eq!(sink.events().len(), count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_periods_do_not_panic() {
        let sink = Arc::new(RecordingSink::new());
        let mut task = new_task(&sink);
        let mut simulated = driver(10);
        simulated.tick = Duration::ZERO;

        task.run_simulated(&mut simulated, &CancellationToken::new(), async {
            sleep(Duration::from_millis(50)).await;
            Ok("快".to_string())
        })
        .await
        .unwrap();
        assert_eq!(task.status(), ProcessingStatus::Succeeded);

        let polling = PollingDriver {
            interval: Duration::ZERO,
            timeout: None,
        };
        task.run_polling(&polling, &CancellationToken::new(), || async {
            Ok(JobSnapshot {
                state: JobState::Succeeded,
                progress: None,
                message: None,
                result: Some("轮询".to_string()),
            })
        })
        .await
        .unwrap();
        assert_eq!(task.result().map(String::as_str), Some("轮询"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_until_success() {
        let sink = Arc::new(RecordingSink::new());
        let mut task = new_task(&sink);
        let calls = AtomicUsize::new(0);
        let reports = [10u8, 45, 30, 80];

        let driver = PollingDriver {
            interval: Duration::from_secs(1),
            timeout: None,
        };
        task.run_polling(&driver, &CancellationToken::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < reports.len() {
                    Ok(JobSnapshot {
                        state: JobState::Running,
                        progress: Some(reports[n]),
                        message: None,
                        result: None,
                    })
                } else {
                    Ok(JobSnapshot {
                        state: JobState::Succeeded,
                        progress: Some(100),
                        message: None,
                        result: Some("ok".to_string()),
                    })
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(
            sink.processing_percents("generate"),
            vec![0, 10, 45, 80, 100]
        );
        assert_eq!(task.result().map(String::as_str), Some("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_reports_job_failure_message() {
        let sink = Arc::new(RecordingSink::new());
        let mut task = new_task(&sink);
        let driver = PollingDriver {
            interval: Duration::from_secs(1),
            timeout: None,
        };

        let result = task
            .run_polling(&driver, &CancellationToken::new(), || async {
                Ok(JobSnapshot::<String> {
                    state: JobState::Failed,
                    progress: Some(40),
                    message: Some("答题卡模糊".to_string()),
                    result: None,
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(task.status(), ProcessingStatus::Failed);
        assert_eq!(task.error(), Some("答题卡模糊"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_report_of_100_is_capped() {
        let sink = Arc::new(RecordingSink::new());
        let mut task = new_task(&sink);
        let calls = AtomicUsize::new(0);
        let driver = PollingDriver {
            interval: Duration::from_secs(1),
            timeout: Some(Duration::from_millis(2500)),
        };

        let result = task
            .run_polling(&driver, &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Ok(JobSnapshot::<String> {
                        state: JobState::Running,
                        progress: Some(100),
                        message: None,
                        result: None,
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!sink.processing_percents("generate").contains(&100));
    }
}
