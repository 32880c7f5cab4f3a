//! 向导层
//!
//! - `controller` - 阶段顺序与守卫
//! - `state` - 向导生命周期状态机
//! - `select_chain` / `form` - 级联下拉与出题参数表单
//! - `generator` - 出题向导
//! - `correction` - 批改向导

pub mod controller;
pub mod correction;
pub mod form;
pub mod generator;
pub mod select_chain;
pub mod state;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use controller::{Guard, StageId, WizardController};
pub use correction::{CorrectionMode, CorrectionStage, CorrectionWizard};
pub use form::{GenerationForm, QUESTION_TYPES};
pub use generator::{GeneratorStage, GeneratorWizard};
pub use select_chain::{DependentSelectChain, OptionSource};
pub use state::{FailedStage, PhaseEvent, WizardPhase};

/// 中止句柄
///
/// 可以在别的任务里持有，用来打断向导正在进行的上传或处理。
/// 只影响当时正在进行的操作，之后的操作会换用新的令牌。
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打断正在进行的操作
    pub fn abort(&self) {
        if let Ok(token) = self.current.lock() {
            token.cancel();
        }
    }

    /// 给新操作用的令牌，上一个已被取消时换一个新的
    pub(crate) fn token(&self) -> CancellationToken {
        match self.current.lock() {
            Ok(mut token) => {
                if token.is_cancelled() {
                    *token = CancellationToken::new();
                }
                token.clone()
            }
            Err(_) => CancellationToken::new(),
        }
    }
}

/// 成功后等一小会儿再进入下一步，期间被取消则返回 false
pub(crate) async fn wait_before_advance(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_only_hits_current_token() {
        let handle = AbortHandle::new();
        let first = handle.token();
        handle.abort();
        assert!(first.is_cancelled());

        let second = handle.token();
        assert!(!second.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_before_advance_observes_cancel() {
        let cancel = CancellationToken::new();
        assert!(wait_before_advance(&cancel, Duration::from_millis(800)).await);

        cancel.cancel();
        assert!(!wait_before_advance(&cancel, Duration::from_secs(60)).await);
    }
}
