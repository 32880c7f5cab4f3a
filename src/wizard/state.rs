//! 向导生命周期状态机
//!
//! ```text
//! Idle → Configuring → Uploading → Processing → Reviewing → Finalized
//!                          ↓            ↓
//!                  Failed(Uploading)  Failed(Processing)
//! ```
//!
//! 失败后重试回到同一阶段；`Finalized` 之后不再接受任何事件。

use serde::Serialize;

use crate::error::WizardError;

/// 可能失败的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailedStage {
    Uploading,
    Processing,
}

/// 向导所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WizardPhase {
    Idle,
    Configuring,
    Uploading,
    Processing,
    Reviewing,
    Finalized,
    Failed(FailedStage),
}

/// 驱动状态机的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Begin,
    Configured,
    UploadFailed,
    ProcessingStarted,
    ProcessingSucceeded,
    ProcessingFailed,
    Retry,
    /// 回到更早的阶段，下游结果作废
    Rewind(WizardPhase),
    Finalize,
    Reset,
}

impl WizardPhase {
    pub fn name(self) -> &'static str {
        match self {
            WizardPhase::Idle => "Idle",
            WizardPhase::Configuring => "Configuring",
            WizardPhase::Uploading => "Uploading",
            WizardPhase::Processing => "Processing",
            WizardPhase::Reviewing => "Reviewing",
            WizardPhase::Finalized => "Finalized",
            WizardPhase::Failed(FailedStage::Uploading) => "Failed(Uploading)",
            WizardPhase::Failed(FailedStage::Processing) => "Failed(Processing)",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == WizardPhase::Finalized
    }

    /// 在主流程上的位置，失败状态按所在阶段计算
    fn rank(self) -> u8 {
        match self {
            WizardPhase::Idle => 0,
            WizardPhase::Configuring => 1,
            WizardPhase::Uploading | WizardPhase::Failed(FailedStage::Uploading) => 2,
            WizardPhase::Processing | WizardPhase::Failed(FailedStage::Processing) => 3,
            WizardPhase::Reviewing => 4,
            WizardPhase::Finalized => 5,
        }
    }

    /// 计算下一个状态，非法转换返回错误
    pub fn on(self, event: PhaseEvent) -> Result<WizardPhase, WizardError> {
        use WizardPhase::*;

        let next = match (self, event) {
            (Finalized, _) => None,
            (_, PhaseEvent::Reset) => Some(Idle),
            (Idle, PhaseEvent::Begin) => Some(Configuring),
            (Configuring, PhaseEvent::Configured) => Some(Uploading),
            (Uploading, PhaseEvent::UploadFailed) => Some(Failed(FailedStage::Uploading)),
            (Uploading, PhaseEvent::ProcessingStarted) => Some(Processing),
            (Processing, PhaseEvent::ProcessingSucceeded) => Some(Reviewing),
            (Processing, PhaseEvent::ProcessingFailed) => Some(Failed(FailedStage::Processing)),
            (Failed(FailedStage::Uploading), PhaseEvent::Retry) => Some(Uploading),
            (Failed(FailedStage::Processing), PhaseEvent::Retry) => Some(Processing),
            (Reviewing, PhaseEvent::Finalize) => Some(Finalized),
            (current, PhaseEvent::Rewind(target))
                if matches!(target, Configuring | Uploading)
                    && current != Idle
                    && target.rank() <= current.rank() =>
            {
                Some(target)
            }
            _ => None,
        };

        next.ok_or_else(|| WizardError::InvalidTransition {
            from: self.name().to_string(),
            event: format!("{:?}", event),
        })
    }
}
