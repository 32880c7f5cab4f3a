//! 阶段控制器
//!
//! 按固定顺序管理向导的各个阶段。前进要满足当前阶段的守卫条件，
//! 后退不受限制也不清除数据；定稿是单独的显式操作。

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tracing::debug;

use crate::error::WizardError;
use crate::events::{EventSink, WizardEvent};

/// 阶段标识
pub trait StageId: Copy + Eq + Debug + Send + Sync + 'static {
    fn label(self) -> &'static str;
}

/// 守卫条件：当前阶段能否离开
pub type Guard<C> = fn(&C) -> bool;

/// 阶段控制器
pub struct WizardController<S: StageId, C> {
    wizard: &'static str,
    stages: Vec<S>,
    guards: HashMap<usize, Guard<C>>,
    current: usize,
    finalized: bool,
    sink: Arc<dyn EventSink>,
}

impl<S: StageId, C> WizardController<S, C> {
    /// 第一个阶段单独给出，阶段列表因此不会为空
    pub fn new(
        wizard: &'static str,
        first: S,
        rest: impl IntoIterator<Item = S>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let stages = std::iter::once(first).chain(rest).collect();
        Self {
            wizard,
            stages,
            guards: HashMap::new(),
            current: 0,
            finalized: false,
            sink,
        }
    }

    /// 为某个阶段设置守卫；没有守卫的阶段总是可以离开
    pub fn with_guard(mut self, stage: S, guard: Guard<C>) -> Self {
        if let Some(index) = self.stages.iter().position(|&s| s == stage) {
            self.guards.insert(index, guard);
        }
        self
    }

    pub fn stages(&self) -> &[S] {
        &self.stages
    }

    pub fn index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> S {
        self.stages[self.current]
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 == self.stages.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn guard_holds(&self, ctx: &C) -> bool {
        self.guards
            .get(&self.current)
            .map_or(true, |guard| guard(ctx))
    }

    /// “下一步”按钮是否可用
    pub fn can_advance(&self, ctx: &C) -> bool {
        !self.finalized && !self.is_last() && self.guard_holds(ctx)
    }

    /// 前进一步，条件不满足或已在最后一步时什么也不做
    ///
    /// 返回是否真的前进了。
    pub fn advance(&mut self, ctx: &C) -> bool {
        if !self.can_advance(ctx) {
            debug!(
                "[{}] 停留在 {}，无法前进",
                self.wizard,
                self.current().label()
            );
            return false;
        }
        self.move_to(self.current + 1);
        true
    }

    pub fn can_retreat(&self) -> bool {
        self.current > 0 && !self.finalized
    }

    /// 后退一步，不清除任何数据
    pub fn retreat(&mut self) -> bool {
        if !self.can_retreat() {
            return false;
        }
        self.move_to(self.current - 1);
        true
    }

    /// 回到第一步
    pub fn reset(&mut self) {
        self.finalized = false;
        if self.current != 0 {
            self.move_to(0);
        }
    }

    /// 在最后一步定稿，之后控制器不再移动
    pub fn finalize(&mut self, ctx: &C) -> Result<(), WizardError> {
        if self.finalized {
            return Err(WizardError::AlreadyFinalized);
        }
        if !self.is_last() {
            return Err(WizardError::WrongStage {
                expected: self.stages[self.stages.len() - 1].label(),
                actual: self.current().label(),
            });
        }
        if !self.guard_holds(ctx) {
            return Err(WizardError::GuardNotSatisfied {
                stage: self.current().label(),
            });
        }
        self.finalized = true;
        self.sink.emit(WizardEvent::Finalized {
            wizard: self.wizard,
        });
        Ok(())
    }

    fn move_to(&mut self, index: usize) {
        let from = self.current().label();
        self.current = index;
        self.sink.emit(WizardEvent::StageChanged {
            wizard: self.wizard,
            from,
            to: self.current().label(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Form,
        Upload,
        Done,
    }

    impl StageId for Step {
        fn label(self) -> &'static str {
            match self {
                Step::Form => "form",
                Step::Upload => "upload",
                Step::Done => "done",
            }
        }
    }

    #[derive(Default)]
    struct Ctx {
        filled: bool,
        uploaded: bool,
    }

    fn controller(sink: &Arc<RecordingSink>) -> WizardController<Step, Ctx> {
        WizardController::<Step, Ctx>::new(
            "test",
            Step::Form,
            [Step::Upload, Step::Done],
            sink.clone(),
        )
        .with_guard(Step::Form, |c| c.filled)
        .with_guard(Step::Upload, |c| c.uploaded)
    }

    #[test]
    fn test_advance_is_noop_when_guard_fails() {
        let sink = Arc::new(RecordingSink::new());
        let mut wc = controller(&sink);
        let ctx = Ctx::default();

        assert!(!wc.can_advance(&ctx));
        assert!(!wc.advance(&ctx));
        assert_eq!(wc.current(), Step::Form);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_advance_moves_once_per_qualifying_state() {
        let sink = Arc::new(RecordingSink::new());
        let mut wc = controller(&sink);
        let mut ctx = Ctx {
            filled: true,
            ..Ctx::default()
        };

        assert!(wc.advance(&ctx));
        // 第二次点击时上传阶段的条件还不满足
        assert!(!wc.advance(&ctx));
        assert_eq!(wc.current(), Step::Upload);

        ctx.uploaded = true;
        assert!(wc.advance(&ctx));
        assert!(wc.is_last());
        assert!(!wc.advance(&ctx));
        assert_eq!(wc.index(), 2);
    }

    #[test]
    fn test_retreat_and_finalize() {
        let sink = Arc::new(RecordingSink::new());
        let mut wc = controller(&sink);
        let ctx = Ctx {
            filled: true,
            uploaded: true,
        };

        assert!(!wc.retreat());
        assert!(matches!(
            wc.finalize(&ctx),
            Err(WizardError::WrongStage { .. })
        ));

        wc.advance(&ctx);
        wc.advance(&ctx);
        assert!(wc.retreat());
        assert_eq!(wc.current(), Step::Upload);
        wc.advance(&ctx);

        wc.finalize(&ctx).unwrap();
        assert!(wc.is_finalized());
        assert!(!wc.retreat());
        assert_eq!(wc.finalize(&ctx), Err(WizardError::AlreadyFinalized));
        assert!(sink
            .events()
            .contains(&WizardEvent::Finalized { wizard: "test" }));
    }

    #[test]
    fn test_reset_returns_to_first_stage() {
        let sink = Arc::new(RecordingSink::new());
        let mut wc = controller(&sink);
        let ctx = Ctx {
            filled: true,
            uploaded: false,
        };
        wc.advance(&ctx);
        wc.reset();
        assert_eq!(wc.current(), Step::Form);
        assert_eq!(
            sink.events().last(),
            Some(&WizardEvent::StageChanged {
                wizard: "test",
                from: "upload",
                to: "form",
            })
        );
    }

    #[test]
    fn test_single_stage_wizard_finalizes_in_place() {
        let sink = Arc::new(RecordingSink::new());
        let mut wc =
            WizardController::<Step, Ctx>::new("single", Step::Done, Vec::new(), sink.clone());
        let ctx = Ctx::default();

        assert_eq!(wc.stages(), [Step::Done]);
        assert!(wc.is_last());
        assert!(!wc.advance(&ctx));
        assert!(!wc.retreat());
        wc.finalize(&ctx).unwrap();
        assert!(wc.is_finalized());
    }
}
