//! 模拟进度与阶段文案

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 进度模拟策略
///
/// 每次计时器触发时给出下一个进度值。上限和单调性由调用方保证。
pub trait ProgressSimulator: Send {
    fn tick(&mut self, current: u8) -> u8;
}

/// 每次随机前进 1~2
#[derive(Debug)]
pub struct RandomStepSimulator {
    rng: StdRng,
    min_step: u8,
    max_step: u8,
}

impl RandomStepSimulator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            min_step: 1,
            max_step: 2,
        }
    }

    /// 固定种子，结果可复现
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            min_step: 1,
            max_step: 2,
        }
    }
}

impl Default for RandomStepSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSimulator for RandomStepSimulator {
    fn tick(&mut self, current: u8) -> u8 {
        let step = self.rng.gen_range(self.min_step..=self.max_step);
        current.saturating_add(step).min(100)
    }
}

/// 每次前进固定步长
#[derive(Debug, Clone, Copy)]
pub struct FixedStepSimulator {
    pub step: u8,
}

impl FixedStepSimulator {
    pub fn new(step: u8) -> Self {
        Self { step }
    }
}

impl ProgressSimulator for FixedStepSimulator {
    fn tick(&mut self, current: u8) -> u8 {
        current.saturating_add(self.step).min(100)
    }
}

/// 进度 → 阶段文案
///
/// 断点是界面策略，不是后端协议。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTable {
    /// (起点, 文案)，按起点升序
    phases: Vec<(u8, &'static str)>,
    done: &'static str,
}

impl PhaseTable {
    pub fn new(mut phases: Vec<(u8, &'static str)>, done: &'static str) -> Self {
        phases.sort_by_key(|(start, _)| *start);
        Self { phases, done }
    }

    /// 出题流程
    pub fn generation() -> Self {
        Self::new(
            vec![
                (0, "正在分析文档…"),
                (20, "正在抽取知识点…"),
                (40, "正在识别考点…"),
                (60, "正在组织题目…"),
                (80, "正在完成试卷…"),
            ],
            "试卷已生成",
        )
    }

    /// 批改流程
    pub fn correction() -> Self {
        Self::new(
            vec![
                (0, "正在识别答卷…"),
                (20, "正在提取作答内容…"),
                (40, "正在比对参考答案…"),
                (60, "正在评分…"),
                (80, "正在生成评语…"),
            ],
            "批改完成",
        )
    }

    pub fn message(&self, progress: u8) -> &'static str {
        if progress >= 100 {
            return self.done;
        }
        self.phases
            .iter()
            .rev()
            .find(|(start, _)| progress >= *start)
            .map(|(_, msg)| *msg)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_breakpoints() {
        let table = PhaseTable::generation();
        assert_eq!(table.message(0), "正在分析文档…");
        assert_eq!(table.message(19), "正在分析文档…");
        assert_eq!(table.message(20), "正在抽取知识点…");
        assert_eq!(table.message(59), "正在识别考点…");
        assert_eq!(table.message(79), "正在组织题目…");
        assert_eq!(table.message(98), "正在完成试卷…");
        assert_eq!(table.message(100), "试卷已生成");
    }

    #[test]
    fn test_random_steps_are_one_or_two() {
        let mut sim = RandomStepSimulator::seeded(7);
        let mut current = 0;
        for _ in 0..200 {
            let next = sim.tick(current);
            assert!(next == 100 || (1..=2).contains(&(next - current)));
            current = next;
        }
        assert_eq!(current, 100);
    }

    #[test]
    fn test_fixed_step_saturates() {
        let mut sim = FixedStepSimulator::new(30);
        assert_eq!(sim.tick(90), 100);
        assert_eq!(sim.tick(250), 100);
    }
}
