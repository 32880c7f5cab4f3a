/// 科目枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    /// 语文
    Chinese,
    /// 数学
    Math,
    /// 英语
    English,
    /// 物理
    Physics,
    /// 化学
    Chemistry,
    /// 生物
    Biology,
    /// 历史
    History,
    /// 政治
    Politics,
    /// 地理
    Geography,
    /// 科学
    Science,
}

impl Subject {
    pub const ALL: [Subject; 10] = [
        Subject::Chinese,
        Subject::Math,
        Subject::English,
        Subject::Physics,
        Subject::Chemistry,
        Subject::Biology,
        Subject::History,
        Subject::Politics,
        Subject::Geography,
        Subject::Science,
    ];

    /// 接口使用的代码
    pub fn code(self) -> &'static str {
        match self {
            Subject::Chinese => "chinese",
            Subject::Math => "math",
            Subject::English => "english",
            Subject::Physics => "physics",
            Subject::Chemistry => "chemistry",
            Subject::Biology => "biology",
            Subject::History => "history",
            Subject::Politics => "politics",
            Subject::Geography => "geography",
            Subject::Science => "science",
        }
    }

    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            Subject::Chinese => "语文",
            Subject::Math => "数学",
            Subject::English => "英语",
            Subject::Physics => "物理",
            Subject::Chemistry => "化学",
            Subject::Biology => "生物",
            Subject::History => "历史",
            Subject::Politics => "政治",
            Subject::Geography => "地理",
            Subject::Science => "科学",
        }
    }

    /// 精确匹配：中文名、简称或接口代码
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|subject| {
            subject.name() == s
                || subject.code().eq_ignore_ascii_case(s)
                || subject.name().chars().next().map(String::from).as_deref() == Some(s)
        })
    }

    /// 智能查找科目（支持模糊匹配）
    ///
    /// 目录里的科目名常带年级或教材前缀，例如 "八年级数学（人教版）"。
    pub fn find(s: &str) -> Option<Self> {
        if let Some(subject) = Self::parse(s) {
            return Some(subject);
        }

        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|subject| lower.contains(subject.name()) || lower.contains(subject.code()))
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
