use std::time::Duration;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    // --- 后端 API 配置 ---
    /// 后端 API 地址
    pub api_base_url: String,
    /// 单个 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 登录账号（可选）
    pub login_email: Option<String>,
    /// 登录密码（可选）
    pub login_password: Option<String>,
    // --- 向导节奏 ---
    /// 后台处理总超时（秒），0 表示不限制
    pub processing_timeout_secs: u64,
    /// 模拟进度的刷新间隔（毫秒）
    pub simulated_tick_ms: u64,
    /// 模拟进度的上限，收到响应前不会超过它
    pub simulated_ceiling: u8,
    /// 轮询任务状态的间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 成功后自动进入下一步的延迟（毫秒）
    pub auto_advance_delay_ms: u64,
    /// 单个上传文件的大小上限（字节）
    pub max_upload_bytes: u64,
    /// 批改是否走后台任务 + 轮询（否则单次请求 + 模拟进度）
    pub correction_polling: bool,
    // --- 文件 ---
    /// 级联下拉目录（TOML）
    pub catalog_path: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 命令行运行用到的文档 ---
    /// 出题用的源文档
    pub source_document: Option<String>,
    /// 学生答卷
    pub answer_sheet: Option<String>,
    /// 参考答案（PDF）
    pub answer_key: Option<String>,
    /// 批改时选择的试卷
    pub paper_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            request_timeout_secs: 600,
            login_email: None,
            login_password: None,
            processing_timeout_secs: 900,
            simulated_tick_ms: 1000,
            simulated_ceiling: 98,
            poll_interval_ms: 1000,
            auto_advance_delay_ms: 800,
            max_upload_bytes: 25 * 1024 * 1024,
            correction_polling: false,
            catalog_path: "catalog.toml".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            source_document: None,
            answer_sheet: None,
            answer_key: None,
            paper_id: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(default.api_base_url),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            login_email: std::env::var("LOGIN_EMAIL").ok().or(default.login_email),
            login_password: std::env::var("LOGIN_PASSWORD").ok().or(default.login_password),
            processing_timeout_secs: std::env::var("PROCESSING_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.processing_timeout_secs),
            simulated_tick_ms: std::env::var("SIMULATED_TICK_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.simulated_tick_ms),
            simulated_ceiling: std::env::var("SIMULATED_CEILING").ok().and_then(|v| v.parse().ok()).map(|v: u8| v.min(99)).unwrap_or(default.simulated_ceiling),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.poll_interval_ms),
            auto_advance_delay_ms: std::env::var("AUTO_ADVANCE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.auto_advance_delay_ms),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_upload_bytes),
            correction_polling: std::env::var("CORRECTION_POLLING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.correction_polling),
            catalog_path: std::env::var("CATALOG_PATH").unwrap_or(default.catalog_path),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            source_document: std::env::var("SOURCE_DOCUMENT").ok().or(default.source_document),
            answer_sheet: std::env::var("ANSWER_SHEET").ok().or(default.answer_sheet),
            answer_key: std::env::var("ANSWER_KEY").ok().or(default.answer_key),
            paper_id: std::env::var("PAPER_ID").ok().or(default.paper_id),
        }
    }

    /// 向导用到的时间参数
    pub fn timings(&self) -> WizardTimings {
        WizardTimings {
            simulated_tick: Duration::from_millis(self.simulated_tick_ms.max(1)),
            simulated_ceiling: self.simulated_ceiling.min(99),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            processing_timeout: match self.processing_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            auto_advance_delay: Duration::from_millis(self.auto_advance_delay_ms),
            max_upload_bytes: self.max_upload_bytes,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 向导节奏参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WizardTimings {
    pub simulated_tick: Duration,
    pub simulated_ceiling: u8,
    pub poll_interval: Duration,
    pub processing_timeout: Option<Duration>,
    pub auto_advance_delay: Duration,
    pub max_upload_bytes: u64,
}

impl Default for WizardTimings {
    fn default() -> Self {
        Config::default().timings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_processing_timeout_means_unbounded() {
        let config = Config {
            processing_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.timings().processing_timeout, None);
    }

    #[test]
    fn test_ceiling_never_reaches_100() {
        let config = Config {
            simulated_ceiling: 100,
            ..Config::default()
        };
        assert_eq!(config.timings().simulated_ceiling, 99);
    }
}
