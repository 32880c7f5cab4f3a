use std::fmt;

/// 默认的用户提示（后端没有返回 message 时使用）
pub const GENERIC_FAILURE_MESSAGE: &str = "操作失败，请稍后重试";

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 客户端预检错误（不会发往网络）
    Validation(ValidationError),
    /// API 调用错误
    Api(ApiError),
    /// 文件操作错误
    File(FileError),
    /// 向导流程错误
    Wizard(WizardError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "校验错误: {}", e),
            AppError::Api(e) => write!(f, "API错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Wizard(e) => write!(f, "向导错误: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Validation(e) => Some(e),
            AppError::Api(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Wizard(e) => Some(e),
        }
    }
}

/// 客户端校验错误
///
/// 只在本地产生，显示在出错的控件旁边。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("文件为空: {name}")]
    EmptyFile { name: String },
    #[error("文件类型不支持: {name} ({mime})，允许的类型: {allowed}")]
    UnsupportedType {
        name: String,
        mime: String,
        allowed: String,
    },
    #[error("文件过大: {name} ({size} 字节，上限 {limit} 字节)")]
    FileTooLarge { name: String, size: u64, limit: u64 },
    #[error("页码范围格式不正确: {0}")]
    InvalidPageRange(String),
    #[error("必填项未填写: {0}")]
    MissingField(String),
    #[error("至少选择一项: {0}")]
    EmptySelection(String),
    #[error("选项 {value} 不在 {level} 的可选范围内")]
    UnknownOption { level: String, value: String },
}

/// API 调用错误
#[derive(Debug)]
pub enum ApiError {
    /// 网络请求失败
    RequestFailed {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 返回非 2xx 响应
    BadResponse {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },
    /// 后端任务报告失败
    JobFailed {
        endpoint: String,
        message: Option<String>,
    },
    /// 请求超时
    Timeout {
        endpoint: String,
        seconds: u64,
    },
    /// 没有可用的登录凭证
    Unauthenticated,
    /// JSON 解析失败
    JsonParseFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApiError {
    /// 可以直接展示给用户的提示
    ///
    /// 后端带了 `message` 就用它，否则退回通用提示。
    pub fn user_message(&self) -> String {
        match self {
            ApiError::BadResponse {
                message: Some(msg), ..
            }
            | ApiError::JobFailed {
                message: Some(msg), ..
            } if !msg.trim().is_empty() => msg.clone(),
            ApiError::Timeout { .. } => "请求超时，请稍后重试".to_string(),
            ApiError::Unauthenticated => "登录已过期，请重新登录".to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::RequestFailed { endpoint, source } => {
                write!(f, "API请求失败 ({}): {}", endpoint, source)
            }
            ApiError::BadResponse {
                endpoint,
                status,
                message,
            } => {
                write!(
                    f,
                    "API返回错误响应 ({}): status={}, message={:?}",
                    endpoint, status, message
                )
            }
            ApiError::JobFailed { endpoint, message } => {
                write!(f, "后端任务失败 ({}): message={:?}", endpoint, message)
            }
            ApiError::Timeout { endpoint, seconds } => {
                write!(f, "请求超时 ({}): 已等待 {} 秒", endpoint, seconds)
            }
            ApiError::Unauthenticated => write!(f, "缺少有效的登录凭证"),
            ApiError::JsonParseFailed { source } => {
                write!(f, "JSON解析失败: {}", source)
            }
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::RequestFailed { source, .. } | ApiError::JsonParseFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 文件不存在
    NotFound { path: String },
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    TomlParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NotFound { path } => write!(f, "文件不存在: {}", path),
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
            FileError::TomlParseFailed { path, source } => {
                write!(f, "TOML解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. }
            | FileError::TomlParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            FileError::NotFound { .. } => None,
        }
    }
}

/// 向导流程错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    /// 当前阶段不允许该操作
    WrongStage {
        expected: &'static str,
        actual: &'static str,
    },
    /// 状态机拒绝的转换
    InvalidTransition { from: String, event: String },
    /// 阶段条件不满足
    GuardNotSatisfied { stage: &'static str },
    /// 条目不存在
    UnknownItem { id: u32 },
    /// 操作被取消
    Cancelled,
    /// 向导已完成，不能再修改
    AlreadyFinalized,
}

impl fmt::Display for WizardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardError::WrongStage { expected, actual } => {
                write!(f, "当前阶段为 {}，该操作需要在 {} 阶段进行", actual, expected)
            }
            WizardError::InvalidTransition { from, event } => {
                write!(f, "状态 {} 不接受事件 {}", from, event)
            }
            WizardError::GuardNotSatisfied { stage } => {
                write!(f, "阶段 {} 的完成条件尚未满足", stage)
            }
            WizardError::UnknownItem { id } => write!(f, "条目 #{} 不存在", id),
            WizardError::Cancelled => write!(f, "操作已取消"),
            WizardError::AlreadyFinalized => write!(f, "向导已完成"),
        }
    }
}

impl std::error::Error for WizardError {}

// ========== 从常见错误类型转换 ==========

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        AppError::Api(err)
    }
}

impl From<WizardError> for AppError {
    fn from(err: WizardError) -> Self {
        AppError::Wizard(err)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        ApiError::request_failed(endpoint, err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Api(err.into())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Api(ApiError::JsonParseFailed {
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 给用户看的一句话
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::Api(e) => e.user_message(),
            AppError::Wizard(e) => e.to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl ApiError {
    /// 创建网络请求失败错误
    pub fn request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
