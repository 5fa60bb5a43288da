//! 求解器错误类型
//!
//! 与恢复策略配合：解析 / 归一化 / 验证失败在循环内走带反馈重试，
//! 永不以错误形态逃逸；这里只放即刻致命、直达调用方的故障。

use std::time::Duration;

use thiserror::Error;

/// 致命故障：神谕不可用或配置非法，不消耗轮次预算、不静默续跑
#[derive(Error, Debug, Clone)]
pub enum SolveError {
    #[error("oracle unreachable: {0}")]
    OracleUnreachable(String),

    #[error("oracle timed out after {0:?}")]
    OracleTimeout(Duration),

    #[error("oracle returned an unusable response: {0}")]
    OracleInvalidResponse(String),

    #[error("invalid max_rounds {0}: must be at least 1")]
    InvalidMaxRounds(u32),

    #[error("cancelled by caller")]
    Cancelled,
}
