//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Gemini / Mock）实现 LlmClient::complete；
//! 求解循环只依赖此 trait，provider 的选择在配置期完成，核心逻辑不感知。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用失败：传输层不可达，或返回内容不可用
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// 网络 / 认证等传输层错误
    #[error("llm unreachable: {0}")]
    Unreachable(String),

    /// 请求成功但返回内容为空或无法使用
    #[error("llm returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// LLM 客户端 trait：给定消息列表返回一次完成的文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
