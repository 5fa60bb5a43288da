//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）

use std::sync::Arc;

pub mod gemini;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use gemini::{create_gemini_client, GEMINI_FLASH, GEMINI_PRO};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};

use crate::config::AppConfig;

/// 按配置创建 LLM 客户端；provider 是配置期绑定，调用方只拿到 trait 对象
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    match cfg.llm.provider.as_str() {
        "openai" => Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            None,
        )),
        "mock" => Arc::new(MockLlmClient::new()),
        // 默认 Gemini（与原始产品一致）
        _ => Arc::new(create_gemini_client(Some(cfg.llm.model.as_str()))),
    }
}
