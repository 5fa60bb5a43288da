//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序回放预置回复，便于本地跑通多轮求解协议；
//! 脚本耗尽后回落到一条固定 JSON 回复。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message};

/// Mock 客户端：依次回放预置回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一组按序回放的回复
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        let next = {
            let mut queue = self
                .responses
                .lock()
                .map_err(|e| LlmError::Unreachable(e.to_string()))?;
            queue.pop_front()
        };

        Ok(next.unwrap_or_else(|| r#"{"final_answer": "0"}"#.to_string()))
    }
}
