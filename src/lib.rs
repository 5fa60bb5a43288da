//! Gauss - Rust 数学解题智能体
//!
//! LLM 推理神谕提议答案，精确算术 CAS 验证器符号确认，验证失败作为
//! 纠错反馈回灌下一轮提示，直到通过或轮次预算耗尽。
//!
//! 模块划分：
//! - **answer**: LLM 回复解析与 JSON 修复链
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **error**: 致命故障类型（神谕不可达 / 超时 / 配置非法）
//! - **expr**: 表达式层（AST、文法、归一化、精确化简）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）
//! - **observability**: tracing 初始化
//! - **solve**: 求解层（会话轨迹、提示词、主循环）
//! - **verify**: CAS 验证器（检查组、方程代回、多项式查漏）

pub mod answer;
pub mod config;
pub mod error;
pub mod expr;
pub mod llm;
pub mod observability;
pub mod solve;
pub mod verify;

pub use error::SolveError;
pub use solve::{ProblemStatement, SessionStatus, SolveLoop, SolveOptions, SolveSession};
