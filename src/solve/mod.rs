//! 求解层：会话数据模型、提示词、主循环

pub mod loop_;
pub mod prompts;
pub mod session;

pub use loop_::{SolveLoop, SolveOptions};
pub use session::{ProblemStatement, RoundAttempt, SessionStatus, SolveSession};
