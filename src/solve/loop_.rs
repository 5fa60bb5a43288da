//! 求解主循环
//!
//! 每轮严格串行：神谕调用 → 解析/修复 → 归一化 → 验证，下一轮提示依赖
//! 上一轮裁定，无投机并行。神谕调用是唯一挂起点，强制每轮超时与取消；
//! 超时/传输故障落为 fatal_error 会话而非无限等待。独立会话不共享可变
//! 状态，天然可并行。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::answer;
use crate::config::SolverSection;
use crate::error::SolveError;
use crate::expr::normalize;
use crate::llm::{LlmClient, LlmError, Message};
use crate::solve::prompts;
use crate::solve::session::{ProblemStatement, RoundAttempt, SolveSession};
use crate::verify::Verifier;

/// 求解循环配置
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// 轮次预算，至少 1
    pub max_rounds: u32,
    /// 单轮神谕调用超时
    pub round_timeout: Duration,
    /// 是否使用结构化分步提示
    pub structured: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            round_timeout: Duration::from_secs(60),
            structured: false,
        }
    }
}

impl SolveOptions {
    pub fn from_config(cfg: &SolverSection) -> Self {
        Self {
            max_rounds: cfg.max_rounds,
            round_timeout: Duration::from_secs(cfg.round_timeout_secs),
            structured: false,
        }
    }

    pub fn with_structured(mut self, structured: bool) -> Self {
        self.structured = structured;
        self
    }
}

/// 求解循环：LLM 提议 + CAS 验证交替，直到验证通过或预算耗尽
pub struct SolveLoop {
    oracle: Arc<dyn LlmClient>,
    verifier: Verifier,
    options: SolveOptions,
}

impl SolveLoop {
    /// 创建循环；max_rounds < 1 即刻拒绝（ConfigError，不开会话）
    pub fn new(
        oracle: Arc<dyn LlmClient>,
        verifier: Verifier,
        options: SolveOptions,
    ) -> Result<Self, SolveError> {
        if options.max_rounds < 1 {
            return Err(SolveError::InvalidMaxRounds(options.max_rounds));
        }
        Ok(Self {
            oracle,
            verifier,
            options,
        })
    }

    /// 跑一次完整会话；返回的会话必为终态（solved / exhausted / fatal_error）
    pub async fn run(&self, problem: ProblemStatement) -> SolveSession {
        self.run_with_cancel(problem, CancellationToken::new()).await
    }

    /// 带取消令牌的版本；取消落为 fatal_error
    pub async fn run_with_cancel(
        &self,
        problem: ProblemStatement,
        cancel: CancellationToken,
    ) -> SolveSession {
        let mut session = SolveSession::new(problem);
        let mut messages = vec![
            Message::system(prompts::system_prompt(self.options.structured)),
            Message::user(prompts::user_prompt(&session.problem)),
        ];

        for round in 1..=self.options.max_rounds {
            if cancel.is_cancelled() {
                session.finish_fatal(SolveError::Cancelled.to_string());
                return session;
            }

            // 本轮新增的提示即最后一条 user 消息
            let prompt = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();

            let raw = match timeout(self.options.round_timeout, self.oracle.complete(&messages))
                .await
            {
                Err(_) => {
                    let fault = SolveError::OracleTimeout(self.options.round_timeout);
                    tracing::warn!(session = %session.id, round, %fault, "oracle fault");
                    session.finish_fatal(fault.to_string());
                    return session;
                }
                Ok(Err(e)) => {
                    let fault = match e {
                        LlmError::Unreachable(msg) => SolveError::OracleUnreachable(msg),
                        LlmError::InvalidResponse(msg) => SolveError::OracleInvalidResponse(msg),
                    };
                    tracing::warn!(session = %session.id, round, %fault, "oracle fault");
                    session.finish_fatal(fault.to_string());
                    return session;
                }
                Ok(Ok(text)) => text,
            };

            messages.push(Message::assistant(raw.clone()));

            // 解析/修复：失败记一轮空候选，剩余预算时带修复反馈重试
            let candidate = match answer::parse_answer(&raw) {
                Ok(c) => c,
                Err(e) => {
                    tracing::info!(session = %session.id, round, outcome = "parse_failed", "round");
                    session.record_round(RoundAttempt::new(round, prompt, raw.clone(), None, None));
                    if round == self.options.max_rounds {
                        session.finish_exhausted();
                        return session;
                    }
                    messages.push(Message::user(prompts::repair_feedback(&raw, &e)));
                    continue;
                }
            };

            // 归一化：失败同样走重试/耗尽策略，反馈指名归一化错误
            let canonical = match normalize::normalize(&candidate.final_answer) {
                Ok(c) => c,
                Err(e) => {
                    tracing::info!(session = %session.id, round, outcome = "normalize_failed", "round");
                    let verdict = match &e {
                        normalize::NormalizeError::Unparsable { raw, detail } => {
                            Verifier::unparsable(raw, detail)
                        }
                    };
                    session.record_round(RoundAttempt::new(
                        round,
                        prompt,
                        raw.clone(),
                        Some(candidate),
                        Some(verdict),
                    ));
                    if round == self.options.max_rounds {
                        session.finish_exhausted();
                        return session;
                    }
                    messages.push(Message::user(prompts::normalize_feedback(&e)));
                    continue;
                }
            };

            // 验证：裁定驱动接受 / 带反馈重试 / 耗尽
            let verdict = self.verifier.verify(&canonical, &session.problem);
            let is_valid = verdict.is_valid;
            let canonical_form = verdict.canonical_form.clone();
            let final_answer = candidate.final_answer.clone();
            tracing::info!(
                session = %session.id,
                round,
                outcome = if is_valid { "solved" } else { "rejected" },
                "round"
            );
            session.record_round(RoundAttempt::new(
                round,
                prompt,
                raw,
                Some(candidate),
                Some(verdict.clone()),
            ));

            if is_valid {
                // 不变量：solved ⇔ 末轮裁定有效；canonical_form 此时必有
                session.finish_solved(canonical_form.unwrap_or(final_answer));
                return session;
            }
            if round == self.options.max_rounds {
                session.finish_exhausted();
                return session;
            }
            messages.push(Message::user(prompts::verification_feedback(
                &final_answer,
                &verdict,
            )));
        }

        // max_rounds ≥ 1 时循环必在预算内返回
        session.finish_exhausted();
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::solve::session::SessionStatus;
    use async_trait::async_trait;

    fn solve_loop(oracle: Arc<dyn LlmClient>, max_rounds: u32) -> SolveLoop {
        SolveLoop::new(
            oracle,
            Verifier::default(),
            SolveOptions {
                max_rounds,
                round_timeout: Duration::from_secs(5),
                structured: false,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let err = SolveLoop::new(
            Arc::new(MockLlmClient::new()),
            Verifier::default(),
            SolveOptions {
                max_rounds: 0,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, SolveError::InvalidMaxRounds(0)));
    }

    #[tokio::test]
    async fn test_solved_in_one_round() {
        let oracle = Arc::new(MockLlmClient::with_responses(vec![
            r#"{"final_answer": "1/2", "approach": "unit circle"}"#,
        ]));
        let session = solve_loop(oracle, 3)
            .run(ProblemStatement::new("What is sin(30°)?"))
            .await;
        assert_eq!(session.status(), SessionStatus::Solved);
        assert_eq!(session.final_answer(), Some("1/2"));
        assert_eq!(session.rounds().len(), 1);
    }

    #[tokio::test]
    async fn test_self_correction_on_missing_root() {
        // 第 1 轮漏根被打回，第 2 轮补全后通过
        let oracle = Arc::new(MockLlmClient::with_responses(vec![
            r#"{"final_answer": "x=-2"}"#,
            r#"{"final_answer": "x=-2, x=-3"}"#,
        ]));
        let session = solve_loop(oracle, 3)
            .run(ProblemStatement::new("Solve x^2+5x+6=0"))
            .await;
        assert_eq!(session.status(), SessionStatus::Solved);
        assert_eq!(session.final_answer(), Some("x = -3, x = -2"));
        assert_eq!(session.rounds().len(), 2);

        // 第 1 轮裁定必须留在轨迹里，且反馈包含具体缺陷
        let first = &session.rounds()[0];
        assert!(!first.verdict.as_ref().unwrap().is_valid);
        let second = &session.rounds()[1];
        assert!(second.prompt.contains("rejected by symbolic verification"));
    }

    #[tokio::test]
    async fn test_exhausted_after_budget() {
        let oracle = Arc::new(MockLlmClient::with_responses(vec![
            r#"{"final_answer": "x=1"}"#,
        ]));
        let session = solve_loop(oracle, 1)
            .run(ProblemStatement::new("Solve x^2+5x+6=0"))
            .await;
        assert_eq!(session.status(), SessionStatus::Exhausted);
        // 尽力答案保留但可与 solved 区分
        assert_eq!(session.final_answer(), Some("x=1"));
        assert_eq!(session.rounds().len(), 1);
    }

    #[tokio::test]
    async fn test_repair_feedback_round_consumed() {
        let oracle = Arc::new(MockLlmClient::with_responses(vec![
            "I think the answer is one half, hope that helps",
            r#"{"final_answer": "1/2"}"#,
        ]));
        let session = solve_loop(oracle, 3)
            .run(ProblemStatement::new("What is sin(30°)?"))
            .await;
        assert_eq!(session.status(), SessionStatus::Solved);
        assert_eq!(session.rounds().len(), 2);
        assert!(session.rounds()[0].candidate.is_none());
        assert!(session.rounds()[0].verdict.is_none());
    }

    #[tokio::test]
    async fn test_normalization_failure_feedback() {
        let oracle = Arc::new(MockLlmClient::with_responses(vec![
            r#"{"final_answer": "one half"}"#,
            r#"{"final_answer": "1/2"}"#,
        ]));
        let session = solve_loop(oracle, 3)
            .run(ProblemStatement::new("What is sin(30°)?"))
            .await;
        assert_eq!(session.status(), SessionStatus::Solved);
        let first = &session.rounds()[0];
        assert!(first.candidate.is_some());
        let verdict = first.verdict.as_ref().unwrap();
        assert_eq!(
            verdict.failure_reason,
            Some(crate::verify::FailureReason::Unparsable)
        );
        assert!(session.rounds()[1].prompt.contains("could not be parsed"));
    }

    /// 挂起不返回的神谕，用于触发超时
    struct HangingOracle;

    #[async_trait]
    impl LlmClient for HangingOracle {
        async fn complete(&self, _messages: &[Message]) -> Result<String, crate::llm::LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_oracle_timeout_is_fatal() {
        let solve = SolveLoop::new(
            Arc::new(HangingOracle),
            Verifier::default(),
            SolveOptions {
                max_rounds: 3,
                round_timeout: Duration::from_millis(50),
                structured: false,
            },
        )
        .unwrap();
        let session = solve.run(ProblemStatement::new("What is sin(30°)?")).await;
        assert_eq!(session.status(), SessionStatus::FatalError);
        assert!(session.fault().unwrap().contains("timed out"));
        // 超时不消耗轮次：零条带裁定的轮次记录
        assert!(session.rounds().is_empty());
    }

    struct UnreachableOracle;

    #[async_trait]
    impl LlmClient for UnreachableOracle {
        async fn complete(&self, _messages: &[Message]) -> Result<String, crate::llm::LlmError> {
            Err(crate::llm::LlmError::Unreachable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_oracle_transport_fault_is_fatal() {
        let session = solve_loop(Arc::new(UnreachableOracle), 3)
            .run(ProblemStatement::new("1+1"))
            .await;
        assert_eq!(session.status(), SessionStatus::FatalError);
        assert!(session.fault().unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let session = solve_loop(Arc::new(MockLlmClient::new()), 3)
            .run_with_cancel(ProblemStatement::new("1+1"), cancel)
            .await;
        assert_eq!(session.status(), SessionStatus::FatalError);
        assert!(session.fault().unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_round_budget_never_exceeded() {
        let oracle = Arc::new(MockLlmClient::with_responses(vec![
            "garbage 1",
            "garbage 2",
            "garbage 3",
            "garbage 4",
        ]));
        let session = solve_loop(oracle, 2)
            .run(ProblemStatement::new("What is sin(30°)?"))
            .await;
        assert_eq!(session.status(), SessionStatus::Exhausted);
        assert_eq!(session.rounds().len(), 2);
    }
}
