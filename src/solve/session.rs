//! 求解会话与轮次记录
//!
//! 一次会话 = 一道题 + 按时间序追加的轮次 + 终态。
//! 会话由创建它的求解循环独占，轮次一经记录不可变；
//! 到达终态后拒绝追加（不变量），失败轮次也完整留在轨迹里供人工审计。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::answer::AnswerCandidate;
use crate::verify::VerificationVerdict;

/// 待解的题目；创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemStatement {
    pub text: String,
    /// 可选学科标签（trig / algebra / calculus / ...）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl ProblemStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// 一轮 LLM 交互的完整记录；创建后不可变
#[derive(Debug, Clone, Serialize)]
pub struct RoundAttempt {
    /// 1 起始的轮次序号
    pub index: u32,
    /// 本轮发给 LLM 的（新增）提示
    pub prompt: String,
    /// LLM 原始回复
    pub raw_response: String,
    /// 解析出的候选答案；解析失败为 None
    pub candidate: Option<AnswerCandidate>,
    /// 验证裁定；未走到验证为 None
    pub verdict: Option<VerificationVerdict>,
    pub at: DateTime<Utc>,
}

impl RoundAttempt {
    pub fn new(
        index: u32,
        prompt: impl Into<String>,
        raw_response: impl Into<String>,
        candidate: Option<AnswerCandidate>,
        verdict: Option<VerificationVerdict>,
    ) -> Self {
        Self {
            index,
            prompt: prompt.into(),
            raw_response: raw_response.into(),
            candidate,
            verdict,
            at: Utc::now(),
        }
    }
}

/// 会话状态；Running 仅存在于求解过程中，返回给调用方的必为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Solved,
    Exhausted,
    FatalError,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// 求解会话：题目 + 轮次轨迹 + 终态 + 最终答案
#[derive(Debug, Clone, Serialize)]
pub struct SolveSession {
    pub id: Uuid,
    pub problem: ProblemStatement,
    rounds: Vec<RoundAttempt>,
    status: SessionStatus,
    /// solved 时为规范形式；exhausted 时为最后一个（未验证的）候选
    final_answer: Option<String>,
    /// fatal_error 时的故障描述
    fault: Option<String>,
}

impl SolveSession {
    pub fn new(problem: ProblemStatement) -> Self {
        Self {
            id: Uuid::new_v4(),
            problem,
            rounds: Vec::new(),
            status: SessionStatus::Running,
            final_answer: None,
            fault: None,
        }
    }

    pub fn rounds(&self) -> &[RoundAttempt] {
        &self.rounds
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// 追加一轮记录；终态会话拒绝追加
    pub fn record_round(&mut self, round: RoundAttempt) {
        if self.status.is_terminal() {
            tracing::warn!(
                session = %self.id,
                round = round.index,
                "attempted to record a round on a terminal session; ignored"
            );
            return;
        }
        self.rounds.push(round);
    }

    pub fn finish_solved(&mut self, canonical_answer: String) {
        if self.status.is_terminal() {
            return;
        }
        self.status = SessionStatus::Solved;
        self.final_answer = Some(canonical_answer);
    }

    /// 轮次预算耗尽；保留最后一个候选作为尽力答案（与 solved 可区分）
    pub fn finish_exhausted(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = SessionStatus::Exhausted;
        self.final_answer = self
            .rounds
            .iter()
            .rev()
            .find_map(|r| r.candidate.as_ref().map(|c| c.final_answer.clone()));
    }

    pub fn finish_fatal(&mut self, fault: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = SessionStatus::FatalError;
        self.fault = Some(fault.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(index: u32) -> RoundAttempt {
        RoundAttempt::new(index, "prompt", "raw", None, None)
    }

    #[test]
    fn test_terminal_session_rejects_rounds() {
        let mut session = SolveSession::new(ProblemStatement::new("1+1"));
        session.record_round(round(1));
        session.finish_solved("2".to_string());
        session.record_round(round(2));
        assert_eq!(session.rounds().len(), 1);
        assert_eq!(session.status(), SessionStatus::Solved);
    }

    #[test]
    fn test_exhausted_keeps_last_candidate() {
        let mut session = SolveSession::new(ProblemStatement::new("hard"));
        let candidate: crate::answer::AnswerCandidate =
            serde_json::from_str(r#"{"final_answer": "42"}"#).unwrap();
        session.record_round(RoundAttempt::new(1, "p", "r", Some(candidate), None));
        session.finish_exhausted();
        assert_eq!(session.status(), SessionStatus::Exhausted);
        assert_eq!(session.final_answer(), Some("42"));
    }

    #[test]
    fn test_exhausted_without_candidate() {
        let mut session = SolveSession::new(ProblemStatement::new("hard"));
        session.record_round(round(1));
        session.finish_exhausted();
        assert!(session.final_answer().is_none());
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut session = SolveSession::new(ProblemStatement::new("1+1"));
        session.finish_fatal("oracle timeout");
        session.finish_solved("2".to_string());
        assert_eq!(session.status(), SessionStatus::FatalError);
        assert_eq!(session.fault(), Some("oracle timeout"));
        assert!(session.final_answer().is_none());
    }
}
