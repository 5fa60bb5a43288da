//! 提示词模板
//!
//! 系统提示（标准 / 结构化分步两版）、首轮用户提示，以及三类纠错反馈：
//! JSON 修复、归一化失败、验证失败。反馈必须指名具体缺陷，
//! 让合格的推理者能据此修正，而不是笼统的「再试一次」。

use crate::answer::AnswerParseError;
use crate::expr::NormalizeError;
use crate::solve::ProblemStatement;
use crate::verify::{FailureReason, VerificationVerdict};

/// 标准系统提示：只输出一个 JSON 对象
pub const SYSTEM_PROMPT: &str = r#"You are an expert competition mathematics tutor and symbolic reasoner.
Solve the given problem and output ONLY a JSON object in this exact format:

{
  "final_answer": "<exact answer>",
  "approach": "<concise solution outline>",
  "critical_thinking": "<pitfalls and checks you applied>"
}

Rules for final_answer:
- Provide the exact mathematical answer (number, expression, or formula).
- Use standard notation; prefer exact values ("1/2" instead of "0.5", "sqrt(2)/2" instead of "0.707").
- When solving an equation, list every solution: "x = -2, x = -3".
- Include no words, only math.

Output ONLY the JSON object. No additional text before or after."#;

/// 结构化分步系统提示：每步附可被 CAS 检验的 check 表达式
pub const SYSTEM_PROMPT_STRUCTURED: &str = r#"You are an expert competition mathematics tutor and symbolic reasoner.
Output ONLY a JSON object exactly matching the schema:

{
  "steps": [
    {
      "id": 1,
      "text": "<natural language step>",
      "check": "<expression equal to zero if this step is correct>"
    }
  ],
  "final_answer": "<exact answer>",
  "approach": "<concise solution outline>",
  "critical_thinking": "<pitfalls and checks you applied>"
}

Rules:
- Each step must be one atomic algebraic or logical action.
- Each `check` must be a plain-notation expression (lhs - rhs) that simplifies to 0.
- Rules for final_answer: exact values, standard notation, every solution of an equation.
- Do NOT output any text outside the JSON."#;

pub fn system_prompt(structured: bool) -> &'static str {
    if structured {
        SYSTEM_PROMPT_STRUCTURED
    } else {
        SYSTEM_PROMPT
    }
}

/// 首轮用户提示：只含题面
pub fn user_prompt(problem: &ProblemStatement) -> String {
    match &problem.subject {
        Some(subject) => format!(
            "Problem ({}): {}\nAnswer in the JSON schema above.",
            subject, problem.text
        ),
        None => format!("Problem: {}\nAnswer in the JSON schema above.", problem.text),
    }
}

const RAW_PREVIEW_CHARS: usize = 400;

fn preview(raw: &str) -> String {
    let p: String = raw.chars().take(RAW_PREVIEW_CHARS).collect();
    if raw.chars().count() > RAW_PREVIEW_CHARS {
        format!("{}...", p)
    } else {
        p
    }
}

/// JSON 修复反馈：附上原样坏输出，要求只重发合法 JSON
pub fn repair_feedback(raw: &str, err: &AnswerParseError) -> String {
    let AnswerParseError::Malformed { attempts_tried, .. } = err;
    format!(
        "Your previous reply was not a valid JSON object (rejected after {} decode attempts). \
         It began:\n{}\n\
         Reply again with ONLY one JSON object in the required schema, including the \
         \"final_answer\" field. No markdown fences, no text before or after the JSON.",
        attempts_tried,
        preview(raw)
    )
}

/// 归一化失败反馈：指名无法解析的表达式与原因
pub fn normalize_feedback(err: &NormalizeError) -> String {
    let NormalizeError::Unparsable { raw, detail } = err;
    format!(
        "Your final_answer {:?} could not be parsed as a mathematical expression ({}). \
         Restate the final_answer in plain notation: digits, + - * / ^, parentheses, \
         function calls like sin(x) or sqrt(2), and \"x = value\" lists for equation roots. \
         Keep the same JSON schema.",
        raw, detail
    )
}

/// 验证失败反馈：带上失败原因与验证器备注（自我纠错契约）
pub fn verification_feedback(final_answer: &str, verdict: &VerificationVerdict) -> String {
    let reason = match verdict.failure_reason {
        Some(FailureReason::NotEquivalent) => {
            "it does not satisfy the original problem (see the checks below)"
        }
        Some(FailureReason::DomainError) => {
            "evaluating it hits an undefined operation (division by zero, log of a non-positive number, or similar)"
        }
        Some(FailureReason::ExceedsComplexity) => {
            "it is far more complex than an answer to this problem should be"
        }
        Some(FailureReason::Unparsable) => "it could not be parsed",
        None => "it could not be verified",
    };

    let mut msg = format!(
        "Your previous answer {:?} was rejected by symbolic verification: {}.\n",
        final_answer, reason
    );
    if !verdict.notes.is_empty() {
        msg.push_str("Verifier notes:\n");
        for note in &verdict.notes {
            msg.push_str("- ");
            msg.push_str(note);
            msg.push('\n');
        }
    }
    msg.push_str(
        "Recalculate carefully, fix the identified defect, and reply in the same JSON schema \
         with the corrected final_answer.",
    );
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt_includes_subject() {
        let p = ProblemStatement::new("What is sin(30°)?").with_subject("trig");
        assert!(user_prompt(&p).contains("(trig)"));
    }

    #[test]
    fn test_verification_feedback_names_the_defect() {
        let verdict = VerificationVerdict {
            is_valid: false,
            canonical_form: Some("x = -2".to_string()),
            numeric_value: None,
            complexity_score: 3,
            failure_reason: Some(crate::verify::FailureReason::NotEquivalent),
            notes: vec!["a degree 1 factor remains".to_string()],
        };
        let msg = verification_feedback("x = -2", &verdict);
        assert!(msg.contains("does not satisfy"));
        assert!(msg.contains("degree 1 factor remains"));
    }

    #[test]
    fn test_repair_feedback_quotes_the_malformed_text() {
        let err = AnswerParseError::Malformed {
            raw: "not json".to_string(),
            attempts_tried: 6,
        };
        let msg = repair_feedback("not json", &err);
        assert!(msg.contains("not json"));
        assert!(msg.contains("final_answer"));
    }
}
