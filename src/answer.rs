//! LLM 回复解析与 JSON 修复
//!
//! LLM 输出不是可靠的结构化格式：先严格解码，失败后按固定顺序跑一条
//! 有界的修复链（剥 Markdown 围栏、截取花括号块、去尾随散文、去尾逗号、
//! 补齐括号），每步之后重试一次严格解码，首次成功即停。
//! 修复链走完仍失败则显式报错，绝不从散文里猜一个答案。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// 解析失败：修复链内全部尝试耗尽
#[derive(Error, Debug, Clone)]
pub enum AnswerParseError {
    #[error("malformed answer payload after {attempts_tried} attempts: {raw:?}")]
    Malformed { raw: String, attempts_tried: usize },
}

/// LLM 给出的答案候选；final_answer 必有，其余字段原样透传
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerCandidate {
    pub final_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approach: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_thinking: Option<String>,
    /// 其余负载字段不做再校验，原样带给调用方
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

type Repair = fn(&str) -> Option<String>;

/// 修复链：固定顺序、逐个累积应用（§ 设计说明：transform-then-try 列表，
/// 不写嵌套条件，便于测试与扩展）
const REPAIRS: &[(&str, Repair)] = &[
    ("strip_code_fences", strip_code_fences),
    ("extract_json_object", extract_json_object),
    ("truncate_after_object", truncate_after_object),
    ("remove_trailing_commas", remove_trailing_commas),
    ("close_open_delimiters", close_open_delimiters),
];

/// 解析入口：严格解码 + 有界修复
pub fn parse_answer(raw: &str) -> Result<AnswerCandidate, AnswerParseError> {
    let mut attempts = 1;
    if let Some(c) = try_decode(raw) {
        return Ok(c);
    }

    let mut current = raw.to_string();
    for (name, repair) in REPAIRS {
        let Some(fixed) = repair(&current) else {
            continue;
        };
        if fixed == current {
            continue;
        }
        current = fixed;
        attempts += 1;
        if let Some(c) = try_decode(&current) {
            tracing::debug!(repair = name, attempts, "answer payload repaired");
            return Ok(c);
        }
    }

    Err(AnswerParseError::Malformed {
        raw: raw.to_string(),
        attempts_tried: attempts,
    })
}

fn try_decode(text: &str) -> Option<AnswerCandidate> {
    let candidate: AnswerCandidate = serde_json::from_str(text.trim()).ok()?;
    if candidate.final_answer.trim().is_empty() {
        return None;
    }
    Some(candidate)
}

// ============================================================================
// 修复变换
// ============================================================================

/// ```json ... ``` 或 ``` ... ``` → 围栏内文本
fn strip_code_fences(s: &str) -> Option<String> {
    let start = s.find("```")?;
    let after = &s[start + 3..];
    // 跳过围栏语言标记（json 等）
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let inner = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    Some(inner.trim().to_string())
}

/// 首个 '{' 到最后一个 '}' 的块
fn extract_json_object(s: &str) -> Option<String> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(s[start..=end].trim().to_string())
}

/// 从首个 '{' 起按括号深度扫描（尊重字符串字面量），
/// 深度归零即截断，去掉负载之后的解释性散文
fn truncate_after_object(s: &str) -> Option<String> {
    let start = s.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(s[start..start + i + c.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// ", }" / ", ]" → "}" / "]"
fn remove_trailing_commas(s: &str) -> Option<String> {
    let re = regex::Regex::new(r",\s*([}\]])").ok()?;
    Some(re.replace_all(s, "$1").into_owned())
}

/// 补齐未闭合的字符串与括号
fn close_open_delimiters(s: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    if !in_string && stack.is_empty() {
        return None;
    }
    let mut fixed = s.trim_end().to_string();
    if in_string {
        fixed.push('"');
    }
    while let Some(closer) = stack.pop() {
        fixed.push(closer);
    }
    Some(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_decode() {
        let c = parse_answer(r#"{"final_answer": "1/2", "approach": "table lookup"}"#).unwrap();
        assert_eq!(c.final_answer, "1/2");
        assert_eq!(c.approach.as_deref(), Some("table lookup"));
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let c = parse_answer(
            r#"{"final_answer": "8", "simplified_question": "find the period of sin(x)"}"#,
        )
        .unwrap();
        assert_eq!(
            c.extra.get("simplified_question").and_then(|v| v.as_str()),
            Some("find the period of sin(x)")
        );
    }

    #[test]
    fn test_prose_wrapped_fenced_json() {
        let raw = "The answer is: ```json\n{\"final_answer\": \"1/2\"}\n``` Hope that helps!";
        let c = parse_answer(raw).unwrap();
        assert_eq!(c.final_answer, "1/2");
    }

    #[test]
    fn test_prose_around_bare_json() {
        let raw = "Sure! {\"final_answer\": \"x = -2, x = -3\"} Let me know if you need steps.";
        let c = parse_answer(raw).unwrap();
        assert_eq!(c.final_answer, "x = -2, x = -3");
    }

    #[test]
    fn test_trailing_comma() {
        let c = parse_answer("{\"final_answer\": \"7\",}").unwrap();
        assert_eq!(c.final_answer, "7");
    }

    #[test]
    fn test_unclosed_brace() {
        let c = parse_answer("{\"final_answer\": \"7\"").unwrap();
        assert_eq!(c.final_answer, "7");
    }

    #[test]
    fn test_unclosed_string_and_brace() {
        let c = parse_answer("{\"final_answer\": \"7").unwrap();
        assert_eq!(c.final_answer, "7");
    }

    #[test]
    fn test_trailing_prose_after_object() {
        let raw = "{\"final_answer\": \"7\"} and that is because 3 + 4 = 7.";
        let c = parse_answer(raw).unwrap();
        assert_eq!(c.final_answer, "7");
    }

    #[test]
    fn test_never_guesses_from_prose() {
        let err = parse_answer("The answer is 42, obviously.").unwrap_err();
        let AnswerParseError::Malformed { attempts_tried, .. } = err;
        assert!(attempts_tried >= 1);
    }

    #[test]
    fn test_missing_final_answer_is_malformed() {
        assert!(parse_answer(r#"{"approach": "no answer here"}"#).is_err());
        assert!(parse_answer(r#"{"final_answer": ""}"#).is_err());
    }
}
