//! 答案归一化
//!
//! 自由文本 → 规范符号形式：先做记号清洗（LaTeX 语法糖、度数符号、口语前缀），
//! 再走统一文法解析。答案可以是单个表达式，也可以是解列表（x = -2, x = -3）。
//! 解析失败显式报错，绝不折算成默认值。纯函数。

use std::rc::Rc;

use regex::Regex;
use thiserror::Error;

use crate::expr::ast::Expr;
use crate::expr::parser;
use crate::expr::simplify::{simplify, DomainError};

/// 归一化失败：清洗后仍无法按文法解析
#[derive(Error, Debug, Clone)]
pub enum NormalizeError {
    #[error("unparsable answer {raw:?}: {detail}")]
    Unparsable { raw: String, detail: String },
}

/// 答案的一个组成：可选的赋值变量（x = ...）与表达式
#[derive(Debug, Clone)]
pub struct AnswerPart {
    pub var: Option<String>,
    pub expr: Rc<Expr>,
}

/// 归一化后的答案：一个或多个部分 + 原始文本
#[derive(Debug, Clone)]
pub struct CanonicalAnswer {
    pub raw: String,
    pub parts: Vec<AnswerPart>,
}

impl CanonicalAnswer {
    /// 化简并按固定顺序序列化的规范形式；代数相等的输入得到同一字符串
    pub fn canonical_form(&self) -> Result<String, DomainError> {
        let mut simplified = Vec::new();
        for part in &self.parts {
            simplified.push((part.var.clone(), simplify(&part.expr)?));
        }
        Ok(render_simplified(&simplified))
    }

    /// 所有部分的自由变量
    pub fn free_vars(&self) -> Vec<String> {
        let mut vars = Vec::new();
        for part in &self.parts {
            part.expr.collect_vars(&mut vars);
        }
        vars
    }
}

/// 已化简部分的固定顺序序列化：全为有理数时按数值升序，否则按串排序
pub fn render_simplified(parts: &[(Option<String>, Rc<Expr>)]) -> String {
    let mut rendered: Vec<(Option<&str>, &Rc<Expr>)> = parts
        .iter()
        .map(|(var, e)| (var.as_deref(), e))
        .collect();

    let all_numeric = rendered
        .iter()
        .all(|(_, e)| matches!(&***e, Expr::Number(_)));
    if all_numeric {
        rendered.sort_by(|(_, a), (_, b)| match (&***a, &***b) {
            (Expr::Number(x), Expr::Number(y)) => x.cmp(y),
            _ => std::cmp::Ordering::Equal,
        });
    } else {
        rendered.sort_by_key(|(_, e)| e.to_string());
    }

    let pieces: Vec<String> = rendered
        .iter()
        .map(|(var, e)| match var {
            Some(v) => format!("{} = {}", v, e),
            None => e.to_string(),
        })
        .collect();
    pieces.join(", ")
}

fn replace_regex(text: &str, pattern: &str, rep: &str) -> String {
    match Regex::new(pattern) {
        Ok(re) => re.replace_all(text, rep).into_owned(),
        Err(_) => text.to_string(),
    }
}

/// 记号清洗：LaTeX 与 Unicode 语法糖 → 文法可解析的纯文本
pub fn cleanup(raw: &str) -> String {
    let mut s = raw.trim().to_string();

    // 数学模式定界符
    for (open, close) in [("$$", "$$"), ("$", "$"), ("\\(", "\\)"), ("\\[", "\\]")] {
        if s.starts_with(open) && s.ends_with(close) && s.len() >= open.len() + close.len() {
            s = s[open.len()..s.len() - close.len()].trim().to_string();
        }
    }

    // \frac{a}{b} → (a)/(b)、\sqrt{a} → sqrt(a) 等；
    // 由内向外循环替换以处理嵌套，次数有界
    for _ in 0..8 {
        let mut next = replace_regex(&s, r"\\d?frac\{([^{}]*)\}\{([^{}]*)\}", "($1)/($2)");
        next = replace_regex(&next, r"\\sqrt\[(\d+)\]\{([^{}]*)\}", "root($2, $1)");
        next = replace_regex(&next, r"\\sqrt\{([^{}]*)\}", "sqrt($1)");
        next = replace_regex(&next, r"\^\{([^{}]*)\}", "^($1)");
        next = replace_regex(&next, r"_\{([^{}]*)\}", "$1");
        if next == s {
            break;
        }
        s = next;
    }

    for (from, to) in [
        ("\\left", ""),
        ("\\right", ""),
        ("\\cdot", "*"),
        ("\\times", "*"),
        ("\\pi", "pi"),
        ("\\infty", "oo"),
        ("\\ln", "log"),
        ("\\log", "log"),
        ("\\sin", "sin"),
        ("\\cos", "cos"),
        ("\\tan", "tan"),
        ("\\sqrt", "sqrt"),
        ("\\theta", "theta"),
        // Unicode 记号
        ("°", "*pi/180"),
        ("π", "pi"),
        ("∞", "oo"),
        ("×", "*"),
        ("÷", "/"),
        ("−", "-"),
        ("·", "*"),
    ] {
        s = s.replace(from, to);
    }

    // ln 是自然对数的别名
    s = replace_regex(&s, r"\bln\b", "log");

    // 口语前缀："the answer is ..." 之类
    s = replace_regex(
        &s,
        r"(?i)^\s*(the\s+)?(final\s+)?(answer|result|solution)s?\s*(is|are|:|=)\s*",
        "",
    );

    // 残余的 LaTeX 花括号当普通括号
    s = s.replace('{', "(").replace('}', ")");

    s.trim().to_string()
}

/// 深度为 0 处按 , ; 切分（函数参数里的逗号不拆）
fn split_top_level(s: &str) -> Vec<String> {
    // "x = -2 or x = -3" / "... and ..." 等价于逗号列表
    let s = replace_regex(s, r"\b(or|and)\b", ",");

    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' | ';' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_part(piece: &str) -> Result<AnswerPart, String> {
    if let Some(idx) = piece.find('=') {
        let lhs = piece[..idx].trim();
        let rhs = piece[idx + 1..].trim();
        if !is_identifier(lhs) {
            return Err(format!("left side of '=' is not a variable: {:?}", lhs));
        }
        let expr = parser::parse(rhs)?;
        return Ok(AnswerPart {
            var: Some(lhs.to_string()),
            expr,
        });
    }
    let expr = parser::parse(piece)?;
    Ok(AnswerPart { var: None, expr })
}

/// 归一化入口：清洗 → 切分 → 逐段解析
pub fn normalize(raw: &str) -> Result<CanonicalAnswer, NormalizeError> {
    let cleaned = cleanup(raw);
    if cleaned.is_empty() {
        return Err(NormalizeError::Unparsable {
            raw: raw.to_string(),
            detail: "empty after cleanup".to_string(),
        });
    }

    let mut parts = Vec::new();
    for piece in split_top_level(&cleaned) {
        let part = parse_part(&piece).map_err(|detail| NormalizeError::Unparsable {
            raw: raw.to_string(),
            detail,
        })?;
        parts.push(part);
    }
    if parts.is_empty() {
        return Err(NormalizeError::Unparsable {
            raw: raw.to_string(),
            detail: "no expression found".to_string(),
        });
    }

    Ok(CanonicalAnswer {
        raw: raw.to_string(),
        parts,
    })
}

/// 归一化单个表达式（不做解列表切分）；题面方程抽取复用
pub fn normalize_expression(raw: &str) -> Result<Rc<Expr>, NormalizeError> {
    let cleaned = cleanup(raw);
    parser::parse(&cleaned).map_err(|detail| NormalizeError::Unparsable {
        raw: raw.to_string(),
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(s: &str) -> String {
        normalize(s).unwrap().canonical_form().unwrap()
    }

    #[test]
    fn test_plain_fraction() {
        assert_eq!(canon("1/2"), "1/2");
        assert_eq!(canon("0.5"), "1/2");
    }

    #[test]
    fn test_degree_sign() {
        assert_eq!(canon("sin(30°)"), "1/2");
    }

    #[test]
    fn test_latex_sugar() {
        assert_eq!(canon(r"\frac{1}{2}"), "1/2");
        assert_eq!(canon(r"$\frac{\sqrt{2}}{2}$"), "1/2 * sqrt(2)");
        assert_eq!(canon(r"x^{2}"), "x^2");
    }

    #[test]
    fn test_prose_prefix() {
        assert_eq!(canon("The answer is 1/2"), "1/2");
    }

    #[test]
    fn test_solution_list() {
        assert_eq!(canon("x=-2, x=-3"), "x = -3, x = -2");
        assert_eq!(canon("x = -3 or x = -2"), "x = -3, x = -2");
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(canon("2x + 3x"), "5 * x");
    }

    #[test]
    fn test_equal_inputs_share_canonical_form() {
        assert_eq!(canon("x + 2"), canon("2 + x"));
        assert_eq!(canon("sin(30°)"), canon("1/2"));
        assert_eq!(canon(r"\frac{2}{4}"), canon("0.5"));
    }

    #[test]
    fn test_round_trip_stability() {
        // normalize(serialize(e)) 的规范形式与 e 的规范形式一致
        for input in ["1/2 * sqrt(2)", "x^2 - 5 * x + 6", "pi / 6", "2 * x + 1"] {
            let once = canon(input);
            assert_eq!(canon(&once), once, "round trip failed for {}", input);
        }
    }

    #[test]
    fn test_unparsable() {
        assert!(normalize("I am not sure").is_err());
        assert!(normalize("").is_err());
        assert!(normalize("x +* 2").is_err());
    }
}
