//! 题面方程抽取（期望形式提示）
//!
//! 从自然语言题面里定位 "x^2+5x+6=0" 这类方程：以 '=' 为轴向两侧扩展
//! 数学字符，剥掉粘连的题干词（"Solve"），两侧可解析且恰有一个未知数
//! 时产出提示。抽不出提示不算失败，验证器会跳过等价性检查。

use std::rc::Rc;

use regex::Regex;

use crate::expr::ast::Expr;
use crate::expr::normalize::normalize_expression;

/// 从题面导出的方程提示
#[derive(Debug, Clone)]
pub struct EquationHint {
    pub lhs: Rc<Expr>,
    pub rhs: Rc<Expr>,
    /// 唯一未知数
    pub var: String,
    /// 命中的原文片段，用于备注
    pub text: String,
}

fn is_math_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            ' ' | '\t'
                | '+'
                | '-'
                | '*'
                | '/'
                | '^'
                | '('
                | ')'
                | '.'
                | '_'
                | '{'
                | '}'
                | '\\'
                | '√'
                | '∛'
                | '∜'
                | 'π'
                | '°'
        )
        || ('⁰'..='⁹').contains(&c)
        // ¹²³ 在 Latin-1 区，不落在 ⁰..⁹ 的码位区间内
        || matches!(c, '¹' | '²' | '³')
}

/// 去掉两侧粘连的题干词后尝试解析；返回 (表达式, 实际使用的文本)
fn parse_side(text: &str, strip_leading: bool) -> Option<(Rc<Expr>, String)> {
    let word_prefix = Regex::new(r"^[A-Za-z]+\s+").ok()?;
    let word_suffix = Regex::new(r"\s+[A-Za-z]+$").ok()?;

    let mut candidate = text.trim().to_string();
    for _ in 0..6 {
        if candidate.is_empty() {
            return None;
        }
        if let Ok(expr) = normalize_expression(&candidate) {
            return Some((expr, candidate));
        }
        let stripped = if strip_leading {
            word_prefix.replace(&candidate, "").into_owned()
        } else {
            word_suffix.replace(&candidate, "").into_owned()
        };
        if stripped == candidate {
            return None;
        }
        candidate = stripped.trim().to_string();
    }
    None
}

/// 在题面中寻找可用的方程；找不到返回 None
pub fn derive_hint(problem: &str) -> Option<EquationHint> {
    let chars: Vec<char> = problem.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c != '=' {
            continue;
        }

        // 以 '=' 为轴向两侧扩展数学字符（不跨越其他 '='）
        let mut start = i;
        while start > 0 && is_math_char(chars[start - 1]) {
            start -= 1;
        }
        let mut end = i + 1;
        while end < chars.len() && is_math_char(chars[end]) {
            end += 1;
        }

        let lhs_text: String = chars[start..i].iter().collect();
        let rhs_text: String = chars[i + 1..end].iter().collect();

        let Some((lhs, lhs_used)) = parse_side(&lhs_text, true) else {
            continue;
        };
        let Some((rhs, rhs_used)) = parse_side(&rhs_text, false) else {
            continue;
        };

        let mut vars = Vec::new();
        lhs.collect_vars(&mut vars);
        rhs.collect_vars(&mut vars);
        if vars.len() != 1 {
            continue;
        }

        return Some(EquationHint {
            lhs,
            rhs,
            var: vars.remove(0),
            text: format!("{} = {}", lhs_used.trim(), rhs_used.trim()),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_with_prose() {
        let hint = derive_hint("Solve x^2+5x+6=0").unwrap();
        assert_eq!(hint.var, "x");
        assert_eq!(hint.text, "x^2+5x+6 = 0");
    }

    #[test]
    fn test_unicode_superscript() {
        let hint = derive_hint("Solve x² + 5x + 6 = 0").unwrap();
        assert_eq!(hint.var, "x");
    }

    #[test]
    fn test_no_equation() {
        assert!(derive_hint("What is sin(30°)?").is_none());
        assert!(derive_hint("Find the derivative of sin(x)cos(x)").is_none());
    }

    #[test]
    fn test_two_unknowns_rejected() {
        assert!(derive_hint("Solve the system: 2x + 3y = 7, x - y = 1").is_none());
    }
}
