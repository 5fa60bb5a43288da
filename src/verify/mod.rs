//! CAS 验证器
//!
//! 按固定顺序跑检查组：解析（上游委托）→ 化简 → 数值健全性 →
//! 复杂度评分 → 等价性（题面可导出方程时代回检验 + 多项式降次查漏）。
//! 任何失败路径都落成带 failure_reason 的裁定，绝不向调用方抛未受控错误；
//! 等价性判定只用精确算术，不做浮点比较。

pub mod equation;
pub mod poly;

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::SolverSection;
use crate::expr::ast::{substitute, Expr};
use crate::expr::normalize::{render_simplified, CanonicalAnswer};
use crate::expr::simplify::{simplify, DomainError};
use crate::solve::ProblemStatement;
use equation::{derive_hint, EquationHint};
use poly::Poly;

pub use equation::derive_hint as derive_equation_hint;

/// 验证失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Unparsable,
    DomainError,
    NotEquivalent,
    ExceedsComplexity,
}

/// 验证裁定；产出后不可变
#[derive(Debug, Clone, Serialize)]
pub struct VerificationVerdict {
    pub is_valid: bool,
    /// is_valid 为 true 时必有
    pub canonical_form: Option<String>,
    /// 精确有理值（非浮点近似）；仅当表达式约到单个有理数
    pub numeric_value: Option<String>,
    pub complexity_score: u32,
    pub failure_reason: Option<FailureReason>,
    /// 人读备注（化简过程、残差、跳过的检查）
    pub notes: Vec<String>,
}

/// 验证器：无状态纯检查，可跨会话并发复用
#[derive(Debug, Clone)]
pub struct Verifier {
    complexity_limit: u32,
    complexity_gate: bool,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            complexity_limit: 80,
            complexity_gate: false,
        }
    }
}

impl Verifier {
    pub fn new(complexity_limit: u32, complexity_gate: bool) -> Self {
        Self {
            complexity_limit,
            complexity_gate,
        }
    }

    pub fn from_config(cfg: &SolverSection) -> Self {
        Self {
            complexity_limit: cfg.complexity_limit,
            complexity_gate: cfg.complexity_gate,
        }
    }

    /// 归一化失败对应的裁定（检查 1：候选必须已是规范表达式）
    pub fn unparsable(raw: &str, detail: &str) -> VerificationVerdict {
        VerificationVerdict {
            is_valid: false,
            canonical_form: None,
            numeric_value: None,
            complexity_score: 0,
            failure_reason: Some(FailureReason::Unparsable),
            notes: vec![format!("cannot parse {:?}: {}", raw, detail)],
        }
    }

    /// 检查组主入口
    pub fn verify(
        &self,
        answer: &CanonicalAnswer,
        problem: &ProblemStatement,
    ) -> VerificationVerdict {
        let verdict = self.run_checks(answer, problem);

        let audit = serde_json::json!({
            "event": "verify_audit",
            "raw": answer.raw,
            "is_valid": verdict.is_valid,
            "failure_reason": verdict.failure_reason,
            "complexity": verdict.complexity_score,
        });
        tracing::info!(audit = %audit.to_string(), "verify");

        verdict
    }

    fn run_checks(
        &self,
        answer: &CanonicalAnswer,
        problem: &ProblemStatement,
    ) -> VerificationVerdict {
        let mut notes: Vec<String> = Vec::new();

        // 检查 2：化简，记录前后形式
        let mut simplified: Vec<(Option<String>, Rc<Expr>)> = Vec::new();
        for part in &answer.parts {
            match simplify(&part.expr) {
                Ok(s) => {
                    let before = part.expr.to_string();
                    let after = s.to_string();
                    if before != after {
                        notes.push(format!("simplified from {} to {}", before, after));
                    }
                    simplified.push((part.var.clone(), s));
                }
                Err(DomainError(msg)) => {
                    notes.push(format!("undefined operation in {}: {}", part.expr, msg));
                    return invalid(FailureReason::DomainError, None, None, 0, notes);
                }
            }
        }

        let canonical = render_simplified(&simplified);

        // 检查 3：数值健全性（无自由符号时求精确值）
        let mut numeric_value = None;
        if simplified.len() == 1 && simplified[0].0.is_none() && simplified[0].1.is_ground() {
            match &*simplified[0].1 {
                Expr::Number(n) => numeric_value = Some(n.to_string()),
                _ => notes.push("exact value is not rational; canonical form carries it".to_string()),
            }
        }

        // 检查 4：复杂度评分，默认只做提示信号
        let complexity: u32 = simplified.iter().map(|(_, e)| e.node_count()).sum();
        if complexity > self.complexity_limit {
            notes.push(format!(
                "suspiciously complex answer: score {} exceeds {}",
                complexity, self.complexity_limit
            ));
            if self.complexity_gate {
                return invalid(
                    FailureReason::ExceedsComplexity,
                    Some(canonical),
                    numeric_value,
                    complexity,
                    notes,
                );
            }
        }

        // 检查 5：题面可导出方程时做等价性检验
        if let Some(hint) = derive_hint(&problem.text) {
            notes.push(format!("checking answer against equation {}", hint.text));
            match self.check_equation(&hint, &simplified, &mut notes) {
                Ok(true) => {}
                Ok(false) => {
                    return invalid(
                        FailureReason::NotEquivalent,
                        Some(canonical),
                        numeric_value,
                        complexity,
                        notes,
                    );
                }
                Err(DomainError(msg)) => {
                    notes.push(format!("undefined operation during substitution: {}", msg));
                    return invalid(
                        FailureReason::DomainError,
                        Some(canonical),
                        numeric_value,
                        complexity,
                        notes,
                    );
                }
            }
        }

        VerificationVerdict {
            is_valid: true,
            canonical_form: Some(canonical),
            numeric_value,
            complexity_score: complexity,
            failure_reason: None,
            notes,
        }
    }

    /// 代回检验 + 多项式降次查漏
    fn check_equation(
        &self,
        hint: &EquationHint,
        parts: &[(Option<String>, Rc<Expr>)],
        notes: &mut Vec<String>,
    ) -> Result<bool, DomainError> {
        let diff = Expr::sub(hint.lhs.clone(), hint.rhs.clone());

        for (var_opt, value) in parts {
            if let Some(v) = var_opt {
                if v != &hint.var {
                    notes.push(format!(
                        "answer assigns {} but the equation's unknown is {}",
                        v, hint.var
                    ));
                    return Ok(false);
                }
            }
            let residual = simplify(&substitute(&diff, &hint.var, value))?;
            match &*residual {
                Expr::Number(n) if num_traits::Zero::is_zero(n) => {}
                _ => {
                    notes.push(format!(
                        "substituting {} = {} leaves residual {}",
                        hint.var, value, residual
                    ));
                    return Ok(false);
                }
            }
        }

        // 声称的根都代回为零；若方程是多项式且根全为有理数，用综合除法查漏
        match Poly::from_expr(&simplify(&diff)?, &hint.var) {
            Some(p) => {
                let rational_roots: Option<Vec<_>> = parts
                    .iter()
                    .map(|(_, v)| match &**v {
                        Expr::Number(n) => Some(n.clone()),
                        _ => None,
                    })
                    .collect();
                match rational_roots {
                    Some(roots) => {
                        let mut remaining = p;
                        for root in &roots {
                            let (q, rem) = remaining.deflate(root);
                            if !num_traits::Zero::is_zero(&rem) {
                                notes.push(format!(
                                    "root {} is claimed more often than its multiplicity",
                                    root
                                ));
                                return Ok(false);
                            }
                            remaining = q;
                        }
                        if let Some(d) = remaining.degree() {
                            if d > 0 {
                                notes.push(format!(
                                    "the equation has roots missing from the answer; a degree {} factor remains",
                                    d
                                ));
                                return Ok(false);
                            }
                        }
                    }
                    None => notes.push(
                        "completeness check skipped: answer contains non-rational roots"
                            .to_string(),
                    ),
                }
            }
            None => notes.push(
                "completeness check skipped: equation is not a polynomial in the unknown"
                    .to_string(),
            ),
        }

        Ok(true)
    }
}

fn invalid(
    reason: FailureReason,
    canonical_form: Option<String>,
    numeric_value: Option<String>,
    complexity_score: u32,
    notes: Vec<String>,
) -> VerificationVerdict {
    VerificationVerdict {
        is_valid: false,
        canonical_form,
        numeric_value,
        complexity_score,
        failure_reason: Some(reason),
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::normalize::normalize;
    use crate::solve::ProblemStatement;

    fn verify(answer: &str, problem: &str) -> VerificationVerdict {
        let canonical = normalize(answer).unwrap();
        Verifier::default().verify(&canonical, &ProblemStatement::new(problem))
    }

    #[test]
    fn test_numeric_answer_valid() {
        let v = verify("1/2", "What is sin(30°)?");
        assert!(v.is_valid);
        assert_eq!(v.canonical_form.as_deref(), Some("1/2"));
        assert_eq!(v.numeric_value.as_deref(), Some("1/2"));
        assert!(v.failure_reason.is_none());
    }

    #[test]
    fn test_equal_surface_forms_share_canonical() {
        let a = verify("0.5", "What is sin(30°)?");
        let b = verify("sin(30°)", "What is sin(30°)?");
        assert_eq!(a.canonical_form, b.canonical_form);
    }

    #[test]
    fn test_incomplete_root_set_rejected() {
        let v = verify("x=-2", "Solve x^2+5x+6=0");
        assert!(!v.is_valid);
        assert_eq!(v.failure_reason, Some(FailureReason::NotEquivalent));
        assert!(v
            .notes
            .iter()
            .any(|n| n.contains("roots missing") || n.contains("factor remains")));
    }

    #[test]
    fn test_complete_root_set_accepted() {
        let v = verify("x=-2, x=-3", "Solve x^2+5x+6=0");
        assert!(v.is_valid, "notes: {:?}", v.notes);
        assert_eq!(v.canonical_form.as_deref(), Some("x = -3, x = -2"));
    }

    #[test]
    fn test_wrong_root_rejected() {
        let v = verify("x=1", "Solve x^2+5x+6=0");
        assert!(!v.is_valid);
        assert_eq!(v.failure_reason, Some(FailureReason::NotEquivalent));
        assert!(v.notes.iter().any(|n| n.contains("residual")));
    }

    #[test]
    fn test_domain_error() {
        let v = verify("1/0", "What is 1/0?");
        assert!(!v.is_valid);
        assert_eq!(v.failure_reason, Some(FailureReason::DomainError));
    }

    #[test]
    fn test_irrational_exact_value() {
        let v = verify("sqrt(2)", "What is the length of the diagonal of a unit square?");
        assert!(v.is_valid);
        assert_eq!(v.canonical_form.as_deref(), Some("sqrt(2)"));
        assert!(v.numeric_value.is_none());
    }

    #[test]
    fn test_complexity_is_informational_by_default() {
        let long = "x + ".repeat(60) + "x";
        let v = verify(&long, "Simplify");
        assert!(v.is_valid);
    }

    #[test]
    fn test_complexity_gate_when_enabled() {
        let canonical = normalize("sqrt(2) + sqrt(3) + sqrt(5) + sqrt(7)").unwrap();
        let v = Verifier::new(3, true).verify(&canonical, &ProblemStatement::new("Evaluate"));
        assert!(!v.is_valid);
        assert_eq!(v.failure_reason, Some(FailureReason::ExceedsComplexity));
    }

    #[test]
    fn test_notes_record_simplification() {
        let v = verify("2/4", "What is 1/2?");
        assert!(v.is_valid);
        assert!(v.notes.iter().any(|n| n.contains("simplified from")));
    }
}
