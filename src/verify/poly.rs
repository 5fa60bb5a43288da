//! 一元多项式（BigRational 系数）
//!
//! 从表达式抽取稠密系数向量；用于方程验证里的根校验与综合除法降次
//! （查漏：答案少给了根时商仍含变量）。

use std::rc::Rc;

use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};

use crate::expr::ast::Expr;

/// 稠密一元多项式；coeffs[i] 为 x^i 的系数，尾部零已去除（空向量 = 零多项式）
#[derive(Debug, Clone, PartialEq)]
pub struct Poly {
    coeffs: Vec<BigRational>,
}

impl Poly {
    pub fn zero() -> Self {
        Self { coeffs: Vec::new() }
    }

    pub fn constant(c: BigRational) -> Self {
        let mut p = Self { coeffs: vec![c] };
        p.trim();
        p
    }

    fn x() -> Self {
        Self {
            coeffs: vec![BigRational::zero(), BigRational::from_integer(1.into())],
        }
    }

    fn trim(&mut self) {
        while self.coeffs.last().map(|c| c.is_zero()).unwrap_or(false) {
            self.coeffs.pop();
        }
    }

    /// 次数；零多项式返回 None
    pub fn degree(&self) -> Option<usize> {
        if self.coeffs.is_empty() {
            None
        } else {
            Some(self.coeffs.len() - 1)
        }
    }

    pub fn eval(&self, x: &BigRational) -> BigRational {
        // Horner 法
        let mut acc = BigRational::zero();
        for c in self.coeffs.iter().rev() {
            acc = acc * x + c;
        }
        acc
    }

    fn add(&self, other: &Poly) -> Poly {
        let n = self.coeffs.len().max(other.coeffs.len());
        let mut coeffs = Vec::with_capacity(n);
        for i in 0..n {
            let a = self.coeffs.get(i).cloned().unwrap_or_else(BigRational::zero);
            let b = other
                .coeffs
                .get(i)
                .cloned()
                .unwrap_or_else(BigRational::zero);
            coeffs.push(a + b);
        }
        let mut p = Poly { coeffs };
        p.trim();
        p
    }

    fn neg(&self) -> Poly {
        Poly {
            coeffs: self.coeffs.iter().map(|c| -c.clone()).collect(),
        }
    }

    fn mul(&self, other: &Poly) -> Poly {
        if self.coeffs.is_empty() || other.coeffs.is_empty() {
            return Poly::zero();
        }
        let mut coeffs =
            vec![BigRational::zero(); self.coeffs.len() + other.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in other.coeffs.iter().enumerate() {
                coeffs[i + j] += a * b;
            }
        }
        let mut p = Poly { coeffs };
        p.trim();
        p
    }

    fn pow(&self, n: u32) -> Poly {
        let mut result = Poly::constant(BigRational::from_integer(1.into()));
        for _ in 0..n {
            result = result.mul(self);
        }
        result
    }

    fn scale(&self, factor: &BigRational) -> Poly {
        let mut p = Poly {
            coeffs: self.coeffs.iter().map(|c| c * factor).collect(),
        };
        p.trim();
        p
    }

    /// 以 var 为未知数抽取多项式；含其他变量 / 常量 / 函数时返回 None
    pub fn from_expr(e: &Rc<Expr>, var: &str) -> Option<Poly> {
        match &**e {
            Expr::Number(n) => Some(Poly::constant(n.clone())),
            Expr::Variable(name) if name == var => Some(Poly::x()),
            Expr::Variable(_) | Expr::Constant(_) | Expr::Function(_, _) => None,
            Expr::Add(a, b) => {
                Some(Poly::from_expr(a, var)?.add(&Poly::from_expr(b, var)?))
            }
            Expr::Sub(a, b) => {
                Some(Poly::from_expr(a, var)?.add(&Poly::from_expr(b, var)?.neg()))
            }
            Expr::Mul(a, b) => {
                Some(Poly::from_expr(a, var)?.mul(&Poly::from_expr(b, var)?))
            }
            Expr::Neg(a) => Some(Poly::from_expr(a, var)?.neg()),
            Expr::Div(a, b) => {
                let denom = Poly::from_expr(b, var)?;
                // 仅允许除以非零常数
                if denom.degree() != Some(0) {
                    return None;
                }
                let c = denom.coeffs[0].clone();
                Some(Poly::from_expr(a, var)?.scale(&c.recip()))
            }
            Expr::Pow(base, exp) => {
                let n = match &**exp {
                    Expr::Number(r) if r.is_integer() => r.numer().to_u32()?,
                    _ => return None,
                };
                if n > 32 {
                    return None;
                }
                Some(Poly::from_expr(base, var)?.pow(n))
            }
        }
    }

    /// 综合除法：除以 (x - root)，返回 (商, 余数)
    pub fn deflate(&self, root: &BigRational) -> (Poly, BigRational) {
        if self.coeffs.is_empty() {
            return (Poly::zero(), BigRational::zero());
        }
        let mut quotient = vec![BigRational::zero(); self.coeffs.len() - 1];
        let mut carry = BigRational::zero();
        for (i, c) in self.coeffs.iter().enumerate().rev() {
            let value = c + &carry * root;
            if i == 0 {
                return (
                    {
                        let mut q = Poly { coeffs: quotient };
                        q.trim();
                        q
                    },
                    value,
                );
            }
            quotient[i - 1] = value.clone();
            carry = value;
        }
        (Poly::zero(), BigRational::zero())
    }
}
