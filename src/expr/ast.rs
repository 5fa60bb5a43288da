//! 符号表达式树
//!
//! Number 用 BigRational 保证精确算术（验证路径禁止浮点）；
//! Display 按优先级加括号，输出即规范序列化形式。

use std::fmt;
use std::rc::Rc;

use num_rational::BigRational;
use num_traits::Signed;

/// 数学常量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constant {
    Pi,
    E,
    Infinity,
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Pi => write!(f, "pi"),
            Constant::E => write!(f, "e"),
            Constant::Infinity => write!(f, "oo"),
        }
    }
}

/// 表达式节点；子树用 Rc 共享，整棵树不可变
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(BigRational),
    Constant(Constant),
    Variable(String),
    Add(Rc<Expr>, Rc<Expr>),
    Sub(Rc<Expr>, Rc<Expr>),
    Mul(Rc<Expr>, Rc<Expr>),
    Div(Rc<Expr>, Rc<Expr>),
    Pow(Rc<Expr>, Rc<Expr>),
    Neg(Rc<Expr>),
    Function(String, Vec<Rc<Expr>>),
}

impl Expr {
    pub fn num(n: i64) -> Rc<Self> {
        Rc::new(Expr::Number(BigRational::from_integer(n.into())))
    }

    pub fn rational(n: BigRational) -> Rc<Self> {
        Rc::new(Expr::Number(n))
    }

    pub fn var(name: &str) -> Rc<Self> {
        Rc::new(Expr::Variable(name.to_string()))
    }

    pub fn constant(c: Constant) -> Rc<Self> {
        Rc::new(Expr::Constant(c))
    }

    pub fn add(lhs: Rc<Expr>, rhs: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::Add(lhs, rhs))
    }

    pub fn sub(lhs: Rc<Expr>, rhs: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::Sub(lhs, rhs))
    }

    pub fn mul(lhs: Rc<Expr>, rhs: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::Mul(lhs, rhs))
    }

    pub fn div(lhs: Rc<Expr>, rhs: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::Div(lhs, rhs))
    }

    pub fn pow(base: Rc<Expr>, exp: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::Pow(base, exp))
    }

    pub fn neg(expr: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::Neg(expr))
    }

    pub fn func(name: &str, args: Vec<Rc<Expr>>) -> Rc<Self> {
        Rc::new(Expr::Function(name.to_string(), args))
    }

    /// 表达式树节点数，作为复杂度评分（随树增大单调递增）
    pub fn node_count(&self) -> u32 {
        match self {
            Expr::Number(_) | Expr::Constant(_) | Expr::Variable(_) => 1,
            Expr::Add(l, r)
            | Expr::Sub(l, r)
            | Expr::Mul(l, r)
            | Expr::Div(l, r)
            | Expr::Pow(l, r) => 1 + l.node_count() + r.node_count(),
            Expr::Neg(e) => 1 + e.node_count(),
            Expr::Function(_, args) => 1 + args.iter().map(|a| a.node_count()).sum::<u32>(),
        }
    }

    /// 收集自由变量名（按首次出现去重）
    pub fn collect_vars(&self, out: &mut Vec<String>) {
        match self {
            Expr::Variable(name) => {
                if !out.iter().any(|v| v == name) {
                    out.push(name.clone());
                }
            }
            Expr::Number(_) | Expr::Constant(_) => {}
            Expr::Add(l, r)
            | Expr::Sub(l, r)
            | Expr::Mul(l, r)
            | Expr::Div(l, r)
            | Expr::Pow(l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
            Expr::Neg(e) => e.collect_vars(out),
            Expr::Function(_, args) => {
                for a in args {
                    a.collect_vars(out);
                }
            }
        }
    }

    /// 是否不含自由变量（可做数值检查）
    pub fn is_ground(&self) -> bool {
        let mut vars = Vec::new();
        self.collect_vars(&mut vars);
        vars.is_empty()
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Add(_, _) | Expr::Sub(_, _) => 1,
            Expr::Mul(_, _) | Expr::Div(_, _) => 2,
            Expr::Pow(_, _) => 3,
            Expr::Neg(_) => 4,
            Expr::Function(_, _) | Expr::Number(_) | Expr::Constant(_) | Expr::Variable(_) => 5,
        }
    }
}

/// 将 var 替换为 value，返回新树
pub fn substitute(expr: &Rc<Expr>, var: &str, value: &Rc<Expr>) -> Rc<Expr> {
    match &**expr {
        Expr::Variable(name) if name == var => value.clone(),
        Expr::Variable(_) | Expr::Number(_) | Expr::Constant(_) => expr.clone(),
        Expr::Add(a, b) => Expr::add(substitute(a, var, value), substitute(b, var, value)),
        Expr::Sub(a, b) => Expr::sub(substitute(a, var, value), substitute(b, var, value)),
        Expr::Mul(a, b) => Expr::mul(substitute(a, var, value), substitute(b, var, value)),
        Expr::Div(a, b) => Expr::div(substitute(a, var, value), substitute(b, var, value)),
        Expr::Pow(a, b) => Expr::pow(substitute(a, var, value), substitute(b, var, value)),
        Expr::Neg(a) => Expr::neg(substitute(a, var, value)),
        Expr::Function(name, args) => Rc::new(Expr::Function(
            name.clone(),
            args.iter().map(|a| substitute(a, var, value)).collect(),
        )),
    }
}

/// 若表达式是「负形式」（Neg / 负数 / 负系数乘积），返回去负后的形式，供 Display 打印 "a - b"
fn negated_form(e: &Expr) -> Option<Expr> {
    match e {
        Expr::Neg(inner) => Some((**inner).clone()),
        Expr::Number(n) if n.is_negative() => Some(Expr::Number(-n.clone())),
        Expr::Mul(a, b) => match &**a {
            Expr::Number(n) if n.is_negative() => {
                Some(Expr::Mul(Rc::new(Expr::Number(-n.clone())), b.clone()))
            }
            _ => None,
        },
        _ => None,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let my_prec = self.precedence();
        let paren = |f: &mut fmt::Formatter<'_>, e: &Expr, strict: bool| -> fmt::Result {
            let p = e.precedence();
            if p < my_prec || (strict && p <= my_prec) {
                write!(f, "({})", e)
            } else {
                write!(f, "{}", e)
            }
        };

        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Constant(c) => write!(f, "{}", c),
            Expr::Variable(s) => write!(f, "{}", s),
            Expr::Add(l, r) => {
                paren(f, l, false)?;
                if let Some(pos) = negated_form(r) {
                    write!(f, " - ")?;
                    let p = pos.precedence();
                    if p <= my_prec {
                        write!(f, "({})", pos)
                    } else {
                        write!(f, "{}", pos)
                    }
                } else {
                    write!(f, " + ")?;
                    paren(f, r, false)
                }
            }
            Expr::Sub(l, r) => {
                paren(f, l, false)?;
                write!(f, " - ")?;
                paren(f, r, true)
            }
            Expr::Mul(l, r) => {
                paren(f, l, false)?;
                write!(f, " * ")?;
                paren(f, r, false)
            }
            Expr::Div(l, r) => {
                paren(f, l, false)?;
                write!(f, " / ")?;
                paren(f, r, true)
            }
            Expr::Pow(b, e) => {
                // ^ 右结合，基底同级时必须加括号
                paren(f, b, true)?;
                write!(f, "^")?;
                paren(f, e, false)
            }
            Expr::Neg(e) => {
                write!(f, "-")?;
                paren(f, e, false)
            }
            Expr::Function(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_precedence() {
        let e = Expr::add(Expr::num(1), Expr::mul(Expr::var("x"), Expr::num(2)));
        assert_eq!(format!("{}", e), "1 + x * 2");

        let e = Expr::pow(Expr::add(Expr::var("a"), Expr::var("b")), Expr::num(2));
        assert_eq!(format!("{}", e), "(a + b)^2");
    }

    #[test]
    fn test_display_negative_term() {
        // x + (-2) 打印为 x - 2
        let e = Expr::add(Expr::var("x"), Expr::num(-2));
        assert_eq!(format!("{}", e), "x - 2");

        // x + (-2 * y) 打印为 x - 2 * y
        let e = Expr::add(
            Expr::var("x"),
            Expr::mul(Expr::num(-2), Expr::var("y")),
        );
        assert_eq!(format!("{}", e), "x - 2 * y");
    }

    #[test]
    fn test_substitute() {
        let e = Expr::add(Expr::pow(Expr::var("x"), Expr::num(2)), Expr::var("y"));
        let sub = substitute(&e, "x", &Expr::num(3));
        assert_eq!(format!("{}", sub), "3^2 + y");
    }

    #[test]
    fn test_collect_vars() {
        let e = Expr::mul(Expr::var("x"), Expr::add(Expr::var("y"), Expr::var("x")));
        let mut vars = Vec::new();
        e.collect_vars(&mut vars);
        assert_eq!(vars, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_node_count_monotonic() {
        let small = Expr::var("x");
        let big = Expr::add(Expr::var("x"), Expr::num(1));
        assert!(big.node_count() > small.node_count());
    }
}
