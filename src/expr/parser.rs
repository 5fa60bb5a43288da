//! 表达式文法（nom 组合子）
//!
//! 单一文法覆盖清洗后的答案文本：精确小数（8.2 → 41/5）、Unicode 根号与上标幂、
//! 隐式乘法（2x、2 sin(x)、(x+1)(x-1)）、函数调用、右结合 ^。
//! 解析失败显式返回错误，绝不折算成默认值。

use std::rc::Rc;

use nom::{
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char, multispace0},
    combinator::{map, opt},
    multi::{fold_many0, separated_list0},
    sequence::{delimited, pair, preceded},
    IResult,
};
use num_bigint::BigInt;
use num_rational::BigRational;

use crate::expr::ast::{Constant, Expr};

// ============================================================================
// Unicode 数学符号
// ============================================================================

/// 上标数字字符转数值；非上标返回 None
fn superscript_to_digit(c: char) -> Option<u32> {
    match c {
        '⁰' => Some(0),
        '¹' => Some(1),
        '²' => Some(2),
        '³' => Some(3),
        '⁴' => Some(4),
        '⁵' => Some(5),
        '⁶' => Some(6),
        '⁷' => Some(7),
        '⁸' => Some(8),
        '⁹' => Some(9),
        _ => None,
    }
}

/// 解析一串上标数字，返回 (数值, 剩余输入)
fn parse_superscript_number(input: &str) -> Option<(u64, &str)> {
    let mut value: u64 = 0;
    let mut count = 0;
    let mut byte_len = 0;

    for c in input.chars() {
        if let Some(digit) = superscript_to_digit(c) {
            value = value * 10 + digit as u64;
            count += 1;
            byte_len += c.len_utf8();
        } else {
            break;
        }
    }

    if count > 0 {
        Some((value, &input[byte_len..]))
    } else {
        None
    }
}

/// Unicode 根号前缀：√ ∛ ∜ 以及 ⁿ√，返回 (根次, 剩余输入)
fn parse_unicode_root_prefix(input: &str) -> Option<(u64, &str)> {
    if let Some(rest) = input.strip_prefix('∛') {
        return Some((3, rest));
    }
    if let Some(rest) = input.strip_prefix('∜') {
        return Some((4, rest));
    }
    if let Some(rest) = input.strip_prefix('√') {
        return Some((2, rest));
    }

    if let Some((index, after_num)) = parse_superscript_number(input) {
        if let Some(rest) = after_num.strip_prefix('√') {
            return Some((index, rest));
        }
    }

    None
}

// ============================================================================
// 数字字面量
// ============================================================================

/// 十进制字符串转 BigRational：
/// "8.2" → 41/5, ".5" → 1/2, "8." → 8, "123" → 123
/// 对 "A.B"：num = A*10^k + B, den = 10^k（k = len(B)）
fn decimal_to_rational(integer_part: &str, fractional_part: &str) -> BigRational {
    let k = fractional_part.len();

    if k == 0 {
        let n: BigInt = integer_part.parse().unwrap_or_else(|_| BigInt::from(0));
        return BigRational::from_integer(n);
    }

    let ten = BigInt::from(10);
    let mut denominator = BigInt::from(1);
    for _ in 0..k {
        denominator *= &ten;
    }

    let int_val: BigInt = if integer_part.is_empty() {
        BigInt::from(0)
    } else {
        integer_part.parse().unwrap_or_else(|_| BigInt::from(0))
    };

    let frac_val: BigInt = fractional_part.parse().unwrap_or_else(|_| BigInt::from(0));

    let numerator = int_val * &denominator + frac_val;

    // BigRational::new 自动约分
    BigRational::new(numerator, denominator)
}

// 数字字面量：123, 8.2, .5, 8.
fn parse_number(input: &str) -> IResult<&str, Rc<Expr>> {
    fn is_digit(c: char) -> bool {
        c.is_ascii_digit()
    }

    let (remaining, (int_part, maybe_frac)) = pair(
        take_while(is_digit),
        opt(pair(char('.'), take_while(is_digit))),
    )(input)?;

    let (int_str, frac_str) = match maybe_frac {
        Some((_, frac)) => (int_part, frac),
        None => (int_part, ""),
    };

    // 必须至少有一位数字（"." 单独出现不是数字）
    if int_str.is_empty() && frac_str.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        )));
    }

    let rational = decimal_to_rational(int_str, frac_str);
    Ok((remaining, Expr::rational(rational)))
}

// ============================================================================
// 文法
// ============================================================================

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// 标识符：关键字 → 常量；后跟 '(' → 函数调用；否则变量
fn parse_call_or_name(input: &str) -> IResult<&str, Rc<Expr>> {
    let (rest, name) = take_while(is_ident_char)(input)?;
    if name.is_empty() || !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Alpha,
        )));
    }

    // 函数调用：name(args, ...)
    let call: IResult<&str, Vec<Rc<Expr>>> = delimited(
        preceded(multispace0, char('(')),
        separated_list0(preceded(multispace0, char(',')), parse_expr),
        preceded(multispace0, char(')')),
    )(rest);
    if let Ok((after_args, args)) = call {
        return Ok((after_args, Expr::func(&name.to_lowercase(), args)));
    }

    let node = match name {
        "pi" | "Pi" | "PI" => Expr::constant(Constant::Pi),
        "e" | "E" => Expr::constant(Constant::E),
        "oo" | "inf" | "infinity" | "Infinity" => Expr::constant(Constant::Infinity),
        _ => Expr::var(name),
    };
    Ok((rest, node))
}

fn parse_paren(input: &str) -> IResult<&str, Rc<Expr>> {
    delimited(char('('), parse_expr, preceded(multispace0, char(')')))(input)
}

// √x / ∛x / ⁿ√x：根号绑定到紧随的原子
fn parse_root(input: &str) -> IResult<&str, Rc<Expr>> {
    match parse_unicode_root_prefix(input) {
        Some((index, rest)) => {
            let (rest, radicand) = parse_atom(rest)?;
            let node = if index == 2 {
                Expr::func("sqrt", vec![radicand])
            } else {
                Expr::func("root", vec![radicand, Expr::num(index as i64)])
            };
            Ok((rest, node))
        }
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        ))),
    }
}

fn parse_atom(input: &str) -> IResult<&str, Rc<Expr>> {
    preceded(
        multispace0,
        alt((parse_number, parse_root, parse_paren, parse_call_or_name)),
    )(input)
}

// 幂：原子后跟上标数字（x²）或 ^（右结合，指数允许一元负号）
fn parse_power(input: &str) -> IResult<&str, Rc<Expr>> {
    let (rest, base) = parse_atom(input)?;

    if let Some((n, after)) = parse_superscript_number(rest) {
        return Ok((after, Expr::pow(base, Expr::num(n as i64))));
    }

    let (rest, exp) = opt(preceded(
        preceded(multispace0, char('^')),
        parse_unary,
    ))(rest)?;

    Ok(match exp {
        Some(e) => (rest, Expr::pow(base, e)),
        None => (rest, base),
    })
}

// 一元 ±
fn parse_unary(input: &str) -> IResult<&str, Rc<Expr>> {
    preceded(
        multispace0,
        alt((
            map(preceded(char('-'), parse_unary), Expr::neg),
            preceded(char('+'), parse_unary),
            parse_power,
        )),
    )(input)
}

#[derive(Clone, Copy)]
enum TermOp {
    Mul,
    Div,
}

fn is_constant_name(s: &str) -> bool {
    matches!(
        s,
        "pi" | "Pi" | "PI" | "e" | "E" | "oo" | "inf" | "infinity" | "Infinity"
    )
}

/// 前瞻是否为函数调用（标识符后跟 '('）
fn is_function_call_ahead(s: &str) -> bool {
    let ident: String = s.chars().take_while(|c| is_ident_char(*c)).collect();
    if !ident.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    s[ident.len()..].trim_start().starts_with('(')
}

// 隐式乘法因子。紧贴时（2x、(x+1)(x-1)、3√2）总是允许；
// 隔空格时只允许数字 / 括号 / 根号 / 函数调用 / 常量开头，
// 否则自然语言（"not sure"）会被误解析成变量乘积。
fn parse_implicit_factor(input: &str) -> IResult<&str, Rc<Expr>> {
    let (after_ws, _) = multispace0(input)?;
    let had_ws = after_ws.len() != input.len();
    if had_ws {
        let allowed = after_ws.starts_with('(')
            || after_ws.starts_with('√')
            || after_ws.starts_with('∛')
            || after_ws.starts_with('∜')
            || after_ws
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit() || c == '.')
            || is_function_call_ahead(after_ws)
            || {
                let ident: String =
                    after_ws.chars().take_while(|c| is_ident_char(*c)).collect();
                is_constant_name(&ident)
            };
        if !allowed {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Verify,
            )));
        }
    }
    parse_power(after_ws)
}

// 乘除与隐式乘法；隐式因子不允许前导符号，避免吃掉加减
fn parse_term(input: &str) -> IResult<&str, Rc<Expr>> {
    let (input, first) = parse_unary(input)?;
    fold_many0(
        alt((
            pair(
                map(preceded(multispace0, char('*')), |_| TermOp::Mul),
                parse_unary,
            ),
            pair(
                map(preceded(multispace0, char('/')), |_| TermOp::Div),
                parse_unary,
            ),
            map(parse_implicit_factor, |rhs| (TermOp::Mul, rhs)),
        )),
        move || first.clone(),
        |acc, (op, rhs)| match op {
            TermOp::Mul => Expr::mul(acc, rhs),
            TermOp::Div => Expr::div(acc, rhs),
        },
    )(input)
}

// 加减（左结合）
fn parse_expr(input: &str) -> IResult<&str, Rc<Expr>> {
    let (input, first) = parse_term(input)?;
    fold_many0(
        pair(
            preceded(multispace0, alt((char('+'), char('-')))),
            parse_term,
        ),
        move || first.clone(),
        |acc, (op, rhs)| match op {
            '+' => Expr::add(acc, rhs),
            _ => Expr::sub(acc, rhs),
        },
    )(input)
}

/// 解析一条完整表达式；有剩余输入即失败
pub fn parse(input: &str) -> Result<Rc<Expr>, String> {
    match parse_expr(input) {
        Ok((rest, expr)) => {
            if rest.trim().is_empty() {
                Ok(expr)
            } else {
                Err(format!("unexpected trailing input: {:?}", rest.trim()))
            }
        }
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> String {
        parse(s).unwrap().to_string()
    }

    #[test]
    fn test_precedence_and_assoc() {
        assert_eq!(p("1 + 2 * 3"), "1 + 2 * 3");
        assert_eq!(p("(1 + 2) * 3"), "(1 + 2) * 3");
        assert_eq!(p("2^3^2"), "2^3^2"); // 右结合
        assert_eq!(p("1 - 2 - 3"), "1 - 2 - 3"); // 左结合
    }

    #[test]
    fn test_decimal_exact() {
        assert_eq!(p("8.2"), "41/5");
        assert_eq!(p(".5"), "1/2");
        assert_eq!(p("0.25"), "1/4");
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(p("2x"), "2 * x");
        assert_eq!(p("2 sin(x)"), "2 * sin(x)");
        assert_eq!(p("(x+1)(x-1)"), "(x + 1) * (x - 1)");
    }

    #[test]
    fn test_implicit_does_not_eat_subtraction() {
        assert_eq!(p("2 - 3"), "2 - 3");
        assert_eq!(p("x - 2"), "x - 2");
    }

    #[test]
    fn test_unicode_root_and_superscript() {
        assert_eq!(p("√2"), "sqrt(2)");
        assert_eq!(p("∛8"), "root(8, 3)");
        assert_eq!(p("x²"), "x^2");
        assert_eq!(p("3√2"), "3 * sqrt(2)");
    }

    #[test]
    fn test_constants_and_functions() {
        assert_eq!(p("pi/6"), "pi / 6");
        assert_eq!(p("sin(pi/6)"), "sin(pi / 6)");
        assert_eq!(p("log(x)"), "log(x)");
        assert_eq!(p("oo"), "oo");
    }

    #[test]
    fn test_unary_minus_binds_below_power() {
        // 一元负号优先级低于 ^：-x^2 == -(x^2)
        assert_eq!(p("-x^2"), "-(x^2)");
        assert_eq!(p("2^-3"), "2^-3");
    }

    #[test]
    fn test_unparsable() {
        assert!(parse("x +* 2").is_err());
        assert!(parse("").is_err());
        assert!(parse("hello = world").is_err());
    }
}
