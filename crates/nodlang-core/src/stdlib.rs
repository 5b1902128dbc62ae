//! The minimal native operator and function set.
//!
//! Precedence levels (higher binds tighter):
//!
//! | level | operators                 | associativity |
//! |-------|---------------------------|---------------|
//! | 0     | `=` `+=` `-=` `*=` `/=`   | right         |
//! | 1     | `\|\|`                    | left          |
//! | 2     | `&&`                      | left          |
//! | 3     | `==` `!=` `<=>` `=>`      | left          |
//! | 4     | `<` `>` `<=` `>=`         | left          |
//! | 10    | `+` `-`                   | left          |
//! | 20    | `*` `/`                   | left          |
//! | 30    | unary `-` `!`             | right         |

use crate::error::{EvalError, GraphError};
use crate::language::Language;
use crate::signature::{Associativity, Signature};
use crate::type_id::TypeId;
use crate::variant::Variant;

pub const PRECEDENCE_ASSIGN: u8 = 0;
pub const PRECEDENCE_OR: u8 = 1;
pub const PRECEDENCE_AND: u8 = 2;
pub const PRECEDENCE_EQUALITY: u8 = 3;
pub const PRECEDENCE_COMPARISON: u8 = 4;
pub const PRECEDENCE_ADDITIVE: u8 = 10;
pub const PRECEDENCE_MULTIPLICATIVE: u8 = 20;
pub const PRECEDENCE_UNARY: u8 = 30;

type Binary = (TypeId, TypeId, TypeId);

const NUMERIC_PAIRS: [Binary; 4] = [
    // (lhs, rhs, arithmetic result)
    (TypeId::DOUBLE, TypeId::DOUBLE, TypeId::DOUBLE),
    (TypeId::INT, TypeId::INT, TypeId::INT),
    (TypeId::DOUBLE, TypeId::INT, TypeId::DOUBLE),
    (TypeId::INT, TypeId::DOUBLE, TypeId::DOUBLE),
];

fn binary(args: &[Variant]) -> Result<(&Variant, &Variant), EvalError> {
    match args {
        [lhs, rhs] => Ok((lhs, rhs)),
        _ => Err(EvalError::ArityMismatch {
            expected: 2,
            got: args.len(),
        }),
    }
}

fn unary(args: &[Variant]) -> Result<&Variant, EvalError> {
    match args {
        [value] => Ok(value),
        _ => Err(EvalError::ArityMismatch {
            expected: 1,
            got: args.len(),
        }),
    }
}

fn both_int(lhs: &Variant, rhs: &Variant) -> bool {
    matches!((lhs, rhs), (Variant::Int(_), Variant::Int(_)))
}

// -----------------------------------------------------------------------
// Arithmetic
// -----------------------------------------------------------------------

fn add(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (lhs, rhs) = binary(args)?;
    match (lhs, rhs) {
        (Variant::String(a), b) => Ok(Variant::String(format!("{a}{b}"))),
        (Variant::Int(a), Variant::Int(b)) => Ok(Variant::Int(a.wrapping_add(*b))),
        (a, b) => Ok(Variant::Double(a.as_double()? + b.as_double()?)),
    }
}

fn sub(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (lhs, rhs) = binary(args)?;
    if both_int(lhs, rhs) {
        return Ok(Variant::Int(lhs.as_int()?.wrapping_sub(rhs.as_int()?)));
    }
    Ok(Variant::Double(lhs.as_double()? - rhs.as_double()?))
}

fn mul(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (lhs, rhs) = binary(args)?;
    if both_int(lhs, rhs) {
        return Ok(Variant::Int(lhs.as_int()?.wrapping_mul(rhs.as_int()?)));
    }
    Ok(Variant::Double(lhs.as_double()? * rhs.as_double()?))
}

fn div(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (lhs, rhs) = binary(args)?;
    if both_int(lhs, rhs) {
        let divisor = rhs.as_int()?;
        if divisor == 0 {
            return Err(EvalError::DivisionByZero);
        }
        return Ok(Variant::Int(lhs.as_int()?.wrapping_div(divisor)));
    }
    let divisor = rhs.as_double()?;
    if divisor == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    Ok(Variant::Double(lhs.as_double()? / divisor))
}

fn negate(args: &mut [Variant]) -> Result<Variant, EvalError> {
    match unary(args)? {
        Variant::Int(i) => Ok(Variant::Int(i.wrapping_neg())),
        other => Ok(Variant::Double(-other.as_double()?)),
    }
}

// -----------------------------------------------------------------------
// Comparison and logic
// -----------------------------------------------------------------------

fn compare(args: &[Variant]) -> Result<std::cmp::Ordering, EvalError> {
    let (lhs, rhs) = binary(args)?;
    if both_int(lhs, rhs) {
        return Ok(lhs.as_int()?.cmp(&rhs.as_int()?));
    }
    let (a, b) = (lhs.as_double()?, rhs.as_double()?);
    // NaN compares as equal so comparisons stay total
    Ok(a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal))
}

fn lower(args: &mut [Variant]) -> Result<Variant, EvalError> {
    Ok(Variant::Bool(compare(args)?.is_lt()))
}

fn greater(args: &mut [Variant]) -> Result<Variant, EvalError> {
    Ok(Variant::Bool(compare(args)?.is_gt()))
}

fn lower_or_equal(args: &mut [Variant]) -> Result<Variant, EvalError> {
    Ok(Variant::Bool(compare(args)?.is_le()))
}

fn greater_or_equal(args: &mut [Variant]) -> Result<Variant, EvalError> {
    Ok(Variant::Bool(compare(args)?.is_ge()))
}

fn values_equal(lhs: &Variant, rhs: &Variant) -> Result<bool, EvalError> {
    match (lhs, rhs) {
        (Variant::Int(_) | Variant::Double(_), Variant::Int(_) | Variant::Double(_)) => {
            if both_int(lhs, rhs) {
                Ok(lhs.as_int()? == rhs.as_int()?)
            } else {
                Ok(lhs.as_double()? == rhs.as_double()?)
            }
        }
        (a, b) => Ok(a == b),
    }
}

fn equals(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (lhs, rhs) = binary(args)?;
    Ok(Variant::Bool(values_equal(lhs, rhs)?))
}

fn not_equals(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (lhs, rhs) = binary(args)?;
    Ok(Variant::Bool(!values_equal(lhs, rhs)?))
}

fn and(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (lhs, rhs) = binary(args)?;
    Ok(Variant::Bool(lhs.as_bool()? && rhs.as_bool()?))
}

fn or(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (lhs, rhs) = binary(args)?;
    Ok(Variant::Bool(lhs.as_bool()? || rhs.as_bool()?))
}

fn implies(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (lhs, rhs) = binary(args)?;
    Ok(Variant::Bool(!lhs.as_bool()? || rhs.as_bool()?))
}

fn not(args: &mut [Variant]) -> Result<Variant, EvalError> {
    Ok(Variant::Bool(!unary(args)?.as_bool()?))
}

// -----------------------------------------------------------------------
// Assignment (first argument is written through)
// -----------------------------------------------------------------------

fn store(args: &mut [Variant], value: Variant) -> Result<Variant, EvalError> {
    let target = args.first_mut().ok_or(EvalError::ArityMismatch {
        expected: 2,
        got: 0,
    })?;
    // keep the storage kind of the target
    let value = value.coerce(target.kind())?;
    *target = value.clone();
    Ok(value)
}

fn assign(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (_, rhs) = binary(args)?;
    let value = rhs.clone();
    store(args, value)
}

fn add_assign(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let value = add(args)?;
    store(args, value)
}

fn sub_assign(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let value = sub(args)?;
    store(args, value)
}

fn mul_assign(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let value = mul(args)?;
    store(args, value)
}

fn div_assign(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let value = div(args)?;
    store(args, value)
}

// -----------------------------------------------------------------------
// Functions
// -----------------------------------------------------------------------

fn sqrt(args: &mut [Variant]) -> Result<Variant, EvalError> {
    Ok(Variant::Double(unary(args)?.as_double()?.sqrt()))
}

fn pow(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (base, exp) = binary(args)?;
    Ok(Variant::Double(base.as_double()?.powf(exp.as_double()?)))
}

fn min(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (a, b) = binary(args)?;
    Ok(Variant::Double(a.as_double()?.min(b.as_double()?)))
}

fn max(args: &mut [Variant]) -> Result<Variant, EvalError> {
    let (a, b) = binary(args)?;
    Ok(Variant::Double(a.as_double()?.max(b.as_double()?)))
}

fn abs(args: &mut [Variant]) -> Result<Variant, EvalError> {
    match unary(args)? {
        Variant::Int(i) => Ok(Variant::Int(i.wrapping_abs())),
        other => Ok(Variant::Double(other.as_double()?.abs())),
    }
}

fn to_string(args: &mut [Variant]) -> Result<Variant, EvalError> {
    Ok(Variant::String(unary(args)?.to_string()))
}

fn binary_op(identifier: &str, lhs: TypeId, rhs: TypeId, ret: TypeId, precedence: u8) -> Signature {
    Signature::new(identifier, ret)
        .arg(lhs, "lhs")
        .arg(rhs, "rhs")
        .operator(precedence, Associativity::Left)
}

impl Language {
    /// Builds the standard language: built-in types plus the operator and
    /// function set documented in this module.
    pub fn standard() -> Result<Language, GraphError> {
        let mut lang = Language::new();

        // Arithmetic
        for (lhs, rhs, ret) in NUMERIC_PAIRS {
            lang.register(binary_op("+", lhs, rhs, ret, PRECEDENCE_ADDITIVE), add);
            lang.register(binary_op("-", lhs, rhs, ret, PRECEDENCE_ADDITIVE), sub);
            lang.register(binary_op("*", lhs, rhs, ret, PRECEDENCE_MULTIPLICATIVE), mul);
            lang.register(binary_op("/", lhs, rhs, ret, PRECEDENCE_MULTIPLICATIVE), div);
        }
        for rhs in [TypeId::STRING, TypeId::INT, TypeId::DOUBLE, TypeId::BOOL] {
            lang.register(
                binary_op("+", TypeId::STRING, rhs, TypeId::STRING, PRECEDENCE_ADDITIVE),
                add,
            );
        }

        // Comparison
        for (lhs, rhs, _) in NUMERIC_PAIRS {
            lang.register(binary_op("<", lhs, rhs, TypeId::BOOL, PRECEDENCE_COMPARISON), lower);
            lang.register(binary_op(">", lhs, rhs, TypeId::BOOL, PRECEDENCE_COMPARISON), greater);
            lang.register(
                binary_op("<=", lhs, rhs, TypeId::BOOL, PRECEDENCE_COMPARISON),
                lower_or_equal,
            );
            lang.register(
                binary_op(">=", lhs, rhs, TypeId::BOOL, PRECEDENCE_COMPARISON),
                greater_or_equal,
            );
            lang.register(binary_op("==", lhs, rhs, TypeId::BOOL, PRECEDENCE_EQUALITY), equals);
            lang.register(binary_op("!=", lhs, rhs, TypeId::BOOL, PRECEDENCE_EQUALITY), not_equals);
        }
        for ty in [TypeId::BOOL, TypeId::STRING] {
            lang.register(binary_op("==", ty, ty, TypeId::BOOL, PRECEDENCE_EQUALITY), equals);
            lang.register(binary_op("!=", ty, ty, TypeId::BOOL, PRECEDENCE_EQUALITY), not_equals);
        }

        // Logic
        let (b, prec_eq) = (TypeId::BOOL, PRECEDENCE_EQUALITY);
        lang.register(binary_op("<=>", b, b, b, prec_eq), equals);
        lang.register(binary_op("=>", b, b, b, prec_eq), implies);
        lang.register(binary_op("&&", b, b, b, PRECEDENCE_AND), and);
        lang.register(binary_op("||", b, b, b, PRECEDENCE_OR), or);

        // Unary
        for ty in [TypeId::DOUBLE, TypeId::INT] {
            lang.register(
                Signature::new("-", ty)
                    .arg(ty, "value")
                    .operator(PRECEDENCE_UNARY, Associativity::Right),
                negate,
            );
        }
        lang.register(
            Signature::new("!", b)
                .arg(b, "value")
                .operator(PRECEDENCE_UNARY, Associativity::Right),
            not,
        );

        // Assignment
        for ty in [TypeId::BOOL, TypeId::INT, TypeId::DOUBLE, TypeId::STRING, TypeId::ANY] {
            let lvalue = lang.types_mut().reference_to(ty)?;
            lang.register(
                Signature::new("=", ty)
                    .arg(lvalue, "lvalue")
                    .arg(ty, "rvalue")
                    .operator(PRECEDENCE_ASSIGN, Associativity::Right),
                assign,
            );
        }
        for ty in [TypeId::INT, TypeId::DOUBLE] {
            let lvalue = lang.types_mut().reference_to(ty)?;
            for (identifier, func) in [
                ("+=", add_assign as fn(&mut [Variant]) -> Result<Variant, EvalError>),
                ("-=", sub_assign),
                ("*=", mul_assign),
                ("/=", div_assign),
            ] {
                lang.register(
                    Signature::new(identifier, ty)
                        .arg(lvalue, "lvalue")
                        .arg(ty, "rvalue")
                        .operator(PRECEDENCE_ASSIGN, Associativity::Right),
                    func,
                );
            }
        }
        let string_ref = lang.types_mut().reference_to(TypeId::STRING)?;
        lang.register(
            Signature::new("+=", TypeId::STRING)
                .arg(string_ref, "lvalue")
                .arg(TypeId::STRING, "rvalue")
                .operator(PRECEDENCE_ASSIGN, Associativity::Right),
            add_assign,
        );

        // Functions
        let d = TypeId::DOUBLE;
        lang.register(Signature::new("sqrt", d).arg(d, "value"), sqrt);
        lang.register(Signature::new("pow", d).arg(d, "base").arg(d, "exponent"), pow);
        lang.register(Signature::new("min", d).arg(d, "a").arg(d, "b"), min);
        lang.register(Signature::new("max", d).arg(d, "a").arg(d, "b"), max);
        lang.register(Signature::new("abs", TypeId::INT).arg(TypeId::INT, "value"), abs);
        lang.register(Signature::new("abs", d).arg(d, "value"), abs);
        lang.register(
            Signature::new("to_string", TypeId::STRING).arg(TypeId::ANY, "value"),
            to_string,
        );

        Ok(lang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Arity;

    fn call(lang: &Language, identifier: &str, mut args: Vec<Variant>, types: &[TypeId]) -> Result<Variant, EvalError> {
        let id = lang
            .find_invokable(identifier, types)
            .unwrap_or_else(|| panic!("no overload for {identifier}"));
        let invokable = lang.invokable(id).unwrap();
        (invokable.func)(&mut args)
    }

    #[test]
    fn mixed_numeric_addition_is_double() {
        let lang = Language::standard().unwrap();
        let id = lang.find_invokable("+", &[TypeId::INT, TypeId::DOUBLE]).unwrap();
        assert_eq!(lang.invokable(id).unwrap().signature.return_type, TypeId::DOUBLE);
        let result = call(
            &lang,
            "+",
            vec![Variant::Int(2), Variant::Double(0.5)],
            &[TypeId::INT, TypeId::DOUBLE],
        );
        assert_eq!(result, Ok(Variant::Double(2.5)));
    }

    #[test]
    fn integer_division_by_zero_is_an_error() {
        let lang = Language::standard().unwrap();
        let result = call(
            &lang,
            "/",
            vec![Variant::Int(1), Variant::Int(0)],
            &[TypeId::INT, TypeId::INT],
        );
        assert_eq!(result, Err(EvalError::DivisionByZero));
    }

    #[test]
    fn string_concatenation() {
        let lang = Language::standard().unwrap();
        let result = call(
            &lang,
            "+",
            vec![Variant::from("n="), Variant::Int(3)],
            &[TypeId::STRING, TypeId::INT],
        );
        assert_eq!(result, Ok(Variant::from("n=3")));
    }

    #[test]
    fn assignment_writes_through_first_argument() {
        let mut args = vec![Variant::Double(1.0), Variant::Int(4)];
        let result = assign(&mut args);
        assert_eq!(result, Ok(Variant::Double(4.0)));
        assert_eq!(args[0], Variant::Double(4.0));

        let mut args = vec![Variant::Int(3), Variant::Int(4)];
        assert_eq!(add_assign(&mut args), Ok(Variant::Int(7)));
        assert_eq!(args[0], Variant::Int(7));
    }

    #[test]
    fn double_assignment_prefers_double_lvalue() {
        let lang = Language::standard().unwrap();
        let id = lang.find_invokable("=", &[TypeId::DOUBLE, TypeId::INT]).unwrap();
        let sig = &lang.invokable(id).unwrap().signature;
        assert_eq!(lang.types().strip(sig.args[0].ty), TypeId::DOUBLE);
    }

    #[test]
    fn bool_and_string_operands_do_not_resolve_arithmetic() {
        let lang = Language::standard().unwrap();
        assert!(lang.find_invokable("-", &[TypeId::BOOL, TypeId::STRING]).is_none());
        assert!(lang.find_invokable("<", &[TypeId::STRING, TypeId::STRING]).is_none());
    }

    #[test]
    fn precedence_table() {
        let lang = Language::standard().unwrap();
        let prec = |op: &str, arity| lang.find_operator(op, arity).map(|o| o.precedence);
        assert_eq!(prec("*", Arity::Binary), Some(PRECEDENCE_MULTIPLICATIVE));
        assert_eq!(prec("+", Arity::Binary), Some(PRECEDENCE_ADDITIVE));
        assert_eq!(prec("=", Arity::Binary), Some(PRECEDENCE_ASSIGN));
        assert_eq!(prec("!", Arity::Unary), Some(PRECEDENCE_UNARY));
        assert_eq!(
            lang.find_operator("=", Arity::Binary).map(|o| o.associativity),
            Some(Associativity::Right)
        );
    }

    #[test]
    fn comparisons() {
        let mut args = vec![Variant::Int(2), Variant::Double(5.0)];
        assert_eq!(greater(&mut args), Ok(Variant::Bool(false)));
        assert_eq!(lower(&mut args), Ok(Variant::Bool(true)));
        let mut args = vec![Variant::Int(2), Variant::Double(2.0)];
        assert_eq!(equals(&mut args), Ok(Variant::Bool(true)));
    }
}
