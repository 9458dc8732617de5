//! C source generation for specialized kernels
//!
//! One template per kernel kind. The template reads operands through
//! `memcpy` (inputs need not be aligned), casts them to the operator's types,
//! applies the operator and casts the result to the output type. Built-in
//! operators are expanded inline with the same integer semantics as the
//! factory kernels; user operators and types are pasted in from their C
//! definitions.

use super::{ABI_VERSION, SpecializeError, Signature};
use crate::dtype::{DType, ElemType};
use crate::kernels::{KernelKind, OpRef, OperationDesc};
use crate::ops::{BinaryOp, BinaryOpcode, IndexUnaryOp, IndexUnaryOpcode, Terminal, UnaryOp, UnaryOpcode};
use std::fmt::Write as _;

/// Types, cast helpers and the argument block shared by every kernel.
const PRELUDE: &str = r#"#include <stdint.h>
#include <stdbool.h>
#include <string.h>
#include <math.h>

typedef struct
{
    int64_t n ;
    const uint8_t *x ;
    const uint8_t *y ;
    uint8_t *z ;
    uint8_t *keep ;
    const int64_t *i ;
    int64_t i0 ;
    int64_t j ;
    int64_t x_stride ;
    int64_t y_stride ;
}
sparx_kernel_args ;

#if defined (__SIZEOF_INT128__)
typedef __int128 sparx_wide ;
#else
typedef int64_t sparx_wide ;
#endif

#define SPARX_SIGNED(T,U,LO,HI)                                             \
static inline T sparx_idiv_##T (T x, T y)                                   \
{                                                                           \
    if (y == 0) return (x == 0) ? 0 : ((x < 0) ? LO : HI) ;                 \
    if (y == -1) return (T) (0 - (U) x) ;                                   \
    return (T) (x / y) ;                                                    \
}                                                                           \
static inline T sparx_cast_to_##T (double x)                                \
{                                                                           \
    if (isnan (x)) return 0 ;                                               \
    if (x <= (double) LO) return LO ;                                       \
    if (x >= (double) HI) return HI ;                                       \
    return (T) x ;                                                          \
}

#define SPARX_UNSIGNED(T,HI)                                                \
static inline T sparx_idiv_##T (T x, T y)                                   \
{                                                                           \
    if (y == 0) return (x == 0) ? 0 : HI ;                                  \
    return (T) (x / y) ;                                                    \
}                                                                           \
static inline T sparx_cast_to_##T (double x)                                \
{                                                                           \
    if (isnan (x) || x <= 0) return 0 ;                                     \
    if (x >= (double) HI) return HI ;                                       \
    return (T) x ;                                                          \
}

SPARX_SIGNED (int8_t, uint8_t, INT8_MIN, INT8_MAX)
SPARX_SIGNED (int16_t, uint16_t, INT16_MIN, INT16_MAX)
SPARX_SIGNED (int32_t, uint32_t, INT32_MIN, INT32_MAX)
SPARX_SIGNED (int64_t, uint64_t, INT64_MIN, INT64_MAX)
SPARX_UNSIGNED (uint8_t, UINT8_MAX)
SPARX_UNSIGNED (uint16_t, UINT16_MAX)
SPARX_UNSIGNED (uint32_t, UINT32_MAX)
SPARX_UNSIGNED (uint64_t, UINT64_MAX)

#define SPARX_LOAD(dst,p,k,stride) memcpy (&(dst), (p) + (k) * (stride) * sizeof (dst), sizeof (dst))
"#;

type Result<T> = std::result::Result<T, SpecializeError>;

fn codegen_err(msg: impl Into<String>) -> SpecializeError {
    SpecializeError::Codegen(msg.into())
}

fn c_type(t: &ElemType) -> Result<String> {
    match t {
        ElemType::Builtin(d) => d
            .c_name()
            .map(str::to_string)
            .ok_or_else(|| codegen_err(format!("{d} has no C type"))),
        ElemType::User(u) => Ok(u.name().to_string()),
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Class {
    Bool,
    Signed,
    Unsigned,
    Float,
    User,
}

fn class(t: &ElemType) -> Class {
    match t.dtype() {
        Some(DType::Bool) => Class::Bool,
        Some(d) if d.is_signed_int() => Class::Signed,
        Some(d) if d.is_unsigned_int() => Class::Unsigned,
        Some(_) => Class::Float,
        None => Class::User,
    }
}

/// Expression converting the value `v` of type `from` to `to`
fn cast_expr(from: &ElemType, to: &ElemType, v: &str) -> Result<String> {
    if from == to {
        return Ok(v.to_string());
    }
    let to_c = c_type(to)?;
    Ok(match (class(from), class(to)) {
        (Class::User, _) | (_, Class::User) => {
            return Err(codegen_err(format!("no cast from {from} to {to}")));
        }
        (_, Class::Bool) => format!("({v} != 0)"),
        (Class::Float, Class::Signed | Class::Unsigned) => {
            format!("sparx_cast_to_{to_c} ((double) {v})")
        }
        _ => format!("(({to_c}) {v})"),
    })
}

fn float_fn(t: &ElemType, name: &str) -> String {
    if t.dtype() == Some(DType::F32) {
        format!("{name}f")
    } else {
        name.to_string()
    }
}

fn unary_expr(op: UnaryOpcode, t: &ElemType) -> Result<String> {
    let c = class(t);
    let ct = c_type(t)?;
    Ok(match op {
        UnaryOpcode::Identity => "x".into(),
        UnaryOpcode::One => "1".into(),
        UnaryOpcode::Lnot => "!(x != 0)".into(),
        UnaryOpcode::Ainv => match c {
            Class::Bool => "x".into(),
            _ => "-x".into(),
        },
        UnaryOpcode::Abs => match c {
            Class::Bool | Class::Unsigned => "x".into(),
            Class::Signed => "((x < 0) ? -x : x)".into(),
            _ => format!("{} (x)", float_fn(t, "fabs")),
        },
        UnaryOpcode::Minv => match c {
            Class::Bool => "1".into(),
            Class::Signed | Class::Unsigned => format!("sparx_idiv_{ct} (1, x)"),
            _ => "(1 / x)".into(),
        },
    })
}

fn binary_expr(op: BinaryOpcode, t: &ElemType) -> Result<String> {
    let c = class(t);
    if c == Class::User {
        return match op {
            BinaryOpcode::First => Ok("x".into()),
            BinaryOpcode::Second | BinaryOpcode::Any => Ok("y".into()),
            _ => Err(codegen_err(format!("{} is not defined on {t}", op.name()))),
        };
    }
    let ct = c_type(t)?;
    let bool_ty = c == Class::Bool;
    Ok(match op {
        BinaryOpcode::First => "x".into(),
        BinaryOpcode::Second | BinaryOpcode::Any => "y".into(),
        BinaryOpcode::Pair => "1".into(),
        BinaryOpcode::Plus if bool_ty => "(x || y)".into(),
        BinaryOpcode::Plus => "(x + y)".into(),
        BinaryOpcode::Minus if bool_ty => "(x != y)".into(),
        BinaryOpcode::Minus => "(x - y)".into(),
        BinaryOpcode::Rminus if bool_ty => "(y != x)".into(),
        BinaryOpcode::Rminus => "(y - x)".into(),
        BinaryOpcode::Times if bool_ty => "(x && y)".into(),
        BinaryOpcode::Times => "(x * y)".into(),
        BinaryOpcode::Div => match c {
            Class::Bool => "x".into(),
            Class::Signed | Class::Unsigned => format!("sparx_idiv_{ct} (x, y)"),
            _ => "(x / y)".into(),
        },
        BinaryOpcode::Min => match c {
            Class::Bool => "(x && y)".into(),
            Class::Float => format!("{} (x, y)", float_fn(t, "fmin")),
            _ => "((x < y) ? x : y)".into(),
        },
        BinaryOpcode::Max => match c {
            Class::Bool => "(x || y)".into(),
            Class::Float => format!("{} (x, y)", float_fn(t, "fmax")),
            _ => "((x > y) ? x : y)".into(),
        },
        BinaryOpcode::Eq => "(x == y)".into(),
        BinaryOpcode::Ne => "(x != y)".into(),
        BinaryOpcode::Gt => "(x > y)".into(),
        BinaryOpcode::Lt => "(x < y)".into(),
        BinaryOpcode::Ge => "(x >= y)".into(),
        BinaryOpcode::Le => "(x <= y)".into(),
        BinaryOpcode::Lor => "((x != 0) || (y != 0))".into(),
        BinaryOpcode::Land => "((x != 0) && (y != 0))".into(),
        BinaryOpcode::Lxor => "((x != 0) != (y != 0))".into(),
    })
}

fn index_unary_expr(op: IndexUnaryOpcode) -> &'static str {
    match op {
        IndexUnaryOpcode::RowIndex => "((sparx_wide) i + y != 0)",
        IndexUnaryOpcode::ColIndex => "((sparx_wide) j + y != 0)",
        IndexUnaryOpcode::Tril => "((sparx_wide) j <= (sparx_wide) i + y)",
        IndexUnaryOpcode::Triu => "((sparx_wide) j >= (sparx_wide) i + y)",
        IndexUnaryOpcode::Diag => "((sparx_wide) j == (sparx_wide) i + y)",
        IndexUnaryOpcode::Offdiag => "((sparx_wide) j != (sparx_wide) i + y)",
        IndexUnaryOpcode::RowLe => "(i <= y)",
        IndexUnaryOpcode::RowGt => "(i > y)",
        IndexUnaryOpcode::ColLe => "(j <= y)",
        IndexUnaryOpcode::ColGt => "(j > y)",
        IndexUnaryOpcode::ValueEq => "(x == y)",
        IndexUnaryOpcode::ValueNe => "(x != y)",
        IndexUnaryOpcode::ValueGt => "(x > y)",
        IndexUnaryOpcode::ValueGe => "(x >= y)",
        IndexUnaryOpcode::ValueLt => "(x < y)",
        IndexUnaryOpcode::ValueLe => "(x <= y)",
        IndexUnaryOpcode::NonZombie => "(i >= 0)",
    }
}

/// `static inline void <fname> (...)` wrapping a binary operator
fn binary_function(out: &mut String, fname: &str, op: &BinaryOp) -> Result<()> {
    let (x, y, z) = (c_type(op.xtype())?, c_type(op.ytype())?, c_type(op.ztype())?);
    let _ = writeln!(
        out,
        "static inline void {fname} ({z} *z, const {x} *px, const {y} *py)\n{{"
    );
    match op {
        BinaryOp::Builtin { opcode, ty } => {
            let _ = writeln!(out, "    const {x} x = *px ; const {y} y = *py ;");
            let _ = writeln!(out, "    (void) x ; (void) y ;");
            let expr = binary_expr(*opcode, ty)?;
            if class(op.ztype()) == Class::User {
                let _ = writeln!(out, "    *z = {expr} ;");
            } else {
                let _ = writeln!(out, "    *z = ({z}) {expr} ;");
            }
        }
        BinaryOp::User(u) => {
            let _ = writeln!(out, "    {} (z, px, py) ;", u.name());
        }
    }
    out.push_str("}\n\n");
    Ok(())
}

fn op_functions(out: &mut String, desc: &OperationDesc) -> Result<()> {
    match &desc.op {
        OpRef::Unary(op) => {
            let (x, z) = (c_type(op.xtype())?, c_type(op.ztype())?);
            let _ = writeln!(out, "static inline void sparx_op ({z} *z, const {x} *px)\n{{");
            match op {
                UnaryOp::Builtin { opcode, ty } => {
                    let _ = writeln!(out, "    const {x} x = *px ; (void) x ;");
                    let _ = writeln!(out, "    *z = ({z}) {} ;", unary_expr(*opcode, ty)?);
                }
                UnaryOp::User(u) => {
                    let _ = writeln!(out, "    {} (z, px) ;", u.name());
                }
            }
            out.push_str("}\n\n");
        }
        OpRef::IndexUnary(op) => {
            let (xt, _, _) = desc.op_types();
            let (x, y) = (c_type(&xt)?, c_type(op.ytype())?);
            let _ = writeln!(
                out,
                "static inline void sparx_op (bool *z, const {x} *px, int64_t i, int64_t j, const {y} *py)\n{{"
            );
            match op {
                IndexUnaryOp::Builtin { opcode, .. } => {
                    let _ = writeln!(out, "    const {x} x = *px ; const {y} y = *py ;");
                    let _ = writeln!(out, "    (void) x ; (void) y ; (void) i ; (void) j ;");
                    let _ = writeln!(out, "    *z = {} ;", index_unary_expr(*opcode));
                }
                IndexUnaryOp::User(u) => {
                    let _ = writeln!(out, "    {} (z, px, i, j, py) ;", u.name());
                }
            }
            out.push_str("}\n\n");
        }
        OpRef::Binary(op) => binary_function(out, "sparx_op", op)?,
        OpRef::Monoid(m) => binary_function(out, "sparx_op", m.op())?,
        OpRef::Semiring(s) => {
            binary_function(out, "sparx_add", s.add().op())?;
            binary_function(out, "sparx_mult", s.multiply())?;
        }
    }
    Ok(())
}

fn typedef(out: &mut String, alias: &str, t: &ElemType) -> Result<()> {
    let _ = writeln!(out, "typedef {} {alias} ;", c_type(t)?);
    Ok(())
}

/// `static inline void <fname> (to *d, const from *s)`
fn cast_function(out: &mut String, fname: &str, from: &ElemType, to: &ElemType) -> Result<()> {
    let (f, t) = (c_type(from)?, c_type(to)?);
    let _ = writeln!(
        out,
        "static inline void {fname} ({t} *d, const {f} *s) {{ *d = {} ; }}",
        cast_expr(from, to, "(*s)")?
    );
    Ok(())
}

fn select_body(out: &mut String, desc: &OperationDesc) -> Result<()> {
    let (xt, yt, _) = desc.op_types();
    let yt = yt.ok_or_else(|| codegen_err("select without a thunk type"))?;
    typedef(out, "sparx_a_t", &desc.a_type)?;
    typedef(out, "sparx_x_t", &xt)?;
    typedef(out, "sparx_y_t", &yt)?;
    cast_function(out, "sparx_a_to_x", &desc.a_type, &xt)?;
    out.push_str(
        r#"
int32_t sparx_kernel (const sparx_kernel_args *args)
{
    const int64_t n = args->n ;
    sparx_y_t thunk ;
    memcpy (&thunk, args->y, sizeof (thunk)) ;
    for (int64_t k = 0 ; k < n ; k++)
    {
        sparx_a_t a ;
        SPARX_LOAD (a, args->x, k, args->x_stride) ;
        sparx_x_t x ;
        sparx_a_to_x (&x, &a) ;
        const int64_t i = (args->i != NULL) ? args->i [k] : args->i0 + k ;
        bool keep ;
        sparx_op (&keep, &x, i, args->j, &thunk) ;
        args->keep [k] = (uint8_t) keep ;
    }
    return 0 ;
}
"#,
    );
    Ok(())
}

fn apply_body(out: &mut String, desc: &OperationDesc) -> Result<()> {
    let (xt, _, zt) = desc.op_types();
    typedef(out, "sparx_a_t", &desc.a_type)?;
    typedef(out, "sparx_x_t", &xt)?;
    typedef(out, "sparx_z_t", &zt)?;
    typedef(out, "sparx_c_t", &desc.c_type)?;
    cast_function(out, "sparx_a_to_x", &desc.a_type, &xt)?;
    cast_function(out, "sparx_z_to_c", &zt, &desc.c_type)?;
    out.push_str(
        r#"
int32_t sparx_kernel (const sparx_kernel_args *args)
{
    const int64_t n = args->n ;
    for (int64_t k = 0 ; k < n ; k++)
    {
        sparx_a_t a ;
        SPARX_LOAD (a, args->x, k, args->x_stride) ;
        sparx_x_t x ;
        sparx_a_to_x (&x, &a) ;
        sparx_z_t z ;
        sparx_op (&z, &x) ;
        sparx_c_t c ;
        sparx_z_to_c (&c, &z) ;
        memcpy (args->z + k * sizeof (c), &c, sizeof (c)) ;
    }
    return 0 ;
}
"#,
    );
    Ok(())
}

fn ewise_body(out: &mut String, desc: &OperationDesc) -> Result<()> {
    let (xt, yt, zt) = desc.op_types();
    let yt = yt.ok_or_else(|| codegen_err("ewise without a second operand type"))?;
    let bt = desc.b_type.as_ref().unwrap_or(&desc.a_type);
    typedef(out, "sparx_a_t", &desc.a_type)?;
    typedef(out, "sparx_b_t", bt)?;
    typedef(out, "sparx_x_t", &xt)?;
    typedef(out, "sparx_y_t", &yt)?;
    typedef(out, "sparx_z_t", &zt)?;
    typedef(out, "sparx_c_t", &desc.c_type)?;
    cast_function(out, "sparx_a_to_x", &desc.a_type, &xt)?;
    cast_function(out, "sparx_b_to_y", bt, &yt)?;
    cast_function(out, "sparx_z_to_c", &zt, &desc.c_type)?;
    out.push_str(
        r#"
int32_t sparx_kernel (const sparx_kernel_args *args)
{
    const int64_t n = args->n ;
    for (int64_t k = 0 ; k < n ; k++)
    {
        sparx_a_t a ;
        sparx_b_t b ;
        SPARX_LOAD (a, args->x, k, args->x_stride) ;
        SPARX_LOAD (b, args->y, k, args->y_stride) ;
        sparx_x_t x ;
        sparx_y_t y ;
        sparx_a_to_x (&x, &a) ;
        sparx_b_to_y (&y, &b) ;
        sparx_z_t z ;
        sparx_op (&z, &x, &y) ;
        sparx_c_t c ;
        sparx_z_to_c (&c, &z) ;
        memcpy (args->z + k * sizeof (c), &c, sizeof (c)) ;
    }
    return 0 ;
}
"#,
    );
    Ok(())
}

fn reduce_body(out: &mut String, desc: &OperationDesc) -> Result<()> {
    let OpRef::Monoid(m) = &desc.op else {
        return Err(codegen_err("reduce without a monoid"));
    };
    typedef(out, "sparx_a_t", &desc.a_type)?;
    typedef(out, "sparx_z_t", m.ty())?;
    cast_function(out, "sparx_a_to_z", &desc.a_type, m.ty())?;

    if matches!(m.terminal(), Terminal::Any) {
        out.push_str(
            r#"
int32_t sparx_kernel (const sparx_kernel_args *args)
{
    if (args->n <= 0) return 0 ;
    sparx_a_t a ;
    memcpy (&a, args->x, sizeof (a)) ;
    sparx_z_t z ;
    sparx_a_to_z (&z, &a) ;
    memcpy (args->z, &z, sizeof (z)) ;
    return 1 ;
}
"#,
        );
        return Ok(());
    }

    let terminal_check = match m.terminal_bytes() {
        Some(bytes) => {
            let list: Vec<String> = bytes.iter().map(|b| format!("0x{b:02x}")).collect();
            let _ = writeln!(
                out,
                "static const uint8_t sparx_terminal [{}] = {{ {} }} ;",
                bytes.len(),
                list.join(", ")
            );
            "        if (memcmp (&acc, sparx_terminal, sizeof (acc)) == 0)\n        {\n            memcpy (args->z, &acc, sizeof (acc)) ;\n            return 1 ;\n        }\n"
        }
        None => "",
    };
    let _ = write!(
        out,
        r#"
int32_t sparx_kernel (const sparx_kernel_args *args)
{{
    const int64_t n = args->n ;
    sparx_z_t acc ;
    memcpy (&acc, args->z, sizeof (acc)) ;
    for (int64_t k = 0 ; k < n ; k++)
    {{
        sparx_a_t a ;
        SPARX_LOAD (a, args->x, k, args->x_stride) ;
        sparx_z_t x, t ;
        sparx_a_to_z (&x, &a) ;
        sparx_op (&t, &acc, &x) ;
        acc = t ;
{terminal_check}    }}
    memcpy (args->z, &acc, sizeof (acc)) ;
    return 0 ;
}}
"#
    );
    Ok(())
}

fn mult_add_body(out: &mut String, desc: &OperationDesc) -> Result<()> {
    let OpRef::Semiring(s) = &desc.op else {
        return Err(codegen_err("saxpy without a semiring"));
    };
    let (xt, yt) = (s.multiply().xtype(), s.multiply().ytype());
    let (a_to, b_to) = if desc.flipxy { (yt, xt) } else { (xt, yt) };
    let bt = desc.b_type.as_ref().unwrap_or(&desc.a_type);
    typedef(out, "sparx_a_t", &desc.a_type)?;
    typedef(out, "sparx_b_t", bt)?;
    typedef(out, "sparx_ta_t", a_to)?;
    typedef(out, "sparx_tb_t", b_to)?;
    typedef(out, "sparx_z_t", s.ty())?;
    cast_function(out, "sparx_a_cast", &desc.a_type, a_to)?;
    cast_function(out, "sparx_b_cast", bt, b_to)?;
    let call = if desc.flipxy {
        "sparx_mult (&t, &bkj, &aik)"
    } else {
        "sparx_mult (&t, &aik, &bkj)"
    };
    let _ = write!(
        out,
        r#"
int32_t sparx_kernel (const sparx_kernel_args *args)
{{
    const int64_t n = args->n ;
    sparx_b_t b ;
    memcpy (&b, args->y, sizeof (b)) ;
    sparx_tb_t bkj ;
    sparx_b_cast (&bkj, &b) ;
    for (int64_t k = 0 ; k < n ; k++)
    {{
        sparx_a_t a ;
        SPARX_LOAD (a, args->x, k, args->x_stride) ;
        sparx_ta_t aik ;
        sparx_a_cast (&aik, &a) ;
        sparx_z_t t ;
        {call} ;
        const int64_t row = args->i [k] ;
        uint8_t *slot = args->z + row * sizeof (t) ;
        if (args->keep [row])
        {{
            sparx_z_t w, s ;
            memcpy (&w, slot, sizeof (w)) ;
            sparx_add (&s, &w, &t) ;
            memcpy (slot, &s, sizeof (s)) ;
        }}
        else
        {{
            memcpy (slot, &t, sizeof (t)) ;
            args->keep [row] = 1 ;
        }}
    }}
    return 0 ;
}}
"#
    );
    Ok(())
}

/// C source of the kernel for `sig`.
///
/// The module exports `sparx_kernel` plus two queries used to validate it
/// after loading: `sparx_query_version` and `sparx_query_fingerprint`.
pub fn generate(sig: &Signature, desc: &OperationDesc, fingerprint: u64) -> Result<String> {
    let mut out = String::with_capacity(8 * 1024);
    let _ = writeln!(
        out,
        "/* {}: {} {} */\n",
        sig.kernel_name(),
        desc.kind.name(),
        desc.op.name()
    );
    out.push_str(PRELUDE);
    out.push('\n');

    for (name, def) in desc.user_definitions() {
        let def = def.ok_or_else(|| codegen_err(format!("{name} has no C definition")))?;
        let _ = writeln!(out, "/* {name} */\n{def}\n");
    }

    op_functions(&mut out, desc)?;

    match desc.kind {
        KernelKind::Select => select_body(&mut out, desc)?,
        KernelKind::Apply => apply_body(&mut out, desc)?,
        KernelKind::Ewise => ewise_body(&mut out, desc)?,
        KernelKind::Reduce => reduce_body(&mut out, desc)?,
        KernelKind::MultAdd => mult_add_body(&mut out, desc)?,
        KernelKind::Mxm => {
            return Err(codegen_err(
                "whole-matrix kernels are built by the device executor",
            ));
        }
    }

    let _ = write!(
        out,
        "\nuint32_t sparx_query_version (void) {{ return {ABI_VERSION} ; }}\n\
         uint64_t sparx_query_fingerprint (void) {{ return 0x{fingerprint:016x}ULL ; }}\n"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::{Target, encode};
    use crate::ops::{Monoid, Semiring, UserUnaryOp};

    fn source(desc: &OperationDesc) -> String {
        let sig = encode(desc, Target::Host).key().unwrap();
        generate(&sig, desc, desc.fingerprint()).unwrap()
    }

    #[test]
    fn test_ewise_with_casts() {
        let desc = OperationDesc::ewise(
            &BinaryOp::builtin(BinaryOpcode::Div, DType::I32),
            &DType::F64.into(),
            &DType::I32.into(),
            &DType::I64.into(),
        );
        let src = source(&desc);
        assert!(src.contains("sparx_idiv_int32_t (x, y)"));
        assert!(src.contains("sparx_cast_to_int32_t ((double) (*s))"));
        assert!(src.contains("((int64_t) (*s))"));
        assert!(src.contains(&format!("return {ABI_VERSION} ;")));
        assert!(src.contains("return 0x0000000000000000ULL"));
    }

    #[test]
    fn test_reduce_terminal_and_any() {
        let f = DType::U8.into();
        let src = source(&OperationDesc::reduce(&Monoid::min(DType::U8), &DType::I32.into()));
        assert!(src.contains("sparx_terminal [1] = { 0x00 }"));
        assert!(src.contains("memcmp (&acc, sparx_terminal"));

        let src = source(&OperationDesc::reduce(&Monoid::any(DType::U8), &f));
        assert!(src.contains("return 1 ;"));
        assert!(!src.contains("sparx_terminal"));

        let src = source(&OperationDesc::reduce(&Monoid::plus(DType::F32), &f));
        assert!(!src.contains("sparx_terminal"));
    }

    #[test]
    fn test_mult_add_flipxy() {
        let s = Semiring::min_plus(DType::F64);
        let f = DType::F64.into();
        let src = source(&OperationDesc::mult_add(&s, &DType::I16.into(), &f, true));
        assert!(src.contains("sparx_mult (&t, &bkj, &aik)"));
        assert!(src.contains("fmin (x, y)"));
        assert!(src.contains("static inline void sparx_add"));
    }

    #[test]
    fn test_user_definitions_are_inlined() {
        let op = UnaryOp::user(
            UserUnaryOp::from_fn::<f32, f32>("half_of", |x| x / 2.0)
                .with_definition("void half_of (float *z, const float *x) { *z = *x / 2 ; }"),
        );
        let f = DType::F32.into();
        let desc = OperationDesc::apply(&op, &f, &f);
        let src = source(&desc);
        assert!(src.contains("void half_of (float *z, const float *x)"));
        assert!(src.contains("    half_of (z, px) ;"));
        assert!(src.contains(&format!("0x{:016x}ULL", desc.fingerprint())));
    }

    #[test]
    fn test_select_positional() {
        let tril = IndexUnaryOp::positional(IndexUnaryOpcode::Tril);
        let src = source(&OperationDesc::select(&tril, &DType::F64.into()));
        assert!(src.contains("((sparx_wide) j <= (sparx_wide) i + y)"));
        assert!(src.contains("args->keep [k] = (uint8_t) keep ;"));
    }
}
