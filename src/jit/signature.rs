//! Signature encoder
//!
//! Packs an operation into a 64-bit code plus an optional suffix. The code
//! holds everything drawn from a closed enumeration; the suffix names the
//! user-defined types and operators (and non-standard monoid values), which
//! cannot be enumerated. Encoding is pure and stable across processes so that
//! compiled artifacts on disk can be found again.
//!
//! ```text
//! bit  0..8   operator (add monoid for semirings)   8..16  multiply operator
//!     16..20  c type   20..24 a type   24..28 b type   28..32 x type
//!     32..36  y type   36..40 mask type   40..43 mask flags
//!     43..51  c/a/b/m formats (2 bits each, device only)
//!     51      flipxy   52..56 kernel kind
//! ```

use crate::dtype::{DType, ElemType};
use crate::kernels::{KernelKind, OpRef, OperationDesc};
use crate::ops::{BinaryOp, IndexUnaryOp, Monoid, USER_OPCODE, UnaryOp};
use crate::sparse::Format;
use std::fmt::Write as _;
use xxhash_rust::xxh3::xxh3_64;

/// Where the kernel will run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// Host kernels see one vector at a time; formats and masks are irrelevant
    Host,
    /// Device kernels take whole matrices; formats and mask shape are part of the code
    Device,
}

/// Canonical key of one kernel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    kind: KernelKind,
    code: u64,
    suffix: Option<String>,
}

/// Result of encoding an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoded {
    /// The operation can be specialized under this key
    Key(Signature),
    /// The operation cannot be specialized
    Unsupported(String),
}

impl Encoded {
    /// The key, if any
    pub fn key(self) -> Option<Signature> {
        match self {
            Encoded::Key(s) => Some(s),
            Encoded::Unsupported(_) => None,
        }
    }
}

impl Signature {
    /// Kernel kind
    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    /// Packed code
    pub fn code(&self) -> u64 {
        self.code
    }

    /// Names of user-defined items, if any
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// 64-bit hash of the whole signature
    pub fn hash64(&self) -> u64 {
        let mut bytes = Vec::with_capacity(16 + self.suffix.as_ref().map_or(0, String::len));
        bytes.push(self.kind as u8);
        bytes.extend_from_slice(&self.code.to_le_bytes());
        if let Some(s) = &self.suffix {
            bytes.extend_from_slice(s.as_bytes());
        }
        xxh3_64(&bytes)
    }

    /// Symbol-safe kernel name, also used as the artifact directory name
    pub fn kernel_name(&self) -> String {
        let mut name = format!("sparx_{}_{:016x}", self.kind.name(), self.code);
        if let Some(suffix) = &self.suffix {
            let clean: String = suffix
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .take(32)
                .collect();
            let _ = write!(name, "_{}_{:08x}", clean, self.hash64() as u32);
        }
        name
    }
}

fn type_code(t: &ElemType) -> u64 {
    t.code() as u64 & 0xF
}

/// Zero means "no operand"; dense formats never reach a device key
fn format_code(f: Option<Format>) -> u64 {
    match f {
        None => 0,
        Some(Format::Hypersparse) => 1,
        Some(Format::Sparse) => 2,
        Some(Format::Bitmap | Format::Full) => 3,
    }
}

/// Types that cannot appear in generated C
fn has_c_name(t: &ElemType) -> bool {
    match t.dtype() {
        Some(d) => d.c_name().is_some(),
        None => true,
    }
}

struct SuffixBuilder {
    parts: Vec<String>,
    missing: Option<String>,
}

impl SuffixBuilder {
    fn ty(&mut self, t: &ElemType) {
        if let Some(u) = t.user() {
            if u.definition().is_none() {
                self.missing
                    .get_or_insert_with(|| format!("type {} has no C definition", u.name()));
            }
            let part = u.name().to_string();
            if !self.parts.contains(&part) {
                self.parts.push(part);
            }
        }
    }

    fn op(&mut self, name: &str, definition: Option<&str>) {
        if definition.is_none() {
            self.missing
                .get_or_insert_with(|| format!("operator {name} has no C definition"));
        }
        self.parts.push(name.to_string());
    }

    fn monoid_values(&mut self, m: &Monoid) {
        if m.is_builtin() {
            return;
        }
        let mut part = String::from("id");
        for b in m.identity().bytes() {
            let _ = write!(part, "{b:02x}");
        }
        if let Some(t) = m.terminal_bytes() {
            part.push_str("_term");
            for b in t {
                let _ = write!(part, "{b:02x}");
            }
        }
        self.parts.push(part);
    }
}

fn binary_opcode(op: &BinaryOp, suffix: &mut SuffixBuilder) -> u64 {
    match op {
        BinaryOp::Builtin { opcode, .. } => *opcode as u64,
        BinaryOp::User(u) => {
            suffix.op(u.name(), u.definition());
            USER_OPCODE as u64
        }
    }
}

/// Encode `desc` for `target`
pub fn encode(desc: &OperationDesc, target: Target) -> Encoded {
    let mut suffix = SuffixBuilder {
        parts: Vec::new(),
        missing: None,
    };
    let (xt, yt, _) = desc.op_types();
    let types = [
        Some(&desc.c_type),
        Some(&desc.a_type),
        desc.b_type.as_ref(),
        Some(&xt),
        yt.as_ref(),
    ];
    for t in types.iter().flatten() {
        if !has_c_name(t) {
            return Encoded::Unsupported(format!("type {t} has no C representation"));
        }
        suffix.ty(t);
    }

    let (op1, op2) = match &desc.op {
        OpRef::Unary(UnaryOp::Builtin { opcode, .. }) => (*opcode as u64, 0),
        OpRef::Unary(UnaryOp::User(u)) => {
            suffix.op(u.name(), u.definition());
            (USER_OPCODE as u64, 0)
        }
        OpRef::Binary(op) => (binary_opcode(op, &mut suffix), 0),
        OpRef::IndexUnary(IndexUnaryOp::Builtin { opcode, .. }) => (*opcode as u64, 0),
        OpRef::IndexUnary(IndexUnaryOp::User(u)) => {
            suffix.op(u.name(), u.definition());
            (USER_OPCODE as u64, 0)
        }
        OpRef::Monoid(m) => {
            let code = binary_opcode(m.op(), &mut suffix);
            suffix.monoid_values(m);
            (code, 0)
        }
        OpRef::Semiring(s) => {
            let add = binary_opcode(s.add().op(), &mut suffix);
            suffix.monoid_values(s.add());
            (add, binary_opcode(s.multiply(), &mut suffix))
        }
    };

    if let Some(reason) = suffix.missing {
        return Encoded::Unsupported(reason);
    }

    let mut code = op1 & 0xFF;
    code |= (op2 & 0xFF) << 8;
    code |= type_code(&desc.c_type) << 16;
    code |= type_code(&desc.a_type) << 20;
    code |= desc.b_type.as_ref().map_or(0, type_code) << 24;
    code |= type_code(&xt) << 28;
    code |= yt.as_ref().map_or(0, type_code) << 32;
    code |= (desc.flipxy as u64) << 51;
    code |= (desc.kind as u64 & 0xF) << 52;

    if target == Target::Device {
        if desc.kind != KernelKind::Mxm {
            return Encoded::Unsupported(format!("no device {} kernels", desc.kind.name()));
        }
        if !suffix.parts.is_empty() {
            return Encoded::Unsupported("device kernels accept built-in types and operators only".into());
        }
        let f = &desc.formats;
        for fmt in [f.c, f.a, f.b, f.m].into_iter().flatten() {
            if fmt.is_dense() {
                return Encoded::Unsupported(format!("device kernels do not accept {fmt} operands"));
            }
        }
        let m = &desc.mask;
        code |= (m.type_code as u64 & 0xF) << 36;
        code |= ((m.present as u64) | (m.structural as u64) << 1 | (m.complement as u64) << 2) << 40;
        code |= (format_code(f.c)
            | format_code(f.a) << 2
            | format_code(f.b) << 4
            | format_code(f.m) << 6)
            << 43;
    }

    let suffix = (!suffix.parts.is_empty()).then(|| suffix.parts.join("__"));
    Encoded::Key(Signature {
        kind: desc.kind,
        code,
        suffix,
    })
}

/// Mask type code for a mask of type `t`; structural masks carry no type
pub(crate) fn mask_type_code(t: Option<&ElemType>) -> u8 {
    t.and_then(|t| t.dtype()).map_or(0, DType::code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::UserType;
    use crate::kernels::{MaskShape, OperandFormats};
    use crate::ops::{BinaryOpcode, Semiring, UserBinaryOp};
    use std::sync::Arc;

    fn plus_desc(a: DType, b: DType) -> OperationDesc {
        OperationDesc::ewise(&BinaryOp::plus(DType::F64), &a.into(), &b.into(), &DType::F64.into())
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let d = plus_desc(DType::I32, DType::F64);
        let a = encode(&d, Target::Host);
        let b = encode(&d.clone(), Target::Host);
        assert_eq!(a, b);
        let key = a.key().unwrap();
        assert_eq!(key.suffix(), None);
        assert_eq!(key.code() & 0xFF, BinaryOpcode::Plus as u64);
        assert_eq!(key.kernel_name(), format!("sparx_ewise_{:016x}", key.code()));
    }

    #[test]
    fn test_types_change_the_code() {
        let a = encode(&plus_desc(DType::I32, DType::F64), Target::Host).key().unwrap();
        let b = encode(&plus_desc(DType::I64, DType::F64), Target::Host).key().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_user_items_need_definitions() {
        let op = BinaryOp::user(UserBinaryOp::from_fn::<f64, f64, f64>("my_hypot", f64::hypot));
        let f = DType::F64.into();
        let d = OperationDesc::ewise(&op, &f, &f, &f);
        assert!(matches!(encode(&d, Target::Host), Encoded::Unsupported(_)));

        let op = BinaryOp::user(
            UserBinaryOp::from_fn::<f64, f64, f64>("my_hypot", f64::hypot)
                .with_definition("void my_hypot (double *z, const double *x, const double *y) { *z = hypot (*x, *y) ; }"),
        );
        let key = encode(&OperationDesc::ewise(&op, &f, &f, &f), Target::Host).key().unwrap();
        assert_eq!(key.suffix(), Some("my_hypot"));
        assert_eq!(key.code() & 0xFF, USER_OPCODE as u64);
        assert!(key.kernel_name().starts_with("sparx_ewise_"));
        assert!(key.kernel_name().contains("_my_hypot_"));
    }

    #[test]
    fn test_device_target_rules() {
        let s = Semiring::plus_times(DType::F32);
        let f = DType::F32.into();
        let sparse = OperandFormats {
            c: Some(Format::Sparse),
            a: Some(Format::Sparse),
            b: Some(Format::Hypersparse),
            m: None,
        };
        let d = OperationDesc::mxm_device(&s, &f, &f, sparse, MaskShape::default(), false);
        let host = encode(&d, Target::Host).key().unwrap();
        let dev = encode(&d, Target::Device).key().unwrap();
        assert_ne!(host.code(), dev.code());

        let bitmap = OperandFormats {
            a: Some(Format::Bitmap),
            ..sparse
        };
        let d = OperationDesc::mxm_device(&s, &f, &f, bitmap, MaskShape::default(), false);
        assert!(matches!(encode(&d, Target::Device), Encoded::Unsupported(_)));

        let ty: ElemType = Arc::new(UserType::new("cplx", 16).with_definition("typedef struct { double re, im; } cplx;")).into();
        let add = Monoid::new(BinaryOp::second(ty.clone()), &crate::dtype::Scalar::from_bytes(ty.clone(), vec![0; 16]).unwrap(), None).unwrap();
        let s = Semiring::new(add, BinaryOp::first(ty.clone())).unwrap();
        let d = OperationDesc::mxm_device(&s, &ty, &ty, sparse, MaskShape::default(), false);
        assert!(matches!(encode(&d, Target::Device), Encoded::Unsupported(_)));
    }
}
