//! Operation descriptors
//!
//! An `OperationDesc` names everything that determines the body of a kernel:
//! its kind, the operator, and the types of every operand. Format and mask
//! fields only matter for device kernels.

use super::KernelKind;
use crate::dtype::ElemType;
use crate::ops::{BinaryOp, IndexUnaryOp, Monoid, Semiring, UnaryOp};
use crate::sparse::Format;
use xxhash_rust::xxh3::Xxh3;

/// Operator carried by an operation.
#[derive(Clone, Debug)]
pub enum OpRef {
    /// Unary operator (apply)
    Unary(UnaryOp),
    /// Binary operator (element-wise)
    Binary(BinaryOp),
    /// Selection predicate
    IndexUnary(IndexUnaryOp),
    /// Reduction monoid
    Monoid(Monoid),
    /// Multiply-add semiring
    Semiring(Semiring),
}

impl OpRef {
    /// Short operator name
    pub fn name(&self) -> String {
        match self {
            OpRef::Unary(op) => op.name(),
            OpRef::Binary(op) => op.name(),
            OpRef::IndexUnary(op) => op.name(),
            OpRef::Monoid(m) => m.op().name(),
            OpRef::Semiring(s) => s.name(),
        }
    }
}

/// Mask presence and interpretation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaskShape {
    /// A mask is applied
    pub present: bool,
    /// Only the mask pattern matters, not its values
    pub structural: bool,
    /// The mask is complemented
    pub complement: bool,
    /// Type code of the mask values, 0 for a structural mask
    pub type_code: u8,
}

/// Storage formats of the operands of a device operation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OperandFormats {
    /// Output
    pub c: Option<Format>,
    /// First input
    pub a: Option<Format>,
    /// Second input
    pub b: Option<Format>,
    /// Mask
    pub m: Option<Format>,
}

/// Everything that determines the code of one kernel.
#[derive(Clone, Debug)]
pub struct OperationDesc {
    /// Kernel kind
    pub kind: KernelKind,
    /// Operator
    pub op: OpRef,
    /// Output (or accumulator) type
    pub c_type: ElemType,
    /// Type of the first input
    pub a_type: ElemType,
    /// Type of the second input
    pub b_type: Option<ElemType>,
    /// Operand formats, device kernels only
    pub formats: OperandFormats,
    /// Mask shape, device kernels only
    pub mask: MaskShape,
    /// The multiply operator receives its operands swapped
    pub flipxy: bool,
}

impl OperationDesc {
    fn new(kind: KernelKind, op: OpRef, c_type: ElemType, a_type: ElemType) -> Self {
        Self {
            kind,
            op,
            c_type,
            a_type,
            b_type: None,
            formats: OperandFormats::default(),
            mask: MaskShape::default(),
            flipxy: false,
        }
    }

    /// Per-entry keep flags of `op` over values of type `a_type`
    pub fn select(op: &IndexUnaryOp, a_type: &ElemType) -> Self {
        Self::new(
            KernelKind::Select,
            OpRef::IndexUnary(op.clone()),
            a_type.clone(),
            a_type.clone(),
        )
    }

    /// `c = op(a)` with casts on both sides
    pub fn apply(op: &UnaryOp, a_type: &ElemType, c_type: &ElemType) -> Self {
        Self::new(
            KernelKind::Apply,
            OpRef::Unary(op.clone()),
            c_type.clone(),
            a_type.clone(),
        )
    }

    /// `c = op(a, b)` with casts on all three operands
    pub fn ewise(op: &BinaryOp, a_type: &ElemType, b_type: &ElemType, c_type: &ElemType) -> Self {
        let mut d = Self::new(
            KernelKind::Ewise,
            OpRef::Binary(op.clone()),
            c_type.clone(),
            a_type.clone(),
        );
        d.b_type = Some(b_type.clone());
        d
    }

    /// Fold values of `a_type` into an accumulator of the monoid type
    pub fn reduce(monoid: &Monoid, a_type: &ElemType) -> Self {
        Self::new(
            KernelKind::Reduce,
            OpRef::Monoid(monoid.clone()),
            monoid.ty().clone(),
            a_type.clone(),
        )
    }

    /// Saxpy update `w(i) += a(i) * b` over one vector
    pub fn mult_add(semiring: &Semiring, a_type: &ElemType, b_type: &ElemType, flipxy: bool) -> Self {
        let mut d = Self::new(
            KernelKind::MultAdd,
            OpRef::Semiring(semiring.clone()),
            semiring.ty().clone(),
            a_type.clone(),
        );
        d.b_type = Some(b_type.clone());
        d.flipxy = flipxy;
        d
    }

    /// Whole-matrix multiply executed by a device
    pub fn mxm_device(
        semiring: &Semiring,
        a_type: &ElemType,
        b_type: &ElemType,
        formats: OperandFormats,
        mask: MaskShape,
        flipxy: bool,
    ) -> Self {
        let mut d = Self::mult_add(semiring, a_type, b_type, flipxy);
        d.kind = KernelKind::Mxm;
        d.formats = formats;
        d.mask = mask;
        d
    }

    /// Types the operator itself consumes and produces: `(x, y, z)`
    pub(crate) fn op_types(&self) -> (ElemType, Option<ElemType>, ElemType) {
        match &self.op {
            OpRef::Unary(op) => (op.xtype().clone(), None, op.ztype().clone()),
            OpRef::Binary(op) => (
                op.xtype().clone(),
                Some(op.ytype().clone()),
                op.ztype().clone(),
            ),
            // positional predicates never look at the value
            OpRef::IndexUnary(op) if op.is_positional() => (
                self.a_type.clone(),
                Some(op.ytype().clone()),
                ElemType::Builtin(crate::dtype::DType::Bool),
            ),
            OpRef::IndexUnary(op) => (
                op.xtype().clone(),
                Some(op.ytype().clone()),
                ElemType::Builtin(crate::dtype::DType::Bool),
            ),
            OpRef::Monoid(m) => (m.ty().clone(), Some(m.ty().clone()), m.ty().clone()),
            OpRef::Semiring(s) => (
                s.multiply().xtype().clone(),
                Some(s.multiply().ytype().clone()),
                s.ty().clone(),
            ),
        }
    }

    /// Returns true if every operator and type is built-in
    pub fn is_builtin(&self) -> bool {
        let op_builtin = match &self.op {
            OpRef::Unary(op) => op.is_builtin(),
            OpRef::Binary(op) => op.is_builtin(),
            OpRef::IndexUnary(op) => op.is_builtin(),
            OpRef::Monoid(m) => m.op().is_builtin(),
            OpRef::Semiring(s) => s.add().op().is_builtin() && s.multiply().is_builtin(),
        };
        op_builtin
            && self.c_type.is_builtin()
            && self.a_type.is_builtin()
            && self.b_type.as_ref().is_none_or(|t| t.is_builtin())
    }

    /// User-supplied definitions this kernel depends on, in a fixed order
    pub(crate) fn user_definitions(&self) -> Vec<(String, Option<String>)> {
        let mut defs = Vec::new();
        let mut push_type = |t: &ElemType| {
            if let Some(u) = t.user() {
                let entry = (u.name().to_string(), u.definition().map(str::to_string));
                if !defs.contains(&entry) {
                    defs.push(entry);
                }
            }
        };
        push_type(&self.c_type);
        push_type(&self.a_type);
        if let Some(b) = &self.b_type {
            push_type(b);
        }
        let (x, y, z) = self.op_types();
        push_type(&x);
        if let Some(y) = &y {
            push_type(y);
        }
        push_type(&z);
        match &self.op {
            OpRef::Unary(UnaryOp::User(u)) => {
                defs.push((u.name().to_string(), u.definition().map(str::to_string)))
            }
            OpRef::Binary(BinaryOp::User(u)) => {
                defs.push((u.name().to_string(), u.definition().map(str::to_string)))
            }
            OpRef::IndexUnary(IndexUnaryOp::User(u)) => {
                defs.push((u.name().to_string(), u.definition().map(str::to_string)))
            }
            OpRef::Monoid(m) => {
                if let BinaryOp::User(u) = m.op() {
                    defs.push((u.name().to_string(), u.definition().map(str::to_string)));
                }
            }
            OpRef::Semiring(s) => {
                for op in [s.add().op(), s.multiply()] {
                    if let BinaryOp::User(u) = op {
                        defs.push((u.name().to_string(), u.definition().map(str::to_string)));
                    }
                }
            }
            _ => {}
        }
        defs
    }

    /// Hash of every user definition the kernel was generated from; 0 when all built-in
    pub fn fingerprint(&self) -> u64 {
        let defs = self.user_definitions();
        if defs.is_empty() {
            return 0;
        }
        let mut h = Xxh3::new();
        for (name, def) in &defs {
            h.update(name.as_bytes());
            h.update(&[0]);
            h.update(def.as_deref().unwrap_or("").as_bytes());
            h.update(&[0]);
        }
        h.digest()
    }
}
