//! Typed scalar values

use super::{ElemType, Element, Wide, cast_fn};
use crate::error::{Error, Result};

/// A single value of any element type, held as raw bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct Scalar {
    ty: ElemType,
    bytes: Vec<u8>,
}

impl Scalar {
    /// Scalar from a built-in value
    pub fn new<T: Element>(value: T) -> Self {
        Self {
            ty: ElemType::Builtin(T::DTYPE),
            bytes: bytemuck::bytes_of(&value).to_vec(),
        }
    }

    /// Scalar from raw bytes; `bytes` must hold exactly one element of `ty`
    pub fn from_bytes(ty: ElemType, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != ty.size() {
            return Err(Error::invalid_argument(
                "bytes",
                format!("{} bytes given for type {} of size {}", bytes.len(), ty, ty.size()),
            ));
        }
        Ok(Self { ty, bytes })
    }

    /// Element type
    pub fn ty(&self) -> &ElemType {
        &self.ty
    }

    /// Raw value bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Typed value, if `T` is exactly this scalar's type
    pub fn get<T: Element>(&self) -> Option<T> {
        match self.ty {
            ElemType::Builtin(d) if d == T::DTYPE => Some(super::read(&self.bytes)),
            _ => None,
        }
    }

    /// Value widened to the cast intermediate, for built-in types
    pub fn to_wide(&self) -> Option<Wide> {
        let d = self.ty.dtype()?;
        Some(crate::dispatch_dtype!(d, T => { super::read::<T>(&self.bytes).to_wide() }))
    }

    /// Value as `i64` with cast semantics, for built-in types
    pub fn to_i64(&self) -> Option<i64> {
        self.to_wide().map(i64::from_wide)
    }

    /// Cast to another element type
    pub fn cast(&self, to: &ElemType) -> Result<Scalar> {
        match cast_fn(&self.ty, to) {
            Some(None) => Ok(Scalar {
                ty: to.clone(),
                bytes: self.bytes.clone(),
            }),
            Some(Some(f)) => {
                let mut bytes = vec![0u8; to.size()];
                f(&mut bytes, &self.bytes);
                Ok(Scalar {
                    ty: to.clone(),
                    bytes,
                })
            }
            None => Err(Error::domain_mismatch(to, &self.ty, "cast")),
        }
    }

    /// Returns true unless the value is zero (false for user types)
    pub fn is_nonzero(&self) -> bool {
        match self.to_wide() {
            Some(Wide::Int(v)) => v != 0,
            Some(Wide::Float(v)) => v != 0.0,
            None => false,
        }
    }
}

impl<T: Element> From<T> for Scalar {
    fn from(value: T) -> Self {
        Scalar::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[test]
    fn test_get_requires_exact_type() {
        let s = Scalar::new(5i16);
        assert_eq!(s.get::<i16>(), Some(5));
        assert_eq!(s.get::<i32>(), None);
        assert_eq!(s.to_i64(), Some(5));
    }

    #[test]
    fn test_cast() {
        let s = Scalar::new(2.75f64);
        let c = s.cast(&ElemType::from(DType::U8)).unwrap();
        assert_eq!(c.get::<u8>(), Some(2));
        assert!(Scalar::new(0u32).cast(&ElemType::from(DType::F32)).unwrap().get::<f32>() == Some(0.0));
    }

    #[test]
    fn test_from_bytes_checks_length() {
        assert!(Scalar::from_bytes(ElemType::from(DType::I32), vec![0; 3]).is_err());
        assert!(Scalar::from_bytes(ElemType::from(DType::I32), vec![0; 4]).is_ok());
    }
}
