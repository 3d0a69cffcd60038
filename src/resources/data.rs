//! Canonical CPU-side payloads.
//!
//! [`BufferData`] is a contiguous typed numeric array. Plain numeric
//! sequences (`Vec<f32>`, `&[f32]`, `[f32; N]`) normalise to the canonical
//! `F32` representation; typed payloads pass through unchanged.

/// Typed numeric payload owned by a [`DataBuffer`](super::DataBuffer).
#[derive(Debug, Clone, PartialEq)]
pub enum BufferData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    U32(Vec<u32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
    I32(Vec<i32>),
    I16(Vec<i16>),
    I8(Vec<i8>),
}

/// Element type of a [`BufferData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F32,
    F64,
    U32,
    U16,
    U8,
    I32,
    I16,
    I8,
}

impl ElementType {
    /// Size of one element in bytes.
    #[must_use]
    pub fn size_bytes(self) -> usize {
        match self {
            ElementType::F64 => 8,
            ElementType::F32 | ElementType::U32 | ElementType::I32 => 4,
            ElementType::U16 | ElementType::I16 => 2,
            ElementType::U8 | ElementType::I8 => 1,
        }
    }
}

// Dispatch a body over every variant with the inner Vec bound to `$v`.
macro_rules! each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            BufferData::F32($v) => $body,
            BufferData::F64($v) => $body,
            BufferData::U32($v) => $body,
            BufferData::U16($v) => $body,
            BufferData::U8($v) => $body,
            BufferData::I32($v) => $body,
            BufferData::I16($v) => $body,
            BufferData::I8($v) => $body,
        }
    };
}

impl BufferData {
    /// Single zeroed float, used when a buffer is built without a payload.
    #[must_use]
    pub fn placeholder() -> Self {
        BufferData::F32(vec![0.0])
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn element_type(&self) -> ElementType {
        match self {
            BufferData::F32(_) => ElementType::F32,
            BufferData::F64(_) => ElementType::F64,
            BufferData::U32(_) => ElementType::U32,
            BufferData::U16(_) => ElementType::U16,
            BufferData::U8(_) => ElementType::U8,
            BufferData::I32(_) => ElementType::I32,
            BufferData::I16(_) => ElementType::I16,
            BufferData::I8(_) => ElementType::I8,
        }
    }

    /// Size of the payload in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.len() * self.element_type().size_bytes()
    }

    /// Raw byte view, ready for a device upload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        each_variant!(self, v => bytemuck::cast_slice(v.as_slice()))
    }

    #[must_use]
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            BufferData::F32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u32(&self) -> Option<&[u32]> {
        match self {
            BufferData::U32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u16(&self) -> Option<&[u16]> {
        match self {
            BufferData::U16(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl Default for BufferData {
    fn default() -> Self {
        Self::placeholder()
    }
}

macro_rules! impl_from_numeric {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for BufferData {
                fn from(v: Vec<$ty>) -> Self {
                    BufferData::$variant(v)
                }
            }

            impl From<&[$ty]> for BufferData {
                fn from(v: &[$ty]) -> Self {
                    BufferData::$variant(v.to_vec())
                }
            }

            impl<const N: usize> From<[$ty; N]> for BufferData {
                fn from(v: [$ty; N]) -> Self {
                    BufferData::$variant(v.to_vec())
                }
            }
        )*
    };
}

impl_from_numeric! {
    f32 => F32,
    f64 => F64,
    u32 => U32,
    u16 => U16,
    u8 => U8,
    i32 => I32,
    i16 => I16,
    i8 => I8,
}
