//! In-memory representation of type records: the kind discriminator, type
//! ids, encodings and the kind-specific payloads shared by the dynamic
//! store and the parsed read-only view.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::flag::limit;

/// Discriminator of a type record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u32)]
pub enum Kind {
    Unknown = 0,
    Integer = 1,
    Float = 2,
    Pointer = 3,
    Array = 4,
    Function = 5,
    Struct = 6,
    Union = 7,
    Enum = 8,
    Forward = 9,
    Typedef = 10,
    Volatile = 11,
    Const = 12,
    Restrict = 13,
}

/// Whether a named type is discoverable through the top-level name
/// indexes or only reachable through references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Root,
    NonRoot,
}

impl Visibility {
    pub fn is_root(self) -> bool {
        matches!(self, Visibility::Root)
    }
}

/// Id of a type within a container. Id 0 is a sentinel that is never
/// assigned; ids allocated by child containers carry
/// [`limit::CHILD_MASK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub const NONE: TypeId = TypeId(0);

    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    pub fn into_raw(self) -> u32 {
        self.0
    }

    pub(crate) fn new(index: u32, child: bool) -> Self {
        if child {
            Self(index | limit::CHILD_MASK)
        } else {
            Self(index)
        }
    }

    /// Position of the type within its own container, without the child
    /// bit.
    pub fn index(self) -> u32 {
        self.0 & !limit::CHILD_MASK
    }

    pub fn is_child(self) -> bool {
        self.0 & limit::CHILD_MASK != 0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Bit encoding of an integer or float type. `format` holds the
/// [`crate::flag::int_fmt`] flags or a [`crate::flag::fp_fmt`] value
/// depending on the kind of the owning type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Encoding {
    pub format: u8,
    pub offset: u8,
    pub bits: u16,
}

impl Encoding {
    pub fn new(format: u8, offset: u8, bits: u16) -> Self {
        Self {
            format,
            offset,
            bits,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    pub contents: TypeId,
    pub index: TypeId,
    pub nelems: u32,
}

/// Member of a struct or union. `offset` is in bits from the start of
/// the aggregate; unions keep every member at offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: Option<String>,
    pub ty: TypeId,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator {
    pub name: String,
    pub value: i32,
}

/// Function signature as surfaced by the lookup services; the trailing
/// variadic sentinel of the stored argument vector is folded into
/// `varargs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncInfo {
    pub ret: TypeId,
    pub args: Vec<TypeId>,
    pub varargs: bool,
}

/// Kind-specific payload of a type record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeData {
    Integer(Encoding),
    Float(Encoding),
    /// referent of a pointer, typedef or qualifier
    Ref(TypeId),
    Array(ArrayInfo),
    /// `args` ends with [`TypeId::NONE`] iff the function is variadic
    Function { ret: TypeId, args: Vec<TypeId> },
    /// struct or union members, in declaration order
    Sou(Vec<Member>),
    Enum(Vec<Enumerator>),
    /// kind the forward stands for: struct, union or enum
    Forward(Kind),
}

/// One type record, either pending in the dynamic store or parsed out of
/// a read-only buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub id: TypeId,
    pub name: Option<String>,
    pub kind: Kind,
    pub root: bool,
    /// byte size for integer/float/struct/union/enum records, unused
    /// otherwise
    pub size: u64,
    pub data: TypeData,
}

impl TypeDef {
    /// Payload length stored in the info word.
    pub fn vlen(&self) -> usize {
        match &self.data {
            TypeData::Sou(members) => members.len(),
            TypeData::Enum(enumerators) => enumerators.len(),
            TypeData::Function { args, .. } => args.len(),
            _ => 0,
        }
    }

    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// A named variable binding. `snapshots` records the snapshot counter at
/// the time of insertion and bounds rollbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDef {
    pub name: String,
    pub ty: TypeId,
    pub snapshots: u32,
}
