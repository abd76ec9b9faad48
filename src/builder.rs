//! Type and variable constructors.
//!
//! Every constructor validates its inputs first, allocates a fresh id
//! through [`CtfDict::add_generic`] and marks the container dirty, so a
//! failed call leaves the dictionary untouched.

use crate::dict::CtfDict;
use crate::error::{CtfError, Result};
use crate::flag::{info, limit};
use crate::types::{
    ArrayInfo, Encoding, Enumerator, Kind, Member, TypeData, TypeDef,
    TypeId, VarDef, Visibility,
};
use crate::wire;

impl CtfDict {
    /// Common prologue of every constructor: check writability and id
    /// headroom, copy the name, allocate the next id, install the record
    /// and set DIRTY.
    pub(crate) fn add_generic(
        &mut self,
        visibility: Visibility,
        name: &str,
        kind: Kind,
        size: u64,
        data: TypeData,
    ) -> Result<TypeId> {
        self.ensure_writable()?;
        if self.next_id > limit::MAX_TYPE
            || (self.child && self.next_id > limit::MAX_PTYPE)
        {
            return Err(CtfError::Full);
        }
        let id = self.make_id(self.next_id);
        let name = (!name.is_empty()).then(|| name.to_owned());
        if let Some(name) = &name {
            self.str_growth += name.len() + 1;
        }
        self.types.insert(
            id,
            TypeDef {
                id,
                name,
                kind,
                root: visibility.is_root(),
                size,
                data,
            },
        );
        self.next_id += 1;
        self.dirty = true;
        Ok(id)
    }

    pub fn add_integer(
        &mut self,
        visibility: Visibility,
        name: &str,
        encoding: Encoding,
    ) -> Result<TypeId> {
        let size = wire::size_from_bits(encoding.bits);
        self.add_generic(
            visibility,
            name,
            Kind::Integer,
            size,
            TypeData::Integer(encoding),
        )
    }

    pub fn add_float(
        &mut self,
        visibility: Visibility,
        name: &str,
        encoding: Encoding,
    ) -> Result<TypeId> {
        let size = wire::size_from_bits(encoding.bits);
        self.add_generic(
            visibility,
            name,
            Kind::Float,
            size,
            TypeData::Float(encoding),
        )
    }

    fn add_reftype(
        &mut self,
        visibility: Visibility,
        name: &str,
        kind: Kind,
        referent: TypeId,
    ) -> Result<TypeId> {
        if referent.into_raw() > limit::MAX_TYPE {
            return Err(CtfError::BadId(referent));
        }
        self.add_generic(visibility, name, kind, 0, TypeData::Ref(referent))
    }

    pub fn add_pointer(
        &mut self,
        visibility: Visibility,
        referent: TypeId,
    ) -> Result<TypeId> {
        self.add_reftype(visibility, "", Kind::Pointer, referent)
    }

    pub fn add_volatile(
        &mut self,
        visibility: Visibility,
        referent: TypeId,
    ) -> Result<TypeId> {
        self.add_reftype(visibility, "", Kind::Volatile, referent)
    }

    pub fn add_const(
        &mut self,
        visibility: Visibility,
        referent: TypeId,
    ) -> Result<TypeId> {
        self.add_reftype(visibility, "", Kind::Const, referent)
    }

    pub fn add_restrict(
        &mut self,
        visibility: Visibility,
        referent: TypeId,
    ) -> Result<TypeId> {
        self.add_reftype(visibility, "", Kind::Restrict, referent)
    }

    pub fn add_typedef(
        &mut self,
        visibility: Visibility,
        name: &str,
        referent: TypeId,
    ) -> Result<TypeId> {
        self.add_reftype(visibility, name, Kind::Typedef, referent)
    }

    pub fn add_array(
        &mut self,
        visibility: Visibility,
        info: ArrayInfo,
    ) -> Result<TypeId> {
        if info.contents.into_raw() > limit::MAX_TYPE {
            return Err(CtfError::BadId(info.contents));
        }
        if info.index.into_raw() > limit::MAX_TYPE {
            return Err(CtfError::BadId(info.index));
        }
        self.add_generic(visibility, "", Kind::Array, 0, TypeData::Array(info))
    }

    /// A variadic function gets one extra argument slot holding the 0
    /// sentinel, so `args` may hold at most `MAX_VLEN - 1` entries.
    pub fn add_function(
        &mut self,
        visibility: Visibility,
        ret: TypeId,
        args: &[TypeId],
        varargs: bool,
    ) -> Result<TypeId> {
        if args.len() > info::MAX_VLEN as usize - 1 {
            return Err(CtfError::DtFull);
        }
        if ret.into_raw() > limit::MAX_TYPE {
            return Err(CtfError::BadId(ret));
        }
        for arg in args {
            if arg.into_raw() > limit::MAX_TYPE {
                return Err(CtfError::BadId(*arg));
            }
        }
        let mut argv = args.to_vec();
        if varargs {
            argv.push(TypeId::NONE);
        }
        self.add_generic(
            visibility,
            "",
            Kind::Function,
            0,
            TypeData::Function { ret, args: argv },
        )
    }

    pub fn add_struct(
        &mut self,
        visibility: Visibility,
        name: &str,
    ) -> Result<TypeId> {
        self.add_struct_sized(visibility, name, 0)
    }

    pub fn add_struct_sized(
        &mut self,
        visibility: Visibility,
        name: &str,
        size: u64,
    ) -> Result<TypeId> {
        self.add_sou(visibility, name, Kind::Struct, size)
    }

    pub fn add_union(
        &mut self,
        visibility: Visibility,
        name: &str,
    ) -> Result<TypeId> {
        self.add_union_sized(visibility, name, 0)
    }

    pub fn add_union_sized(
        &mut self,
        visibility: Visibility,
        name: &str,
        size: u64,
    ) -> Result<TypeId> {
        self.add_sou(visibility, name, Kind::Union, size)
    }

    fn add_sou(
        &mut self,
        visibility: Visibility,
        name: &str,
        kind: Kind,
        size: u64,
    ) -> Result<TypeId> {
        self.ensure_writable()?;
        if let Some(id) = self.upgradable_forward(kind, name) {
            let type_def = self.types.get_mut(&id).expect("dynamic forward");
            type_def.kind = kind;
            type_def.root = visibility.is_root();
            type_def.size = size;
            type_def.data = TypeData::Sou(Vec::new());
            self.dirty = true;
            return Ok(id);
        }
        self.add_generic(visibility, name, kind, size, TypeData::Sou(Vec::new()))
    }

    pub fn add_enum(
        &mut self,
        visibility: Visibility,
        name: &str,
    ) -> Result<TypeId> {
        self.ensure_writable()?;
        let size = self.model.int_size();
        if let Some(id) = self.upgradable_forward(Kind::Enum, name) {
            let type_def = self.types.get_mut(&id).expect("dynamic forward");
            type_def.kind = Kind::Enum;
            type_def.root = visibility.is_root();
            type_def.size = size;
            type_def.data = TypeData::Enum(Vec::new());
            self.dirty = true;
            return Ok(id);
        }
        self.add_generic(
            visibility,
            name,
            Kind::Enum,
            size,
            TypeData::Enum(Vec::new()),
        )
    }

    /// A forward tag of `name` that is still pending and may be upgraded
    /// in place by a struct/union/enum definition.
    fn upgradable_forward(&self, kind: Kind, name: &str) -> Option<TypeId> {
        if name.is_empty() {
            return None;
        }
        let id = *self.name_index(kind).get(name)?;
        let type_def = self.types.get(&id)?;
        (type_def.kind == Kind::Forward).then_some(id)
    }

    /// Create a placeholder for a struct, union or enum whose body is not
    /// yet known. Idempotent: if the name is already registered in the
    /// matching index the existing id is returned.
    pub fn add_forward(
        &mut self,
        visibility: Visibility,
        name: &str,
        kind: Kind,
    ) -> Result<TypeId> {
        self.ensure_writable()?;
        if !matches!(kind, Kind::Struct | Kind::Union | Kind::Enum) {
            return Err(CtfError::NotSue);
        }
        if !name.is_empty() {
            if let Some(id) = self.name_index(kind).get(name) {
                return Ok(*id);
            }
        }
        let id = self.add_generic(
            visibility,
            name,
            Kind::Forward,
            0,
            TypeData::Forward(kind),
        )?;
        if !name.is_empty() && visibility.is_root() {
            self.name_index_mut(kind).insert(name.to_owned(), id);
        }
        Ok(id)
    }

    pub fn add_enumerator(
        &mut self,
        enum_id: TypeId,
        name: &str,
        value: i32,
    ) -> Result<()> {
        self.ensure_writable()?;
        let type_def =
            self.types.get_mut(&enum_id).ok_or(CtfError::BadId(enum_id))?;
        if type_def.kind != Kind::Enum {
            return Err(CtfError::NotEnum(enum_id));
        }
        let TypeData::Enum(enumerators) = &mut type_def.data else {
            return Err(CtfError::NotEnum(enum_id));
        };
        if enumerators.len() >= info::MAX_VLEN as usize {
            return Err(CtfError::DtFull);
        }
        // string offset 0 is reserved for the empty name
        if name.is_empty()
            || enumerators.iter().any(|enumerator| enumerator.name == name)
        {
            return Err(CtfError::Duplicate(name.to_owned()));
        }
        enumerators.push(Enumerator {
            name: name.to_owned(),
            value,
        });
        self.str_growth += name.len() + 1;
        self.dirty = true;
        Ok(())
    }

    /// Append a member at its natural offset: the previous member's end,
    /// rounded up to the new member's alignment.
    pub fn add_member(
        &mut self,
        sou_id: TypeId,
        name: Option<&str>,
        member_type: TypeId,
    ) -> Result<()> {
        self.add_member_offset(sou_id, name, member_type, None)
    }

    /// Append a member, either at an explicit bit offset or, when
    /// `bit_offset` is `None`, at its natural offset.
    pub fn add_member_offset(
        &mut self,
        sou_id: TypeId,
        name: Option<&str>,
        member_type: TypeId,
        bit_offset: Option<u64>,
    ) -> Result<()> {
        self.ensure_writable()?;
        let member_size = self.type_size(member_type)?;
        let member_align = self.type_align(member_type)?;

        let type_def =
            self.types.get(&sou_id).ok_or(CtfError::BadId(sou_id))?;
        let kind = type_def.kind;
        if !matches!(kind, Kind::Struct | Kind::Union) {
            return Err(CtfError::NotSou(sou_id));
        }
        let TypeData::Sou(members) = &type_def.data else {
            return Err(CtfError::NotSou(sou_id));
        };
        if members.len() >= info::MAX_VLEN as usize {
            return Err(CtfError::DtFull);
        }
        if let Some(name) = name {
            if !name.is_empty()
                && members
                    .iter()
                    .any(|member| member.name.as_deref() == Some(name))
            {
                return Err(CtfError::Duplicate(name.to_owned()));
            }
        }

        let (offset, new_size) = match (kind, bit_offset) {
            (Kind::Union, _) => (0, type_def.size.max(member_size)),
            (_, Some(offset)) => {
                (offset, type_def.size.max(offset / 8 + member_size))
            }
            (_, None) => {
                // end of the previous member in bits: encodings win over
                // byte sizes so bit-fields pack tightly
                let end_bits = match members.last() {
                    None => 0,
                    Some(prev) => {
                        let bits = match self.type_encoding(prev.ty)? {
                            Some(encoding) => u64::from(encoding.bits),
                            None => self.type_size(prev.ty)? * 8,
                        };
                        prev.offset + bits
                    }
                };
                let offset_bytes = end_bits.div_ceil(8);
                let align = member_align.max(1);
                let offset_bytes = offset_bytes.div_ceil(align) * align;
                (offset_bytes * 8, offset_bytes + member_size)
            }
        };

        let name = name.filter(|name| !name.is_empty());
        let type_def =
            self.types.get_mut(&sou_id).ok_or(CtfError::BadId(sou_id))?;
        let TypeData::Sou(members) = &mut type_def.data else {
            return Err(CtfError::NotSou(sou_id));
        };
        members.push(Member {
            name: name.map(str::to_owned),
            ty: member_type,
            offset,
        });
        type_def.size = new_size;
        if let Some(name) = name {
            self.str_growth += name.len() + 1;
        }
        self.dirty = true;
        Ok(())
    }

    /// Bind `name` to a type. The binding is serialized into the sorted
    /// variable section on the next update.
    pub fn add_variable(&mut self, name: &str, ty: TypeId) -> Result<()> {
        self.ensure_writable()?;
        // string offset 0 is reserved for the empty name
        if name.is_empty() || self.var_names.contains_key(name) {
            return Err(CtfError::Duplicate(name.to_owned()));
        }
        self.lookup_type(ty)?;
        self.vars.push(VarDef {
            name: name.to_owned(),
            ty,
            snapshots: self.snapshots,
        });
        self.var_names.insert(name.to_owned(), ty);
        self.str_growth += name.len() + 1;
        self.dirty = true;
        Ok(())
    }
}
