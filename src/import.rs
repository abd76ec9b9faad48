//! Recursive import of a type (and its transitive referents) from one
//! container into another.
//!
//! Named types deduplicate against the destination: first against the
//! root-visible name indexes, then against the still-uncommitted pending
//! list. Structs and unions are installed before their member types are
//! translated, which is what lets cyclic type graphs terminate.

use crate::dict::CtfDict;
use crate::error::{CtfError, Result};
use crate::types::{
    ArrayInfo, Encoding, Kind, Member, TypeData, TypeId, Visibility,
};

impl CtfDict {
    /// Import `src_type` from `src`, returning its id in `self`.
    ///
    /// On a member-translation failure inside a struct or union the
    /// partially translated record is left in place and the error
    /// reported at the end; callers are expected to roll back to a
    /// snapshot taken before the call.
    pub fn add_type(
        &mut self,
        src: &CtfDict,
        src_type: TypeId,
    ) -> Result<TypeId> {
        self.ensure_writable()?;
        let src_def = src.lookup_type(src_type)?;
        let kind = src_def.kind;
        let name = src_def.name.clone();
        let visibility = if src_def.root {
            Visibility::Root
        } else {
            Visibility::NonRoot
        };
        tracing::trace!(
            ?kind,
            name = name.as_deref().unwrap_or(""),
            src = %src_type,
            "importing type"
        );

        // a root-visible same-named type already in the destination is a
        // dedup candidate; a forward may be resolved by an incoming tag
        // definition, any other kind mismatch is a conflict
        let mut dst_id = None;
        if let Some(name) = &name {
            if let Some(&candidate) = self.name_index(kind).get(name.as_str())
            {
                if self.lookup_type(candidate)?.root {
                    dst_id = Some(candidate);
                }
            }
        }
        if let Some(candidate) = dst_id {
            let dst_kind = self.type_kind(candidate)?;
            if dst_kind != kind {
                let resolvable = dst_kind == Kind::Forward
                    && matches!(
                        kind,
                        Kind::Struct | Kind::Union | Kind::Enum
                    );
                if !resolvable {
                    return Err(CtfError::Conflict(
                        name.clone().unwrap_or_default(),
                    ));
                }
                dst_id = None;
            }
        }

        if matches!(kind, Kind::Integer | Kind::Float) {
            let src_enc = src
                .type_encoding(src_type)?
                .ok_or(CtfError::BadId(src_type))?;
            if let Some(candidate) = dst_id {
                let dst_enc = self
                    .type_encoding(candidate)?
                    .ok_or(CtfError::BadId(candidate))?;
                if encodings_compatible(kind, name.as_deref(), src_enc, dst_enc)
                {
                    return Ok(candidate);
                }
                return Err(CtfError::Conflict(
                    name.clone().unwrap_or_default(),
                ));
            }
        }

        // search the uncommitted pending list, newest first; accepting a
        // same-name same-kind entry here is what tolerates cycles
        if let Some(name) = &name {
            if let Some(found) =
                self.pending_match(src, src_type, kind, name)?
            {
                return Ok(found);
            }
        }

        let name_str = name.as_deref().unwrap_or("");
        match kind {
            Kind::Integer => {
                let encoding = src
                    .type_encoding(src_type)?
                    .ok_or(CtfError::BadId(src_type))?;
                self.add_integer(visibility, name_str, encoding)
            }
            Kind::Float => {
                let encoding = src
                    .type_encoding(src_type)?
                    .ok_or(CtfError::BadId(src_type))?;
                self.add_float(visibility, name_str, encoding)
            }
            Kind::Pointer
            | Kind::Volatile
            | Kind::Const
            | Kind::Restrict => {
                let referent = src
                    .type_reference(src_type)?
                    .ok_or(CtfError::BadId(src_type))?;
                let referent = self.import_ref(src, referent)?;
                match kind {
                    Kind::Pointer => self.add_pointer(visibility, referent),
                    Kind::Volatile => self.add_volatile(visibility, referent),
                    Kind::Const => self.add_const(visibility, referent),
                    _ => self.add_restrict(visibility, referent),
                }
            }
            Kind::Typedef => {
                let referent = src
                    .type_reference(src_type)?
                    .ok_or(CtfError::BadId(src_type))?;
                let referent = self.import_ref(src, referent)?;
                self.add_typedef(visibility, name_str, referent)
            }
            Kind::Array => {
                let info = src
                    .array_info(src_type)?
                    .ok_or(CtfError::BadId(src_type))?;
                let info = ArrayInfo {
                    contents: self.import_ref(src, info.contents)?,
                    index: self.import_ref(src, info.index)?,
                    nelems: info.nelems,
                };
                if let Some(candidate) = dst_id {
                    let existing = self
                        .array_info(candidate)?
                        .ok_or(CtfError::BadId(candidate))?;
                    if existing != info {
                        return Err(CtfError::Conflict(
                            name.clone().unwrap_or_default(),
                        ));
                    }
                    return Ok(candidate);
                }
                self.add_array(visibility, info)
            }
            Kind::Function => {
                let func = src
                    .func_info(src_type)?
                    .ok_or(CtfError::BadId(src_type))?;
                let ret = self.import_ref(src, func.ret)?;
                let mut args = Vec::with_capacity(func.args.len());
                for arg in &func.args {
                    args.push(self.import_ref(src, *arg)?);
                }
                self.add_function(visibility, ret, &args, func.varargs)
            }
            Kind::Struct | Kind::Union => {
                self.import_sou(src, src_type, kind, visibility, dst_id)
            }
            Kind::Enum => {
                self.import_enum(src, src_type, visibility, dst_id)
            }
            Kind::Forward => {
                self.add_forward(visibility, name_str, Kind::Struct)
            }
            Kind::Unknown => {
                Err(CtfError::corrupt("cannot import a type of unknown kind"))
            }
        }
    }

    /// Import a referent unless it is the 0 sentinel.
    fn import_ref(&mut self, src: &CtfDict, id: TypeId) -> Result<TypeId> {
        if id.index() == 0 {
            return Ok(TypeId::NONE);
        }
        self.add_type(src, id)
    }

    /// Walk the pending list newest-first, stopping at the last commit.
    fn pending_match(
        &self,
        src: &CtfDict,
        src_type: TypeId,
        kind: Kind,
        name: &str,
    ) -> Result<Option<TypeId>> {
        for (id, type_def) in self.types.iter().rev() {
            if id.index() <= self.old_id {
                break;
            }
            if type_def.kind != kind
                || type_def.name.as_deref() != Some(name)
            {
                continue;
            }
            if matches!(kind, Kind::Integer | Kind::Float) {
                if !type_def.root {
                    continue;
                }
                let dst_enc = match &type_def.data {
                    TypeData::Integer(encoding)
                    | TypeData::Float(encoding) => *encoding,
                    _ => continue,
                };
                let src_enc = src
                    .type_encoding(src_type)?
                    .ok_or(CtfError::BadId(src_type))?;
                if encodings_compatible(kind, Some(name), src_enc, dst_enc) {
                    return Ok(Some(*id));
                }
                return Err(CtfError::Conflict(name.to_owned()));
            }
            return Ok(Some(*id));
        }
        Ok(None)
    }

    fn import_sou(
        &mut self,
        src: &CtfDict,
        src_type: TypeId,
        kind: Kind,
        visibility: Visibility,
        dst_id: Option<TypeId>,
    ) -> Result<TypeId> {
        let src_def = src.lookup_type(src_type)?;
        let name = src_def.name.clone().unwrap_or_default();
        let size = src_def.size;
        let TypeData::Sou(src_members) = &src_def.data else {
            return Err(CtfError::NotSou(src_type));
        };

        if let Some(candidate) = dst_id {
            // same name and kind on both sides: sizes and member offsets
            // must agree for the existing definition to be reused
            if self.type_size(candidate)? != src.type_size(src_type)? {
                return Err(CtfError::Conflict(name));
            }
            for member in src_members {
                let Some(member_name) = &member.name else {
                    continue;
                };
                match self.member_info(candidate, member_name)? {
                    Some((_, offset)) if offset == member.offset => {}
                    _ => return Err(CtfError::Conflict(name)),
                }
            }
            return Ok(candidate);
        }

        let dst_type = match kind {
            Kind::Struct => self.add_struct_sized(visibility, &name, size)?,
            _ => self.add_union_sized(visibility, &name, size)?,
        };

        // first pass: install the members verbatim, still carrying
        // source ids, so recursive imports below can find this record
        let copied: Vec<Member> = src_members.to_vec();
        let member_types: Vec<TypeId> =
            copied.iter().map(|member| member.ty).collect();
        let type_def = self
            .types
            .get_mut(&dst_type)
            .ok_or(CtfError::BadId(dst_type))?;
        type_def.size = size;
        let TypeData::Sou(members) = &mut type_def.data else {
            return Err(CtfError::NotSou(dst_type));
        };
        *members = copied;
        for member in src_members {
            if let Some(member_name) = &member.name {
                self.str_growth += member_name.len() + 1;
            }
        }
        self.dirty = true;

        // second pass: translate member type ids, collecting errors so a
        // cycle through this record resolves to `dst_type`
        let mut first_err = None;
        for (position, member_src) in member_types.iter().enumerate() {
            match self.import_ref(src, *member_src) {
                Ok(translated) => {
                    let type_def = self
                        .types
                        .get_mut(&dst_type)
                        .ok_or(CtfError::BadId(dst_type))?;
                    if let TypeData::Sou(members) = &mut type_def.data {
                        members[position].ty = translated;
                    }
                }
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(dst_type),
        }
    }

    fn import_enum(
        &mut self,
        src: &CtfDict,
        src_type: TypeId,
        visibility: Visibility,
        dst_id: Option<TypeId>,
    ) -> Result<TypeId> {
        let src_def = src.lookup_type(src_type)?;
        let name = src_def.name.clone().unwrap_or_default();
        let TypeData::Enum(src_enumerators) = &src_def.data else {
            return Err(CtfError::NotEnum(src_type));
        };

        if let Some(candidate) = dst_id {
            // enumerators must match in both directions
            for enumerator in src_enumerators {
                match self.enum_value(candidate, &enumerator.name)? {
                    Some(value) if value == enumerator.value => {}
                    _ => return Err(CtfError::Conflict(name)),
                }
            }
            for enumerator in self.enumerators(candidate)? {
                match src.enum_value(src_type, &enumerator.name)? {
                    Some(value) if value == enumerator.value => {}
                    _ => return Err(CtfError::Conflict(name)),
                }
            }
            return Ok(candidate);
        }

        let dst_type = self.add_enum(visibility, &name)?;
        for enumerator in src_enumerators {
            self.add_enumerator(dst_type, &enumerator.name, enumerator.value)?;
        }
        Ok(dst_type)
    }
}

/// Integer and float definitions only merge when their encodings agree.
/// With the `compat-int-merge` feature, damaged root-visible `int`
/// definitions with 1- or 4-bit encodings are tolerated.
fn encodings_compatible(
    kind: Kind,
    name: Option<&str>,
    src_enc: Encoding,
    dst_enc: Encoding,
) -> bool {
    if src_enc == dst_enc {
        return true;
    }
    #[cfg(feature = "compat-int-merge")]
    if kind == Kind::Integer
        && name == Some("int")
        && matches!(src_enc.bits, 1 | 4)
    {
        return true;
    }
    #[cfg(not(feature = "compat-int-merge"))]
    let _ = (kind, name);
    false
}
