//! Commit: serialize the dynamic state into a container buffer and swap
//! in a read-only view parsed back from it.
//!
//! The serializer makes two passes over the dynamic stores. Pass one
//! computes the section sizes for the header; pass two emits the records
//! and appends each name to the string table at the exact moment its
//! offset is recorded, so emission order defines the table layout.

use serde::Serialize;

use crate::dict::CtfDict;
use crate::error::{CtfError, Result};
use crate::flag::{limit, MAGIC, VERSION};
use crate::read::CtfView;
use crate::strtab::StrTab;
use crate::types::{TypeData, TypeDef};
use crate::wire::{
    self, CtfArrayRec, CtfEnumerator, CtfHeader, CtfMemberLong,
    CtfMemberShort, CtfTypeRec, CtfVarent, ENUMERATOR_LEN, FUNC_ARG_LEN,
    HEADER_LEN, LONG_MEMBER_LEN, LONG_TYPE_LEN, SHORT_MEMBER_LEN,
    SHORT_TYPE_LEN, VARENT_LEN,
};

impl CtfDict {
    /// Freeze the current dictionary into a read-only view.
    ///
    /// A no-op on a clean container. On success the DIRTY flag clears,
    /// the committed high-water marks advance and the name indexes are
    /// rebuilt from the new view; on failure the container stays dirty
    /// and the previous view stays in place.
    pub fn update(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let buf = self.serialize()?;
        let view = CtfView::open(buf)?;
        self.view = Some(view);
        self.rebuild_indexes();
        self.old_id = self.next_id - 1;
        self.last_committed = self.snapshots;
        self.snapshots += 1;
        self.dirty = false;
        Ok(())
    }

    /// Lay out the whole dictionary as a container buffer.
    pub(crate) fn serialize(&self) -> Result<Vec<u8>> {
        // pass one: section sizes
        let type_bytes: usize =
            self.types.values().map(record_len).sum();
        let nvars = self.vars.len();
        let varoff = 0usize;
        let typeoff = varoff + nvars * VARENT_LEN;
        let stroff = typeoff + type_bytes;
        let parent_bytes = self
            .parent_name
            .as_ref()
            .map_or(0, |name| name.len() + 1);
        let strlen = self.str_growth + parent_bytes;
        tracing::debug!(
            types = self.types.len(),
            nvars,
            typeoff,
            stroff,
            strlen,
            "serializing container"
        );

        // pass two: emission
        let mut buf = Vec::with_capacity(HEADER_LEN + stroff + strlen);
        let mut strtab = StrTab::new();
        let parname = match &self.parent_name {
            Some(name) => strtab.insert(name),
            None => 0,
        };
        put(
            &mut buf,
            &CtfHeader {
                magic: MAGIC,
                version: VERSION,
                flags: 0,
                parname,
                lbloff: 0,
                objtoff: 0,
                funcoff: 0,
                varoff: varoff as u32,
                typeoff: typeoff as u32,
                stroff: stroff as u32,
                strlen: strlen as u32,
            },
        )?;

        // variable names are appended in insertion order, the entries
        // themselves are emitted sorted by name
        let mut varents: Vec<CtfVarent> = self
            .vars
            .iter()
            .map(|var| CtfVarent {
                name: strtab.insert(&var.name),
                typ: var.ty.into_raw(),
            })
            .collect();
        varents.sort_by(|a, b| {
            strtab.bytes_at(a.name).cmp(strtab.bytes_at(b.name))
        });
        for varent in &varents {
            put(&mut buf, varent)?;
        }
        debug_assert_eq!(buf.len(), HEADER_LEN + typeoff);

        for type_def in self.types.values() {
            emit_type(&mut buf, &mut strtab, type_def)?;
        }
        debug_assert_eq!(buf.len(), HEADER_LEN + stroff);
        debug_assert_eq!(strtab.len(), strlen);

        buf.extend_from_slice(strtab.as_bytes());
        Ok(buf)
    }
}

/// Serialized length of one type record, header plus payload.
fn record_len(type_def: &TypeDef) -> usize {
    let header = match &type_def.data {
        TypeData::Integer(_)
        | TypeData::Float(_)
        | TypeData::Sou(_)
        | TypeData::Enum(_)
            if wire::is_lsize(type_def.size) =>
        {
            LONG_TYPE_LEN
        }
        _ => SHORT_TYPE_LEN,
    };
    let payload = match &type_def.data {
        TypeData::Integer(_) | TypeData::Float(_) => 4,
        TypeData::Array(_) => 12,
        TypeData::Function { args, .. } => {
            FUNC_ARG_LEN * (args.len() + args.len() % 2)
        }
        TypeData::Sou(members) => {
            let member_len = if type_def.size < limit::LSTRUCT_THRESH {
                SHORT_MEMBER_LEN
            } else {
                LONG_MEMBER_LEN
            };
            members.len() * member_len
        }
        TypeData::Enum(enumerators) => enumerators.len() * ENUMERATOR_LEN,
        TypeData::Ref(_) | TypeData::Forward(_) => 0,
    };
    header + payload
}

fn emit_type(
    buf: &mut Vec<u8>,
    strtab: &mut StrTab,
    type_def: &TypeDef,
) -> Result<()> {
    let name = match &type_def.name {
        Some(name) => strtab.insert(name),
        None => 0,
    };
    let info =
        wire::type_info(type_def.kind, type_def.root, type_def.vlen() as u32);

    let mut lsize = None;
    let size_or_type = match &type_def.data {
        TypeData::Integer(_)
        | TypeData::Float(_)
        | TypeData::Sou(_)
        | TypeData::Enum(_) => {
            if wire::is_lsize(type_def.size) {
                lsize = Some(wire::lsize_split(type_def.size));
                limit::LSIZE_SENT
            } else {
                type_def.size as u32
            }
        }
        TypeData::Ref(referent) => referent.into_raw(),
        TypeData::Function { ret, .. } => ret.into_raw(),
        TypeData::Forward(kind) => u32::from(*kind),
        TypeData::Array(_) => 0,
    };
    put(
        buf,
        &CtfTypeRec {
            name,
            info,
            size_or_type,
        },
    )?;
    if let Some(lsize) = lsize {
        put(buf, &lsize)?;
    }

    match &type_def.data {
        TypeData::Integer(encoding) | TypeData::Float(encoding) => {
            put(buf, &wire::encoding_word(*encoding))?;
        }
        TypeData::Array(info) => {
            put(
                buf,
                &CtfArrayRec {
                    contents: info.contents.into_raw(),
                    index: info.index.into_raw(),
                    nelems: info.nelems,
                },
            )?;
        }
        TypeData::Function { args, .. } => {
            for arg in args {
                put(buf, &arg.into_raw())?;
            }
            // odd argument counts get one zero word of padding
            if args.len() % 2 == 1 {
                put(buf, &0u32)?;
            }
        }
        TypeData::Sou(members) => {
            let long_members = type_def.size >= limit::LSTRUCT_THRESH;
            for member in members {
                let name = match &member.name {
                    Some(name) => strtab.insert(name),
                    None => 0,
                };
                if long_members {
                    let (offsethi, offsetlo) =
                        wire::member_offset_split(member.offset);
                    put(
                        buf,
                        &CtfMemberLong {
                            name,
                            typ: member.ty.into_raw(),
                            offsethi,
                            offsetlo,
                        },
                    )?;
                } else {
                    put(
                        buf,
                        &CtfMemberShort {
                            name,
                            typ: member.ty.into_raw(),
                            offset: member.offset as u32,
                        },
                    )?;
                }
            }
        }
        TypeData::Enum(enumerators) => {
            for enumerator in enumerators {
                put(
                    buf,
                    &CtfEnumerator {
                        name: strtab.insert(&enumerator.name),
                        value: enumerator.value,
                    },
                )?;
            }
        }
        TypeData::Ref(_) | TypeData::Forward(_) => {}
    }
    Ok(())
}

fn put<T: Serialize>(buf: &mut Vec<u8>, value: &T) -> Result<()> {
    bincode::serialize_into(buf, value).map_err(CtfError::corrupt)
}
