//! Read-only view of a serialized container.
//!
//! [`CtfView::open`] parses a byte buffer laid out as described in
//! [`crate::wire`] into owned records. The view keeps the buffer it was
//! parsed from so containers can be compared and re-opened byte for byte.

use anyhow::{anyhow, ensure, Context};

use crate::error::{CtfError, Result};
use crate::flag::{limit, MAGIC, VERSION};
use crate::types::{
    ArrayInfo, Enumerator, Kind, Member, TypeData, TypeDef, TypeId,
};
use crate::wire::{
    self, CtfArrayRec, CtfEnumerator, CtfHeader, CtfLsize, CtfMemberLong,
    CtfMemberShort, CtfTypeRec, CtfVarent, HEADER_LEN, VARENT_LEN,
};

#[derive(Debug, Clone)]
pub struct CtfView {
    buf: Vec<u8>,
    header: CtfHeader,
    child: bool,
    parent_name: Option<String>,
    /// record at index `i` has id `i + 1` (plus the child bit)
    types: Vec<TypeDef>,
    vars: Vec<(String, TypeId)>,
}

impl CtfView {
    /// Parse a serialized container. Any malformation is surfaced as
    /// [`CtfError::Corrupt`].
    pub fn open(buf: Vec<u8>) -> Result<Self> {
        Self::parse(buf).map_err(|err| CtfError::corrupt(format!("{err:#}")))
    }

    fn parse(buf: Vec<u8>) -> anyhow::Result<Self> {
        ensure!(buf.len() >= HEADER_LEN, "truncated header");
        let header: CtfHeader =
            bincode::deserialize_from(&buf[..HEADER_LEN]).context("header")?;
        ensure!(header.magic == MAGIC, "bad magic {:#06x}", header.magic);
        ensure!(
            header.version == VERSION,
            "unsupported version {}",
            header.version
        );

        let varoff = header.varoff as usize;
        let typeoff = header.typeoff as usize;
        let stroff = header.stroff as usize;
        let strlen = header.strlen as usize;
        ensure!(
            varoff <= typeoff && typeoff <= stroff,
            "section offsets out of order"
        );
        ensure!(
            HEADER_LEN + stroff + strlen == buf.len(),
            "container length mismatch: header says {}, buffer has {}",
            HEADER_LEN + stroff + strlen,
            buf.len()
        );
        ensure!(
            (typeoff - varoff) % VARENT_LEN == 0,
            "variable section length is not a multiple of {VARENT_LEN}"
        );
        ensure!(strlen >= 1, "empty string table");

        let strtab = &buf[HEADER_LEN + stroff..];
        ensure!(strtab[0] == 0, "string table must begin with NUL");

        let child = header.parname != 0;
        let parent_name = child
            .then(|| str_at(strtab, header.parname))
            .transpose()
            .context("parent name")?
            .map(str::to_owned);

        let mut vars = Vec::with_capacity((typeoff - varoff) / VARENT_LEN);
        let mut var_cursor = &buf[HEADER_LEN + varoff..HEADER_LEN + typeoff];
        while !var_cursor.is_empty() {
            let varent: CtfVarent =
                bincode::deserialize_from(&mut var_cursor)
                    .context("variable entry")?;
            let name = str_at(strtab, varent.name)
                .context("variable name")?
                .to_owned();
            ensure!(!name.is_empty(), "variable entry without a name");
            vars.push((name, TypeId::from_raw(varent.typ)));
        }

        let mut types = Vec::new();
        let mut cursor = &buf[HEADER_LEN + typeoff..HEADER_LEN + stroff];
        let mut index: u32 = 0;
        while !cursor.is_empty() {
            index += 1;
            let type_def =
                read_type(&mut cursor, strtab, TypeId::new(index, child))
                    .with_context(|| format!("type record {index}"))?;
            types.push(type_def);
        }

        Ok(Self {
            buf,
            header,
            child,
            parent_name,
            types,
            vars,
        })
    }

    pub fn lookup(&self, id: TypeId) -> Option<&TypeDef> {
        if id.is_child() != self.child || id.index() == 0 {
            return None;
        }
        self.types.get(id.index() as usize - 1)
    }

    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Variable bindings in stored (name-sorted) order.
    pub fn variables(&self) -> &[(String, TypeId)] {
        &self.vars
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    pub fn is_child(&self) -> bool {
        self.child
    }

    pub fn header(&self) -> &CtfHeader {
        &self.header
    }

    /// The serialized container this view was parsed from.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

fn read_type(
    cursor: &mut &[u8],
    strtab: &[u8],
    id: TypeId,
) -> anyhow::Result<TypeDef> {
    let rec: CtfTypeRec = bincode::deserialize_from(&mut *cursor)?;
    let kind_raw = wire::info_kind(rec.info);
    let kind = Kind::try_from(kind_raw)
        .map_err(|_| anyhow!("invalid kind {kind_raw}"))?;
    let root = wire::info_isroot(rec.info);
    let vlen = wire::info_vlen(rec.info) as usize;
    let name = match rec.name {
        0 => None,
        off => {
            let name = str_at(strtab, off).context("type name")?;
            (!name.is_empty()).then(|| name.to_owned())
        }
    };

    let read_size = |cursor: &mut &[u8]| -> anyhow::Result<u64> {
        if rec.size_or_type == limit::LSIZE_SENT {
            let lsize: CtfLsize = bincode::deserialize_from(&mut *cursor)?;
            Ok(wire::lsize_join(lsize))
        } else {
            Ok(u64::from(rec.size_or_type))
        }
    };

    let (size, data) = match kind {
        Kind::Integer | Kind::Float => {
            let size = read_size(cursor)?;
            let word: u32 = bincode::deserialize_from(&mut *cursor)?;
            let encoding = wire::encoding_from_word(word);
            let data = match kind {
                Kind::Integer => TypeData::Integer(encoding),
                _ => TypeData::Float(encoding),
            };
            (size, data)
        }
        Kind::Pointer
        | Kind::Typedef
        | Kind::Volatile
        | Kind::Const
        | Kind::Restrict => {
            (0, TypeData::Ref(TypeId::from_raw(rec.size_or_type)))
        }
        Kind::Array => {
            let rec: CtfArrayRec = bincode::deserialize_from(&mut *cursor)?;
            let info = ArrayInfo {
                contents: TypeId::from_raw(rec.contents),
                index: TypeId::from_raw(rec.index),
                nelems: rec.nelems,
            };
            (0, TypeData::Array(info))
        }
        Kind::Function => {
            let mut args = Vec::with_capacity(vlen);
            for _ in 0..vlen {
                let arg: u32 = bincode::deserialize_from(&mut *cursor)?;
                args.push(TypeId::from_raw(arg));
            }
            if vlen % 2 == 1 {
                let _pad: u32 = bincode::deserialize_from(&mut *cursor)?;
            }
            let ret = TypeId::from_raw(rec.size_or_type);
            (0, TypeData::Function { ret, args })
        }
        Kind::Struct | Kind::Union => {
            let size = read_size(cursor)?;
            let mut members = Vec::with_capacity(vlen);
            for _ in 0..vlen {
                let member = if size < limit::LSTRUCT_THRESH {
                    let rec: CtfMemberShort =
                        bincode::deserialize_from(&mut *cursor)?;
                    Member {
                        name: member_name(strtab, rec.name)?,
                        ty: TypeId::from_raw(rec.typ),
                        offset: u64::from(rec.offset),
                    }
                } else {
                    let rec: CtfMemberLong =
                        bincode::deserialize_from(&mut *cursor)?;
                    Member {
                        name: member_name(strtab, rec.name)?,
                        ty: TypeId::from_raw(rec.typ),
                        offset: wire::member_offset_join(
                            rec.offsethi,
                            rec.offsetlo,
                        ),
                    }
                };
                members.push(member);
            }
            (size, TypeData::Sou(members))
        }
        Kind::Enum => {
            let size = read_size(cursor)?;
            let mut enumerators = Vec::with_capacity(vlen);
            for _ in 0..vlen {
                let rec: CtfEnumerator =
                    bincode::deserialize_from(&mut *cursor)?;
                enumerators.push(Enumerator {
                    name: str_at(strtab, rec.name)
                        .context("enumerator name")?
                        .to_owned(),
                    value: rec.value,
                });
            }
            (size, TypeData::Enum(enumerators))
        }
        Kind::Forward => {
            let ref_kind = Kind::try_from(rec.size_or_type).map_err(|_| {
                anyhow!("invalid forward kind {}", rec.size_or_type)
            })?;
            ensure!(
                matches!(ref_kind, Kind::Struct | Kind::Union | Kind::Enum),
                "forward to non-tag kind {ref_kind:?}"
            );
            (0, TypeData::Forward(ref_kind))
        }
        Kind::Unknown => return Err(anyhow!("unknown kind record")),
    };

    Ok(TypeDef {
        id,
        name,
        kind,
        root,
        size,
        data,
    })
}

fn member_name(strtab: &[u8], off: u32) -> anyhow::Result<Option<String>> {
    if off == 0 {
        return Ok(None);
    }
    let name = str_at(strtab, off).context("member name")?;
    Ok((!name.is_empty()).then(|| name.to_owned()))
}

fn str_at(strtab: &[u8], off: u32) -> anyhow::Result<&str> {
    let start = off as usize;
    ensure!(start < strtab.len(), "string offset {off} out of bounds");
    let end = strtab[start..]
        .iter()
        .position(|b| *b == 0)
        .map(|pos| start + pos)
        .ok_or_else(|| anyhow!("unterminated string at offset {off}"))?;
    Ok(std::str::from_utf8(&strtab[start..end])?)
}
