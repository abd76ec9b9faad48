//! On-disk records of a serialized container and the bit packing used by
//! them.
//!
//! All records are sequences of little-endian words written and read with
//! bincode; every type record is 4-byte aligned because each payload is a
//! multiple of 4 bytes.

use serde::{Deserialize, Serialize};

use crate::flag::{info, limit};
use crate::types::{Encoding, Kind};

pub const HEADER_LEN: usize = 36;
pub const VARENT_LEN: usize = 8;
pub const SHORT_TYPE_LEN: usize = 12;
pub const LONG_TYPE_LEN: usize = 20;
pub const SHORT_MEMBER_LEN: usize = 12;
pub const LONG_MEMBER_LEN: usize = 16;
pub const ENUMERATOR_LEN: usize = 8;
pub const FUNC_ARG_LEN: usize = 4;

/// Container header. Section offsets are relative to the first byte after
/// the header; the label, object and function sections are always empty.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CtfHeader {
    pub magic: u16,
    pub version: u8,
    pub flags: u8,
    /// string offset of the parent container name, 0 if none
    pub parname: u32,
    pub lbloff: u32,
    pub objtoff: u32,
    pub funcoff: u32,
    pub varoff: u32,
    pub typeoff: u32,
    pub stroff: u32,
    pub strlen: u32,
}

/// Variable section entry, sorted by name string at emission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CtfVarent {
    pub name: u32,
    pub typ: u32,
}

/// Leading words of every type record. `size_or_type` holds the size for
/// integer/float/struct/union/enum records and a referenced type id (or,
/// for forwards, a kind) otherwise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CtfTypeRec {
    pub name: u32,
    pub info: u32,
    pub size_or_type: u32,
}

/// Extra words of a long type record, present when `size_or_type` is
/// [`limit::LSIZE_SENT`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CtfLsize {
    pub lsizehi: u32,
    pub lsizelo: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CtfMemberShort {
    pub name: u32,
    pub typ: u32,
    pub offset: u32,
}

/// Member record of a struct/union whose byte size is at least
/// [`limit::LSTRUCT_THRESH`]; the bit offset is split in two words.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CtfMemberLong {
    pub name: u32,
    pub typ: u32,
    pub offsethi: u32,
    pub offsetlo: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CtfEnumerator {
    pub name: u32,
    pub value: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CtfArrayRec {
    pub contents: u32,
    pub index: u32,
    pub nelems: u32,
}

pub fn type_info(kind: Kind, root: bool, vlen: u32) -> u32 {
    debug_assert!(vlen <= info::MAX_VLEN);
    (u32::from(kind) << info::KIND_SHIFT)
        | if root { info::ROOT } else { 0 }
        | (vlen & info::MAX_VLEN)
}

pub fn info_kind(word: u32) -> u32 {
    (word >> info::KIND_SHIFT) & info::KIND_MAX
}

pub fn info_isroot(word: u32) -> bool {
    word & info::ROOT != 0
}

pub fn info_vlen(word: u32) -> u32 {
    word & info::MAX_VLEN
}

/// Integer and float encodings share one packed word:
/// `(format << 24) | (offset << 16) | bits`.
pub fn encoding_word(enc: Encoding) -> u32 {
    (u32::from(enc.format) << 24)
        | (u32::from(enc.offset) << 16)
        | u32::from(enc.bits)
}

pub fn encoding_from_word(word: u32) -> Encoding {
    Encoding {
        format: (word >> 24) as u8,
        offset: (word >> 16) as u8,
        bits: word as u16,
    }
}

pub fn lsize_split(size: u64) -> CtfLsize {
    CtfLsize {
        lsizehi: (size >> 32) as u32,
        lsizelo: size as u32,
    }
}

pub fn lsize_join(lsize: CtfLsize) -> u64 {
    (u64::from(lsize.lsizehi) << 32) | u64::from(lsize.lsizelo)
}

pub fn member_offset_split(offset: u64) -> (u32, u32) {
    ((offset >> 32) as u32, offset as u32)
}

pub fn member_offset_join(offsethi: u32, offsetlo: u32) -> u64 {
    (u64::from(offsethi) << 32) | u64::from(offsetlo)
}

/// Smallest power of two that holds `bits` bits, in bytes. Sizes 1 to 8
/// bytes map to {1, 2, 4, 4, 8, 8, 8, 8}.
pub fn size_from_bits(bits: u16) -> u64 {
    clp2(u64::from(bits).div_ceil(8))
}

pub fn clp2(value: u64) -> u64 {
    value.next_power_of_two()
}

/// `true` when the size does not fit the short `size` word.
pub fn is_lsize(size: u64) -> bool {
    size > u64::from(limit::MAX_SIZE)
}
