//! Construction, mutation and serialization of CTF (Compact Type Format)
//! containers: compact binary dictionaries of C type information as
//! consumed by kernel tracing and binary-introspection tools.
//!
//! A [`CtfDict`] starts empty, accumulates integers, floats, pointers,
//! arrays, functions, structs, unions, enums, typedefs, qualifiers,
//! forwards and named variable bindings through its `add_*` builders, and
//! on [`CtfDict::update`] freezes the whole dictionary into a
//! self-contained read-only buffer that later lookups (and other
//! containers importing types through [`CtfDict::add_type`]) operate
//! against.
#![forbid(unsafe_code)]

pub mod dict;
pub mod error;
pub mod flag;
pub mod read;
pub mod snapshot;
pub mod strtab;
pub mod types;
pub mod wire;

mod builder;
mod import;
mod update;

#[cfg(test)]
mod test;

pub use dict::{CtfDict, CtfModel};
pub use error::{CtfError, Result};
pub use read::CtfView;
pub use snapshot::CtfSnapshot;
pub use types::{
    ArrayInfo, Encoding, Enumerator, FuncInfo, Kind, Member, TypeId,
    Visibility,
};
