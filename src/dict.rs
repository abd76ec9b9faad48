//! The mutable type dictionary: dynamic type and variable stores, name
//! indexes, commit bookkeeping and the lookup services that introspect
//! both pending and committed types.

use std::collections::{BTreeMap, HashMap};

use crate::error::{CtfError, Result};
use crate::read::CtfView;
use crate::types::{
    ArrayInfo, Encoding, Enumerator, FuncInfo, Kind, Member, TypeData,
    TypeDef, TypeId, VarDef,
};

/// Longest reference chain (typedefs, qualifiers, array elements) the
/// lookup services will walk before declaring the graph malformed.
const MAX_REF_CHAIN: usize = 64;

/// Sizes of the C `int`, `long` and pointer types of the program the
/// container describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CtfModel {
    Ilp32,
    #[default]
    Lp64,
}

impl CtfModel {
    pub fn int_size(self) -> u64 {
        4
    }

    pub fn long_size(self) -> u64 {
        match self {
            CtfModel::Ilp32 => 4,
            CtfModel::Lp64 => 8,
        }
    }

    pub fn pointer_size(self) -> u64 {
        match self {
            CtfModel::Ilp32 => 4,
            CtfModel::Lp64 => 8,
        }
    }
}

/// A CTF container.
///
/// A writable container accumulates pending type and variable
/// definitions; [`CtfDict::update`] freezes them into a serialized buffer
/// and swaps in a read-only view parsed back from it. The dynamic stores
/// survive the swap, so every update re-emits the whole dictionary and
/// ids stay stable for the life of the container.
pub struct CtfDict {
    pub(crate) model: CtfModel,
    pub(crate) view: Option<CtfView>,
    /// pending types; ascending-key iteration is insertion order because
    /// ids are allocated monotonically
    pub(crate) types: BTreeMap<TypeId, TypeDef>,
    /// pending variables in insertion order
    pub(crate) vars: Vec<VarDef>,
    pub(crate) var_names: HashMap<String, TypeId>,
    /// per-kind name indexes over root-visible named types
    pub(crate) structs: HashMap<String, TypeId>,
    pub(crate) unions: HashMap<String, TypeId>,
    pub(crate) enums: HashMap<String, TypeId>,
    pub(crate) names: HashMap<String, TypeId>,
    /// next type index to allocate
    pub(crate) next_id: u32,
    /// high-water type index at the last successful update
    pub(crate) old_id: u32,
    pub(crate) snapshots: u32,
    pub(crate) last_committed: u32,
    /// bytes of dynamic strings, including the reserved leading NUL
    pub(crate) str_growth: usize,
    pub(crate) writable: bool,
    pub(crate) dirty: bool,
    pub(crate) child: bool,
    pub(crate) parent_name: Option<String>,
}

impl CtfDict {
    /// Create an empty writable container.
    pub fn create(model: CtfModel) -> Self {
        Self::new(model, false, None)
    }

    /// Create an empty writable child container. Ids allocated by it
    /// carry the child bit and the parent name is recorded in the
    /// serialized header.
    pub fn create_child(model: CtfModel, parent_name: &str) -> Self {
        Self::new(model, true, Some(parent_name.to_owned()))
    }

    fn new(model: CtfModel, child: bool, parent_name: Option<String>) -> Self {
        Self {
            model,
            view: None,
            types: BTreeMap::new(),
            vars: Vec::new(),
            var_names: HashMap::new(),
            structs: HashMap::new(),
            unions: HashMap::new(),
            enums: HashMap::new(),
            names: HashMap::new(),
            next_id: 1,
            old_id: 0,
            // the counter starts past the (implicit) snapshot of the
            // empty container, so the first explicit snapshot is always
            // newer than the last commit and can be rolled back
            snapshots: 1,
            last_committed: 0,
            str_growth: 1,
            writable: true,
            dirty: false,
            child,
            parent_name,
        }
    }

    /// Open a serialized container as a read-only dictionary. Builder
    /// calls on it fail with [`CtfError::ReadOnly`].
    pub fn open(buf: Vec<u8>) -> Result<Self> {
        let view = CtfView::open(buf)?;
        let mut dict = Self::new(
            CtfModel::default(),
            view.is_child(),
            view.parent_name().map(str::to_owned),
        );
        dict.writable = false;
        dict.next_id = view.type_count() as u32 + 1;
        dict.old_id = view.type_count() as u32;
        dict.view = Some(view);
        dict.rebuild_indexes();
        Ok(dict)
    }

    pub fn model(&self) -> CtfModel {
        self.model
    }

    pub fn set_model(&mut self, model: CtfModel) {
        self.model = model;
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_child(&self) -> bool {
        self.child
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    /// The read-only view installed by the last successful update (or by
    /// [`CtfDict::open`]).
    pub fn view(&self) -> Option<&CtfView> {
        self.view.as_ref()
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(CtfError::ReadOnly)
        }
    }

    pub(crate) fn make_id(&self, index: u32) -> TypeId {
        TypeId::new(index, self.child)
    }

    /// Find a type record by id, checking the dynamic store first and the
    /// read-only view second.
    pub(crate) fn lookup_type(&self, id: TypeId) -> Result<&TypeDef> {
        self.types
            .get(&id)
            .or_else(|| self.view.as_ref().and_then(|view| view.lookup(id)))
            .ok_or(CtfError::BadId(id))
    }

    /// The name index a given kind is registered in: structs, unions and
    /// enums have dedicated buckets, everything else shares one.
    pub(crate) fn name_index(&self, kind: Kind) -> &HashMap<String, TypeId> {
        match kind {
            Kind::Struct => &self.structs,
            Kind::Union => &self.unions,
            Kind::Enum => &self.enums,
            _ => &self.names,
        }
    }

    pub(crate) fn name_index_mut(
        &mut self,
        kind: Kind,
    ) -> &mut HashMap<String, TypeId> {
        match kind {
            Kind::Struct => &mut self.structs,
            Kind::Union => &mut self.unions,
            Kind::Enum => &mut self.enums,
            _ => &mut self.names,
        }
    }

    /// Repopulate the four name indexes from the read-only view. Only
    /// root-visible named types are discoverable; forwards register under
    /// the kind they stand for and never shadow a real definition.
    pub(crate) fn rebuild_indexes(&mut self) {
        self.structs.clear();
        self.unions.clear();
        self.enums.clear();
        self.names.clear();
        let Some(view) = self.view.take() else {
            return;
        };
        for type_def in view.types() {
            if !type_def.root {
                continue;
            }
            let Some(name) = &type_def.name else {
                continue;
            };
            match &type_def.data {
                TypeData::Forward(ref_kind) => {
                    self.name_index_mut(*ref_kind)
                        .entry(name.clone())
                        .or_insert(type_def.id);
                }
                _ => {
                    self.name_index_mut(type_def.kind)
                        .insert(name.clone(), type_def.id);
                }
            }
        }
        self.view = Some(view);
    }

    /// Delete a pending type, unregistering its name and giving back its
    /// string-table growth.
    pub(crate) fn dtd_delete(&mut self, id: TypeId) {
        let Some(type_def) = self.types.remove(&id) else {
            return;
        };
        if let Some(name) = &type_def.name {
            self.str_growth -= name.len() + 1;
            let index_kind = match &type_def.data {
                TypeData::Forward(ref_kind) => *ref_kind,
                _ => type_def.kind,
            };
            let index = self.name_index_mut(index_kind);
            if index.get(name) == Some(&id) {
                index.remove(name);
            }
        }
        match &type_def.data {
            TypeData::Sou(members) => {
                for member in members {
                    if let Some(name) = &member.name {
                        self.str_growth -= name.len() + 1;
                    }
                }
            }
            TypeData::Enum(enumerators) => {
                for enumerator in enumerators {
                    self.str_growth -= enumerator.name.len() + 1;
                }
            }
            _ => {}
        }
    }

    // -- lookup services ---------------------------------------------------

    pub fn type_kind(&self, id: TypeId) -> Result<Kind> {
        Ok(self.lookup_type(id)?.kind)
    }

    /// Strip typedefs and qualifiers down to the underlying type.
    pub fn type_resolve(&self, mut id: TypeId) -> Result<TypeId> {
        for _ in 0..MAX_REF_CHAIN {
            let type_def = self.lookup_type(id)?;
            match (type_def.kind, &type_def.data) {
                (
                    Kind::Typedef
                    | Kind::Volatile
                    | Kind::Const
                    | Kind::Restrict,
                    TypeData::Ref(referent),
                ) => id = *referent,
                _ => return Ok(id),
            }
        }
        Err(CtfError::BadId(id))
    }

    pub fn type_size(&self, id: TypeId) -> Result<u64> {
        self.size_inner(id, 0)
    }

    fn size_inner(&self, id: TypeId, depth: usize) -> Result<u64> {
        if depth > MAX_REF_CHAIN {
            return Err(CtfError::BadId(id));
        }
        let type_def = self.lookup_type(id)?;
        match (type_def.kind, &type_def.data) {
            (
                Kind::Integer
                | Kind::Float
                | Kind::Struct
                | Kind::Union
                | Kind::Enum,
                _,
            ) => Ok(type_def.size),
            (Kind::Pointer, _) => Ok(self.model.pointer_size()),
            (Kind::Function | Kind::Forward | Kind::Unknown, _) => Ok(0),
            (Kind::Array, TypeData::Array(info)) => Ok(self
                .size_inner(info.contents, depth + 1)?
                * u64::from(info.nelems)),
            (_, TypeData::Ref(referent)) => {
                self.size_inner(*referent, depth + 1)
            }
            _ => Err(CtfError::BadId(id)),
        }
    }

    /// Natural alignment in bytes. Structs align as their first member,
    /// unions as their widest-aligned member; forwards and empty
    /// aggregates report 0 and are clamped to 1 by the member layout
    /// code.
    pub fn type_align(&self, id: TypeId) -> Result<u64> {
        self.align_inner(id, 0)
    }

    fn align_inner(&self, id: TypeId, depth: usize) -> Result<u64> {
        if depth > MAX_REF_CHAIN {
            return Err(CtfError::BadId(id));
        }
        let type_def = self.lookup_type(id)?;
        match (type_def.kind, &type_def.data) {
            (Kind::Integer | Kind::Float | Kind::Enum, _) => {
                Ok(type_def.size)
            }
            (Kind::Pointer | Kind::Function, _) => {
                Ok(self.model.pointer_size())
            }
            (Kind::Array, TypeData::Array(info)) => {
                self.align_inner(info.contents, depth + 1)
            }
            (Kind::Struct, TypeData::Sou(members)) => match members.first() {
                Some(member) => self.align_inner(member.ty, depth + 1),
                None => Ok(0),
            },
            (Kind::Union, TypeData::Sou(members)) => {
                let mut align = 0;
                for member in members {
                    align =
                        align.max(self.align_inner(member.ty, depth + 1)?);
                }
                Ok(align)
            }
            (Kind::Forward | Kind::Unknown, _) => Ok(0),
            (_, TypeData::Ref(referent)) => {
                self.align_inner(*referent, depth + 1)
            }
            _ => Err(CtfError::BadId(id)),
        }
    }

    /// Encoding of an integer or float type, after resolving typedefs
    /// and qualifiers. `Ok(None)` for every other kind.
    pub fn type_encoding(&self, id: TypeId) -> Result<Option<Encoding>> {
        let id = self.type_resolve(id)?;
        match &self.lookup_type(id)?.data {
            TypeData::Integer(encoding) | TypeData::Float(encoding) => {
                Ok(Some(*encoding))
            }
            _ => Ok(None),
        }
    }

    /// Direct referent of a pointer, typedef or qualifier. `Ok(None)`
    /// for kinds without a referent.
    pub fn type_reference(&self, id: TypeId) -> Result<Option<TypeId>> {
        match &self.lookup_type(id)?.data {
            TypeData::Ref(referent) => Ok(Some(*referent)),
            _ => Ok(None),
        }
    }

    pub fn array_info(&self, id: TypeId) -> Result<Option<ArrayInfo>> {
        let id = self.type_resolve(id)?;
        match &self.lookup_type(id)?.data {
            TypeData::Array(info) => Ok(Some(*info)),
            _ => Ok(None),
        }
    }

    /// Members of a struct or union, in declaration order.
    pub fn members(&self, id: TypeId) -> Result<&[Member]> {
        let resolved = self.type_resolve(id)?;
        match &self.lookup_type(resolved)?.data {
            TypeData::Sou(members) => Ok(members),
            _ => Err(CtfError::NotSou(id)),
        }
    }

    /// Type and bit offset of the named member.
    pub fn member_info(
        &self,
        id: TypeId,
        name: &str,
    ) -> Result<Option<(TypeId, u64)>> {
        Ok(self
            .members(id)?
            .iter()
            .find(|member| member.name.as_deref() == Some(name))
            .map(|member| (member.ty, member.offset)))
    }

    pub fn enumerators(&self, id: TypeId) -> Result<&[Enumerator]> {
        let resolved = self.type_resolve(id)?;
        match &self.lookup_type(resolved)?.data {
            TypeData::Enum(enumerators) => Ok(enumerators),
            _ => Err(CtfError::NotEnum(id)),
        }
    }

    pub fn enum_value(&self, id: TypeId, name: &str) -> Result<Option<i32>> {
        Ok(self
            .enumerators(id)?
            .iter()
            .find(|enumerator| enumerator.name == name)
            .map(|enumerator| enumerator.value))
    }

    /// Return type, argument types and variadic flag of a function type.
    /// `Ok(None)` for non-function kinds.
    pub fn func_info(&self, id: TypeId) -> Result<Option<FuncInfo>> {
        let id = self.type_resolve(id)?;
        match &self.lookup_type(id)?.data {
            TypeData::Function { ret, args } => {
                let varargs = args.last() == Some(&TypeId::NONE);
                let args = if varargs {
                    args[..args.len() - 1].to_vec()
                } else {
                    args.clone()
                };
                Ok(Some(FuncInfo {
                    ret: *ret,
                    args,
                    varargs,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Variable binding by name, searching pending variables first and
    /// the committed view second.
    pub fn lookup_variable(&self, name: &str) -> Option<TypeId> {
        self.var_names.get(name).copied().or_else(|| {
            self.view.as_ref().and_then(|view| {
                view.variables()
                    .iter()
                    .find(|(var_name, _)| var_name == name)
                    .map(|(_, ty)| *ty)
            })
        })
    }
}
