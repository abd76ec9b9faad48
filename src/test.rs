use rstest::rstest;

use crate::flag::{info, int_fmt, limit};
use crate::{
    ArrayInfo, CtfDict, CtfError, CtfModel, Encoding, Kind, TypeId,
    Visibility,
};

use Visibility::{NonRoot, Root};

fn dict() -> CtfDict {
    CtfDict::create(CtfModel::Lp64)
}

fn signed(bits: u16) -> Encoding {
    Encoding::new(int_fmt::SIGNED, 0, bits)
}

fn id(raw: u32) -> TypeId {
    TypeId::from_raw(raw)
}

fn reopen(dict: &CtfDict) -> CtfDict {
    CtfDict::open(dict.view().unwrap().as_bytes().to_vec()).unwrap()
}

#[rstest]
#[case(1, 1)]
#[case(8, 1)]
#[case(9, 2)]
#[case(16, 2)]
#[case(33, 8)]
#[case(64, 8)]
fn integer_sizes(#[case] bits: u16, #[case] size: u64) {
    let mut d = dict();
    let int_id = d.add_integer(Root, "t", signed(bits)).unwrap();
    assert_eq!(d.type_size(int_id).unwrap(), size);
}

#[test]
fn build_int_and_round_trip() {
    let mut d = dict();
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    assert_eq!(int_id, id(1));
    d.update().unwrap();

    // string table: leading NUL plus "int\0"
    let view = d.view().unwrap();
    assert_eq!(view.header().strlen, 5);
    assert_eq!(view.header().varoff, 0);
    assert_eq!(view.header().typeoff, 0);

    let back = reopen(&d);
    assert_eq!(back.type_kind(id(1)).unwrap(), Kind::Integer);
    assert_eq!(back.type_size(id(1)).unwrap(), 4);
    assert_eq!(back.type_encoding(id(1)).unwrap(), Some(signed(32)));
    assert!(!back.is_writable());
    assert!(matches!(
        back.type_kind(id(2)),
        Err(CtfError::BadId(_))
    ));
}

#[test]
fn dirty_tracks_mutation_and_update_is_idempotent() {
    let mut d = dict();
    assert!(!d.is_dirty());
    d.add_integer(Root, "int", signed(32)).unwrap();
    assert!(d.is_dirty());
    d.update().unwrap();
    assert!(!d.is_dirty());

    let bytes = d.view().unwrap().as_bytes().to_vec();
    d.update().unwrap();
    assert_eq!(d.view().unwrap().as_bytes(), &bytes[..]);

    d.add_integer(NonRoot, "other", signed(8)).unwrap();
    assert!(d.is_dirty());
}

#[test]
fn struct_with_natural_offsets() {
    let mut d = dict();
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    let s = d.add_struct(Root, "S").unwrap();
    d.add_member(s, Some("a"), int_id).unwrap();
    d.add_member(s, Some("b"), int_id).unwrap();

    assert_eq!(d.type_size(s).unwrap(), 8);
    assert_eq!(d.member_info(s, "a").unwrap(), Some((int_id, 0)));
    assert_eq!(d.member_info(s, "b").unwrap(), Some((int_id, 32)));

    d.update().unwrap();
    let back = reopen(&d);
    assert_eq!(back.type_size(s).unwrap(), 8);
    assert_eq!(back.member_info(s, "b").unwrap(), Some((int_id, 32)));
}

#[test]
fn natural_offsets_respect_alignment() {
    let mut d = dict();
    let char_id = d.add_integer(Root, "char", signed(8)).unwrap();
    let long_id = d.add_integer(Root, "long", signed(64)).unwrap();
    let s = d.add_struct(Root, "S").unwrap();
    d.add_member(s, Some("c"), char_id).unwrap();
    d.add_member(s, Some("l"), long_id).unwrap();

    // `l` is 8-byte aligned, leaving 7 bytes of padding after `c`
    assert_eq!(d.member_info(s, "l").unwrap(), Some((long_id, 64)));
    assert_eq!(d.type_size(s).unwrap(), 16);
}

#[test]
fn explicit_offsets_grow_the_struct() {
    let mut d = dict();
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    let s = d.add_struct(Root, "S").unwrap();
    d.add_member_offset(s, Some("x"), int_id, Some(40)).unwrap();
    assert_eq!(d.member_info(s, "x").unwrap(), Some((int_id, 40)));
    assert_eq!(d.type_size(s).unwrap(), 9);

    assert!(matches!(
        d.add_member_offset(s, Some("x"), int_id, Some(0)),
        Err(CtfError::Duplicate(_))
    ));
    assert!(matches!(
        d.add_member(int_id, Some("y"), int_id),
        Err(CtfError::NotSou(_))
    ));
}

#[test]
fn union_members_share_offset_zero() {
    let mut d = dict();
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    let long_id = d.add_integer(Root, "long", signed(64)).unwrap();
    let u = d.add_union(Root, "U").unwrap();
    d.add_member(u, Some("i"), int_id).unwrap();
    d.add_member(u, Some("l"), long_id).unwrap();

    assert_eq!(d.member_info(u, "i").unwrap(), Some((int_id, 0)));
    assert_eq!(d.member_info(u, "l").unwrap(), Some((long_id, 0)));
    assert_eq!(d.type_size(u).unwrap(), 8);
}

#[test]
fn forward_is_upgraded_in_place() {
    let mut d = dict();
    let fwd = d.add_forward(Root, "X", Kind::Struct).unwrap();
    assert_eq!(fwd, id(1));
    // registering the same tag again is idempotent
    assert_eq!(d.add_forward(Root, "X", Kind::Struct).unwrap(), fwd);

    let s = d.add_struct(Root, "X").unwrap();
    assert_eq!(s, fwd);
    assert_eq!(d.type_kind(fwd).unwrap(), Kind::Struct);

    d.update().unwrap();
    let back = reopen(&d);
    assert_eq!(back.type_kind(id(1)).unwrap(), Kind::Struct);
}

#[test]
fn forward_kinds_are_checked() {
    let mut d = dict();
    assert!(matches!(
        d.add_forward(Root, "p", Kind::Pointer),
        Err(CtfError::NotSue)
    ));
    // a union forward does not satisfy a struct lookup
    let fwd = d.add_forward(Root, "tag", Kind::Union).unwrap();
    let s = d.add_struct(Root, "tag").unwrap();
    assert_ne!(fwd, s);
    assert_eq!(d.type_kind(fwd).unwrap(), Kind::Forward);
}

#[test]
fn enum_round_trip_and_errors() {
    let mut d = dict();
    let e = d.add_enum(Root, "colors").unwrap();
    assert_eq!(d.type_size(e).unwrap(), 4);
    d.add_enumerator(e, "RED", 0).unwrap();
    d.add_enumerator(e, "GREEN", 1).unwrap();
    d.add_enumerator(e, "MISSING", -1).unwrap();
    assert!(matches!(
        d.add_enumerator(e, "RED", 5),
        Err(CtfError::Duplicate(_))
    ));

    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    assert!(matches!(
        d.add_enumerator(int_id, "NOPE", 0),
        Err(CtfError::NotEnum(_))
    ));

    d.update().unwrap();
    let back = reopen(&d);
    assert_eq!(back.enum_value(e, "GREEN").unwrap(), Some(1));
    assert_eq!(back.enum_value(e, "MISSING").unwrap(), Some(-1));
    assert_eq!(back.enum_value(e, "BLUE").unwrap(), None);
    assert_eq!(back.enumerators(e).unwrap().len(), 3);
}

#[test]
fn enumerator_count_is_bounded() {
    use crate::types::{Enumerator, TypeData};

    let mut d = dict();
    let e = d.add_enum(Root, "big").unwrap();
    // fill all but the last slot directly; the duplicate scan in the
    // builder is quadratic and only the boundary is interesting here
    if let Some(TypeData::Enum(enumerators)) =
        d.types.get_mut(&e).map(|type_def| &mut type_def.data)
    {
        for value in 0..info::MAX_VLEN - 1 {
            enumerators.push(Enumerator {
                name: format!("E{value}"),
                value: value as i32,
            });
        }
    }
    d.add_enumerator(e, "LAST", -1).unwrap();
    assert!(matches!(
        d.add_enumerator(e, "OVERFLOW", -1),
        Err(CtfError::DtFull)
    ));
}

#[test]
fn function_padding_keeps_odd_and_even_argc_aligned() {
    let serialized_len = |argc: usize| {
        let mut d = dict();
        let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
        let args = vec![int_id; argc];
        d.add_function(NonRoot, int_id, &args, false).unwrap();
        d.update().unwrap();
        d.view().unwrap().as_bytes().len()
    };
    // one argument plus its padding word is as long as two arguments
    assert_eq!(serialized_len(1), serialized_len(2));
    assert_eq!(serialized_len(3) - serialized_len(2), 8);
}

#[test]
fn function_round_trip() {
    let mut d = dict();
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    let f = d.add_function(NonRoot, int_id, &[int_id, int_id], true).unwrap();
    d.update().unwrap();

    let back = reopen(&d);
    let func = back.func_info(f).unwrap().unwrap();
    assert_eq!(func.ret, int_id);
    assert_eq!(func.args, vec![int_id, int_id]);
    assert!(func.varargs);
    assert_eq!(back.type_size(f).unwrap(), 0);
}

#[test]
fn array_round_trip() {
    let mut d = dict();
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    let info = ArrayInfo {
        contents: int_id,
        index: int_id,
        nelems: 10,
    };
    let a = d.add_array(NonRoot, info).unwrap();
    assert_eq!(d.type_size(a).unwrap(), 40);
    d.update().unwrap();

    let back = reopen(&d);
    assert_eq!(back.array_info(a).unwrap(), Some(info));
    assert_eq!(back.type_size(a).unwrap(), 40);
}

#[test]
fn qualifiers_resolve_to_the_underlying_type() {
    let mut d = dict();
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    let td = d.add_typedef(Root, "myint", int_id).unwrap();
    let cn = d.add_const(NonRoot, td).unwrap();
    let vl = d.add_volatile(NonRoot, cn).unwrap();

    assert_eq!(d.type_resolve(vl).unwrap(), int_id);
    assert_eq!(d.type_size(vl).unwrap(), 4);
    assert_eq!(d.type_encoding(vl).unwrap(), Some(signed(32)));
    assert_eq!(d.type_reference(vl).unwrap(), Some(cn));
    assert_eq!(d.type_reference(int_id).unwrap(), None);
}

fn struct_sized_exactly(target: u64) -> CtfDict {
    let mut d = dict();
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    let s = d.add_struct(Root, "S").unwrap();
    d.add_member_offset(s, Some("m"), int_id, Some((target - 4) * 8))
        .unwrap();
    assert_eq!(d.type_size(s).unwrap(), target);
    d.update().unwrap();
    d
}

#[test]
fn member_encoding_switches_at_the_long_struct_threshold() {
    let short = struct_sized_exactly(limit::LSTRUCT_THRESH - 1);
    let long = struct_sized_exactly(limit::LSTRUCT_THRESH);
    let short_len = short.view().unwrap().as_bytes().len();
    let long_len = long.view().unwrap().as_bytes().len();
    // one member grows by the extra offset word
    assert_eq!(long_len, short_len + 4);

    let back = reopen(&long);
    assert_eq!(back.type_size(id(2)).unwrap(), limit::LSTRUCT_THRESH);
    assert_eq!(
        back.member_info(id(2), "m").unwrap(),
        Some((id(1), (limit::LSTRUCT_THRESH - 4) * 8))
    );
}

#[test]
fn huge_struct_uses_the_long_size_words() {
    let target = u64::from(limit::MAX_SIZE) + 6;
    let d = struct_sized_exactly(target);
    let back = reopen(&d);
    assert_eq!(back.type_size(id(2)).unwrap(), target);
    assert_eq!(
        back.member_info(id(2), "m").unwrap(),
        Some((id(1), (target - 4) * 8))
    );
}

#[test]
fn variables_are_sorted_by_name_in_the_buffer() {
    let mut d = dict();
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    d.add_variable("zeta", int_id).unwrap();
    d.add_variable("alpha", int_id).unwrap();
    assert!(matches!(
        d.add_variable("zeta", int_id),
        Err(CtfError::Duplicate(_))
    ));
    assert!(matches!(
        d.add_variable("ghost", id(99)),
        Err(CtfError::BadId(_))
    ));
    d.update().unwrap();

    let view = d.view().unwrap();
    assert_eq!(view.header().typeoff, 16);
    let names: Vec<&str> = view
        .variables()
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(names, ["alpha", "zeta"]);
    assert_eq!(d.lookup_variable("zeta"), Some(int_id));
    assert_eq!(d.lookup_variable("nope"), None);
}

#[test]
fn snapshot_rollback_restores_the_serialized_image() {
    let base = |d: &mut CtfDict| {
        let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
        let s = d.add_struct(Root, "S").unwrap();
        d.add_member(s, Some("a"), int_id).unwrap();
        d.add_member(s, Some("b"), int_id).unwrap();
        int_id
    };

    let mut want = dict();
    base(&mut want);
    want.update().unwrap();

    let mut d = dict();
    let int_id = base(&mut d);
    let growth = d.str_growth;
    let snap = d.snapshot();
    d.add_struct(Root, "A").unwrap();
    d.add_struct(Root, "B").unwrap();
    d.add_variable("tmp", int_id).unwrap();
    d.rollback(snap).unwrap();

    assert_eq!(d.str_growth, growth);
    assert!(d.types.keys().all(|type_id| type_id.index() <= 2));
    assert!(d.vars.is_empty());
    d.update().unwrap();
    assert_eq!(
        d.view().unwrap().as_bytes(),
        want.view().unwrap().as_bytes()
    );
}

#[test]
fn rollback_cannot_cross_an_update() {
    let mut d = dict();
    let snap = d.snapshot();
    d.add_integer(Root, "int", signed(32)).unwrap();
    d.update().unwrap();
    assert!(matches!(d.rollback(snap), Err(CtfError::OverRollback)));

    let snap = d.snapshot();
    d.add_struct(Root, "S").unwrap();
    d.rollback(snap).unwrap();
    assert_eq!(d.types.len(), 1);
}

#[test]
fn discard_drops_uncommitted_types() {
    let mut d = dict();
    d.add_integer(Root, "int", signed(32)).unwrap();
    d.update().unwrap();
    d.add_struct(Root, "S").unwrap();
    d.add_struct(Root, "T").unwrap();
    d.discard().unwrap();

    assert_eq!(d.types.len(), 1);
    assert_eq!(d.next_id, 2);
    assert!(matches!(d.type_kind(id(2)), Err(CtfError::BadId(_))));
    // the id space is not reused after a discard either
    let s = d.add_struct(Root, "S2").unwrap();
    assert_eq!(s, id(2));
}

#[test]
fn string_growth_tracks_live_names() {
    let mut d = dict();
    assert_eq!(d.str_growth, 1);
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    let s = d.add_struct(Root, "S").unwrap();
    d.add_member(s, Some("a"), int_id).unwrap();
    // "\0" + "int\0" + "S\0" + "a\0"
    assert_eq!(d.str_growth, 1 + 4 + 2 + 2);

    let snap = d.snapshot();
    let e = d.add_enum(Root, "E").unwrap();
    d.add_enumerator(e, "RED", 0).unwrap();
    d.add_variable("v", int_id).unwrap();
    assert_eq!(d.str_growth, 9 + 2 + 4 + 2);
    d.rollback(snap).unwrap();
    assert_eq!(d.str_growth, 9);
}

#[test]
fn every_kind_survives_a_round_trip() {
    let mut d = dict();
    let int_id = d.add_integer(Root, "int", signed(32)).unwrap();
    let float_id = d
        .add_float(Root, "double", Encoding::new(crate::flag::fp_fmt::DOUBLE, 0, 64))
        .unwrap();
    let ptr = d.add_pointer(NonRoot, int_id).unwrap();
    let arr = d
        .add_array(
            NonRoot,
            ArrayInfo {
                contents: int_id,
                index: int_id,
                nelems: 4,
            },
        )
        .unwrap();
    let func = d.add_function(NonRoot, int_id, &[ptr, arr], false).unwrap();
    let s = d.add_struct(Root, "S").unwrap();
    d.add_member(s, Some("i"), int_id).unwrap();
    d.add_member(s, None, float_id).unwrap();
    let u = d.add_union(Root, "U").unwrap();
    d.add_member(u, Some("p"), ptr).unwrap();
    let e = d.add_enum(Root, "E").unwrap();
    d.add_enumerator(e, "A", -3).unwrap();
    let fwd = d.add_forward(Root, "opaque", Kind::Union).unwrap();
    let td = d.add_typedef(Root, "myint", int_id).unwrap();
    let cn = d.add_const(NonRoot, td).unwrap();
    let vl = d.add_volatile(NonRoot, cn).unwrap();
    let rs = d.add_restrict(NonRoot, ptr).unwrap();
    d.add_variable("v", td).unwrap();
    d.update().unwrap();

    let back = reopen(&d);
    for type_id in [
        int_id, float_id, ptr, arr, func, s, u, e, fwd, td, cn, vl, rs,
    ] {
        assert_eq!(
            back.lookup_type(type_id).unwrap(),
            d.types.get(&type_id).unwrap(),
            "type {type_id} changed across serialization"
        );
    }
    assert_eq!(back.lookup_variable("v"), Some(td));
}

#[test]
fn reopened_containers_reject_mutation() {
    let mut d = dict();
    d.add_integer(Root, "int", signed(32)).unwrap();
    d.update().unwrap();

    let mut back = reopen(&d);
    assert!(matches!(
        back.add_integer(Root, "other", signed(8)),
        Err(CtfError::ReadOnly)
    ));
    assert!(matches!(back.discard(), Err(CtfError::OverRollback) | Ok(())));
}

#[test]
fn corrupt_buffers_are_rejected() {
    assert!(matches!(
        CtfDict::open(vec![0; 8]),
        Err(CtfError::Corrupt(_))
    ));
    let mut d = dict();
    d.add_integer(Root, "int", signed(32)).unwrap();
    d.update().unwrap();
    let mut bytes = d.view().unwrap().as_bytes().to_vec();
    // flip the magic
    bytes[0] ^= 0xff;
    assert!(matches!(
        CtfDict::open(bytes.clone()),
        Err(CtfError::Corrupt(_))
    ));
    bytes[0] ^= 0xff;
    bytes.truncate(bytes.len() - 1);
    assert!(matches!(CtfDict::open(bytes), Err(CtfError::Corrupt(_))));
}

#[test]
fn id_space_is_bounded() {
    let mut d = dict();
    d.next_id = limit::MAX_TYPE + 1;
    assert!(matches!(
        d.add_integer(Root, "int", signed(32)),
        Err(CtfError::Full)
    ));

    let mut child = CtfDict::create_child(CtfModel::Lp64, "parent");
    child.next_id = limit::MAX_PTYPE + 1;
    assert!(matches!(
        child.add_integer(Root, "int", signed(32)),
        Err(CtfError::Full)
    ));
}

#[test]
fn child_containers_mark_their_ids_and_parent() {
    let mut child = CtfDict::create_child(CtfModel::Lp64, "parent_dict");
    let int_id = child.add_integer(Root, "int", signed(32)).unwrap();
    assert!(int_id.is_child());
    assert_eq!(int_id.index(), 1);
    child.update().unwrap();

    let view = child.view().unwrap();
    assert_eq!(view.header().parname, 1);
    // "\0" + "parent_dict\0" + "int\0"
    assert_eq!(view.header().strlen, 1 + 12 + 4);
    assert_eq!(view.parent_name(), Some("parent_dict"));

    let back = reopen(&child);
    assert!(back.is_child());
    assert_eq!(back.type_kind(int_id).unwrap(), Kind::Integer);
    assert_eq!(back.parent_name(), Some("parent_dict"));
}

// -- cross-container import ----------------------------------------------

#[test]
fn import_deduplicates_compatible_integers() {
    let mut dst = dict();
    let existing = dst.add_integer(Root, "int", signed(32)).unwrap();
    dst.update().unwrap();

    let mut src = dict();
    let src_int = src.add_integer(Root, "int", signed(32)).unwrap();
    let got = dst.add_type(&src, src_int).unwrap();
    assert_eq!(got, existing);
    assert_eq!(dst.types.len(), 1);
}

#[test]
fn import_conflicts_on_incompatible_integers() {
    let mut dst = dict();
    dst.add_integer(Root, "int", signed(32)).unwrap();
    dst.update().unwrap();
    // a conflicting pending redefinition is allowed by the builder
    dst.add_integer(Root, "int", signed(16)).unwrap();

    let mut src = dict();
    let src_int = src.add_integer(Root, "int", signed(16)).unwrap();
    assert!(matches!(
        dst.add_type(&src, src_int),
        Err(CtfError::Conflict(_))
    ));
}

#[test]
fn import_conflicts_on_kind_mismatch() {
    // typedefs and integers share the catch-all name index
    let mut dst = dict();
    let int_id = dst.add_integer(Root, "int", signed(32)).unwrap();
    dst.add_typedef(Root, "counter", int_id).unwrap();
    dst.update().unwrap();

    let mut src = dict();
    let src_int = src.add_integer(Root, "counter", signed(32)).unwrap();
    assert!(matches!(
        dst.add_type(&src, src_int),
        Err(CtfError::Conflict(_))
    ));

    // tag kinds keep separate namespaces: a struct never collides with
    // an enum of the same name
    let mut other = dict();
    let e = other.add_enum(Root, "tag").unwrap();
    other.add_enumerator(e, "A", 0).unwrap();
    let mut src = dict();
    let s = src.add_struct(Root, "tag").unwrap();
    let src_int = src.add_integer(Root, "int", signed(32)).unwrap();
    src.add_member(s, Some("a"), src_int).unwrap();
    let imported = other.add_type(&src, s).unwrap();
    assert_eq!(other.type_kind(imported).unwrap(), Kind::Struct);
}

#[test]
fn import_of_a_cyclic_struct_terminates() {
    let mut src = dict();
    let node = src.add_struct(Root, "node").unwrap();
    let int_id = src.add_integer(Root, "int", signed(32)).unwrap();
    let ptr = src.add_pointer(NonRoot, node).unwrap();
    src.add_member(node, Some("next"), ptr).unwrap();
    src.add_member(node, Some("v"), int_id).unwrap();

    let mut dst = dict();
    let imported = dst.add_type(&src, node).unwrap();
    let (next_ty, next_off) =
        dst.member_info(imported, "next").unwrap().unwrap();
    assert_eq!(next_off, 0);
    assert_eq!(dst.type_kind(next_ty).unwrap(), Kind::Pointer);
    // the pointer resolves back to the imported struct itself
    assert_eq!(dst.type_reference(next_ty).unwrap(), Some(imported));

    // importing again finds the existing definition and adds nothing
    let count = dst.types.len();
    assert_eq!(dst.add_type(&src, node).unwrap(), imported);
    assert_eq!(dst.types.len(), count);
}

#[test]
fn import_rebuilds_function_argument_vectors() {
    let mut src = dict();
    let int_id = src.add_integer(Root, "int", signed(32)).unwrap();
    let func = src
        .add_function(NonRoot, int_id, &[int_id, int_id], true)
        .unwrap();

    let mut dst = dict();
    let imported = dst.add_type(&src, func).unwrap();
    let info = dst.func_info(imported).unwrap().unwrap();
    assert_eq!(info.args.len(), 2);
    assert!(info.varargs);
    assert_eq!(dst.type_kind(info.ret).unwrap(), Kind::Integer);
    assert_eq!(dst.type_encoding(info.args[0]).unwrap(), Some(signed(32)));
}

#[test]
fn import_resolves_forwards_in_the_destination() {
    let mut src = dict();
    let s = src.add_struct(Root, "S").unwrap();
    let int_id = src.add_integer(Root, "int", signed(32)).unwrap();
    src.add_member(s, Some("a"), int_id).unwrap();

    let mut dst = dict();
    let fwd = dst.add_forward(Root, "S", Kind::Struct).unwrap();
    let imported = dst.add_type(&src, s).unwrap();
    assert_eq!(imported, fwd);
    assert_eq!(dst.type_kind(fwd).unwrap(), Kind::Struct);
    assert_eq!(dst.member_info(fwd, "a").unwrap().map(|(_, off)| off), Some(0));
}

#[test]
fn import_materializes_source_forwards() {
    let mut src = dict();
    let fwd = src.add_forward(Root, "opaque", Kind::Union).unwrap();

    let mut dst = dict();
    let imported = dst.add_type(&src, fwd).unwrap();
    assert_eq!(dst.type_kind(imported).unwrap(), Kind::Forward);
}

#[test]
fn import_compares_struct_layouts() {
    let build_src = |offset| {
        let mut src = dict();
        let s = src.add_struct(Root, "S").unwrap();
        let int_id = src.add_integer(Root, "int", signed(32)).unwrap();
        src.add_member_offset(s, Some("a"), int_id, Some(offset)).unwrap();
        (src, s)
    };

    let mut dst = dict();
    let (src, s) = build_src(0);
    let first = dst.add_type(&src, s).unwrap();
    dst.update().unwrap();

    // identical layout: the committed definition is reused
    let (src, s) = build_src(0);
    assert_eq!(dst.add_type(&src, s).unwrap(), first);

    // different member offset: conflict
    let (src, s) = build_src(32);
    assert!(matches!(dst.add_type(&src, s), Err(CtfError::Conflict(_))));
}

#[test]
fn import_compares_enumerators_both_ways() {
    let build_src = |pairs: &[(&str, i32)]| {
        let mut src = dict();
        let e = src.add_enum(Root, "E").unwrap();
        for (name, value) in pairs {
            src.add_enumerator(e, name, *value).unwrap();
        }
        (src, e)
    };

    let mut dst = dict();
    let (src, e) = build_src(&[("A", 1), ("B", 2)]);
    let first = dst.add_type(&src, e).unwrap();
    dst.update().unwrap();

    let (src, e) = build_src(&[("A", 1), ("B", 2)]);
    assert_eq!(dst.add_type(&src, e).unwrap(), first);

    // value mismatch
    let (src, e) = build_src(&[("A", 1), ("B", 3)]);
    assert!(matches!(dst.add_type(&src, e), Err(CtfError::Conflict(_))));

    // missing enumerator on the source side
    let (src, e) = build_src(&[("A", 1)]);
    assert!(matches!(dst.add_type(&src, e), Err(CtfError::Conflict(_))));
}

#[test]
fn import_verifies_array_shapes() {
    let build_src = |nelems| {
        let mut src = dict();
        let int_id = src.add_integer(Root, "int", signed(32)).unwrap();
        let arr = src
            .add_array(
                Root,
                ArrayInfo {
                    contents: int_id,
                    index: int_id,
                    nelems,
                },
            )
            .unwrap();
        // arrays are anonymous; reach them through a named typedef
        let td = src.add_typedef(Root, "vec", arr).unwrap();
        (src, td)
    };

    let mut dst = dict();
    let (src, td) = build_src(4);
    let imported = dst.add_type(&src, td).unwrap();
    let arr = dst.type_reference(imported).unwrap().unwrap();
    assert_eq!(
        dst.array_info(arr).unwrap().map(|info| info.nelems),
        Some(4)
    );
    // a pending typedef of the same name satisfies a repeat import
    assert_eq!(dst.add_type(&src, td).unwrap(), imported);
}
