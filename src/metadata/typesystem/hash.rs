//! Version-resilient hash codes for types and methods.
//!
//! The lookup tables of an image are keyed by these hashes, and the runtime recomputes
//! them from its own view of the type to find an entry. The functions therefore only
//! use properties that survive recompilation of the defining assembly: namespace and
//! name, nesting, instantiation arguments, array rank and pointer/byref wrapping.
//! Tokens and addresses never contribute. Every function here is part of the image
//! format and must stay bit-for-bit identical to the runtime's implementation.
//!
//! Names are hashed as UTF-8 bytes by two interleaved accumulators:
//!
//! ```text
//! hash1 = 0x6DA3B944, hash2 = 0
//! for each byte pair (a, b):  hash1 = (hash1 + rotl(hash1, 5)) ^ a
//!                             hash2 = (hash2 + rotl(hash2, 5)) ^ b
//! hash1 += rotl(hash1, 8); hash2 += rotl(hash2, 8)
//! return hash1 ^ hash2
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use readytorun::metadata::typesystem::hash::name_hash_code;
//!
//! assert_eq!(name_hash_code("System.String") as u32, 0xb74f_3361);
//! ```

use crate::metadata::typesystem::{GenericParameterKind, MethodDesc, TypeDesc};

/// Hash of an `Array`1`-shaped type before the rank is added
const ARRAY_HASH_SEED: u32 = 0xd531_3556;
const POINTER_HASH_TAG: i32 = 0x12D0;
const BYREF_HASH_TAG: i32 = 0x4C85;

#[inline]
fn rotl(value: i32, shift: u32) -> i32 {
    value.rotate_left(shift)
}

/// Hashes a single name string.
#[must_use]
pub fn name_hash_code(name: &str) -> i32 {
    let bytes = name.as_bytes();
    let mut hash1: i32 = 0x6DA3_B944;
    let mut hash2: i32 = 0;

    let mut i = 0;
    while i < bytes.len() {
        hash1 = hash1.wrapping_add(rotl(hash1, 5)) ^ i32::from(bytes[i]);
        if i + 1 < bytes.len() {
            hash2 = hash2.wrapping_add(rotl(hash2, 5)) ^ i32::from(bytes[i + 1]);
        } else {
            break;
        }
        i += 2;
    }

    hash1 = hash1.wrapping_add(rotl(hash1, 8));
    hash2 = hash2.wrapping_add(rotl(hash2, 8));
    hash1 ^ hash2
}

/// Hashes a namespace and a name separately and combines them.
///
/// The empty namespace still contributes the hash of the empty string.
#[must_use]
pub fn namespace_name_hash_code(namespace: &str, name: &str) -> i32 {
    name_hash_code(namespace) ^ name_hash_code(name)
}

/// Folds a nested type's name hash into its enclosing type's hash
#[must_use]
pub fn nested_type_hash_code(enclosing_hash: i32, name_hash: i32) -> i32 {
    enclosing_hash.wrapping_add(rotl(enclosing_hash, 11)) ^ name_hash
}

/// Folds instantiation argument hashes into a generic definition's hash
#[must_use]
pub fn generic_instance_hash_code(definition_hash: i32, argument_hashes: impl IntoIterator<Item = i32>) -> i32 {
    let mut hash = definition_hash;
    for argument_hash in argument_hashes {
        hash = hash.wrapping_add(rotl(hash, 13)) ^ argument_hash;
    }
    hash.wrapping_add(rotl(hash, 15))
}

/// Hash of an array type; single-dimensional arrays use rank 1
#[must_use]
pub fn array_type_hash_code(element_hash: i32, rank: u32) -> i32 {
    let mut hash = ARRAY_HASH_SEED.wrapping_add(rank) as i32;
    hash = hash.wrapping_add(rotl(hash, 13)) ^ element_hash;
    hash.wrapping_add(rotl(hash, 15))
}

/// Hash of an unmanaged pointer type
#[must_use]
pub fn pointer_type_hash_code(pointee_hash: i32) -> i32 {
    pointee_hash.wrapping_add(rotl(pointee_hash, 5)) ^ POINTER_HASH_TAG
}

/// Hash of a managed reference type
#[must_use]
pub fn byref_type_hash_code(target_hash: i32) -> i32 {
    target_hash.wrapping_add(rotl(target_hash, 7)) ^ BYREF_HASH_TAG
}

/// Computes the version-resilient hash of `ty`.
#[must_use]
pub fn type_hash_code(ty: &TypeDesc) -> i32 {
    match ty {
        TypeDesc::Definition(def) => {
            let name_hash = namespace_name_hash_code(&def.namespace, &def.name);
            match &def.enclosing {
                Some(enclosing) => nested_type_hash_code(type_hash_code(enclosing), name_hash),
                None => name_hash,
            }
        }
        TypeDesc::Instantiated(inst) => generic_instance_hash_code(
            type_hash_code(&TypeDesc::Definition(inst.definition.clone())),
            inst.args.iter().map(type_hash_code),
        ),
        TypeDesc::SzArray(elem) => array_type_hash_code(type_hash_code(elem), 1),
        TypeDesc::Array { element, rank } => array_type_hash_code(type_hash_code(element), *rank),
        TypeDesc::Pointer(elem) => pointer_type_hash_code(type_hash_code(elem)),
        TypeDesc::ByRef(elem) => byref_type_hash_code(type_hash_code(elem)),
        TypeDesc::GenericParameter { kind, index } => {
            let prefix = match kind {
                GenericParameterKind::Type => "!",
                GenericParameterKind::Method => "!!",
            };
            name_hash_code(&format!("{prefix}{index}"))
        }
        TypeDesc::Canon => namespace_name_hash_code("System", "__Canon"),
    }
}

/// Computes the version-resilient hash of `method`.
///
/// The owning type's hash is combined with the method name; method instantiation
/// arguments are folded into the name hash first.
#[must_use]
pub fn method_hash_code(method: &MethodDesc) -> i32 {
    let owner_hash = type_hash_code(method.owning_type());
    let name_hash = name_hash_code(method.name());
    let member_hash = if method.has_instantiation() {
        generic_instance_hash_code(name_hash, method.instantiation().iter().map(type_hash_code))
    } else {
        name_hash
    };
    owner_hash ^ member_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        token::ModuleId,
        typesystem::{MethodAttributes, ModuleDesc, TypeKind, ELEMENT_TYPE},
    };

    #[test]
    fn name_hash_pinned_values() {
        assert_eq!(name_hash_code("System.String") as u32, 0xb74f_3361);
        assert_eq!(name_hash_code("") as u32, 0x115c_fdb1);
        assert_eq!(name_hash_code("a") as u32, 0x3cfc_91d2);
        assert_eq!(name_hash_code("ab") as u32, 0x3cfc_f3b0);
    }

    #[test]
    fn array_seed_matches_array_definition_name() {
        assert_eq!(
            ARRAY_HASH_SEED.wrapping_add(1) as i32,
            name_hash_code("System.Array`1")
        );
    }

    #[test]
    fn type_hash_uses_namespace_and_name() {
        let mut module = ModuleDesc::new(ModuleId(3), "Lib");
        let string = module.define_primitive("System", "String", TypeKind::Class, ELEMENT_TYPE::STRING);
        assert_eq!(type_hash_code(&string) as u32, 0x03eb_ebe0);

        // tokens and modules do not participate
        let mut other = ModuleDesc::new(ModuleId(9), "Other");
        other.define_type("X", "Filler", TypeKind::Class);
        let string2 = other.define_primitive("System", "String", TypeKind::Class, ELEMENT_TYPE::STRING);
        assert_eq!(type_hash_code(&string), type_hash_code(&string2));
    }

    #[test]
    fn generic_instantiations_differ_by_argument() {
        let mut module = ModuleDesc::new(ModuleId(0), "CoreLib");
        let string = module.define_primitive("System", "String", TypeKind::Class, ELEMENT_TYPE::STRING);
        let int32 = module.define_primitive("System", "Int32", TypeKind::ValueType, ELEMENT_TYPE::I4);
        let list = module.define_generic_type("System.Collections.Generic", "List`1", TypeKind::Class, 1);

        let list_int = list.instantiate(vec![int32.clone()]).unwrap();
        let list_string = list.instantiate(vec![string.clone()]).unwrap();
        assert_ne!(type_hash_code(&list_int), type_hash_code(&list_string));

        let base = namespace_name_hash_code("System.Collections.Generic", "List`1");
        assert_eq!(type_hash_code(&list), base);
        assert_eq!(
            type_hash_code(&list_int),
            generic_instance_hash_code(base, [type_hash_code(&int32)])
        );
        assert_eq!(
            type_hash_code(&list_string),
            generic_instance_hash_code(base, [type_hash_code(&string)])
        );
    }

    #[test]
    fn nested_and_parameterized_types() {
        let mut module = ModuleDesc::new(ModuleId(0), "Lib");
        let outer = module.define_type("N", "Outer", TypeKind::Class);
        let inner = module.define_nested_type(&outer, "Inner", TypeKind::Class);
        assert_eq!(
            type_hash_code(&inner),
            nested_type_hash_code(type_hash_code(&outer), namespace_name_hash_code("", "Inner"))
        );

        let h = type_hash_code(&outer);
        assert_eq!(type_hash_code(&outer.make_sz_array()), array_type_hash_code(h, 1));
        assert_ne!(
            type_hash_code(&outer.make_sz_array()),
            type_hash_code(&outer.make_array(2))
        );
        assert_eq!(type_hash_code(&outer.make_pointer()), pointer_type_hash_code(h));
        assert_eq!(type_hash_code(&outer.make_byref()), byref_type_hash_code(h));
        assert_ne!(
            type_hash_code(&outer.make_pointer()),
            type_hash_code(&outer.make_byref())
        );
    }

    #[test]
    fn method_hash_combines_owner_and_name() {
        let mut module = ModuleDesc::new(ModuleId(0), "Lib");
        let int32 = module.define_primitive("System", "Int32", TypeKind::ValueType, ELEMENT_TYPE::I4);
        let program = module.define_type("App", "Program", TypeKind::Class);
        let main = module.define_method(&program, "Main", MethodAttributes::STATIC);
        assert_eq!(
            method_hash_code(&main),
            type_hash_code(&program) ^ name_hash_code("Main")
        );

        let generic = module.define_generic_method(&program, "Echo", MethodAttributes::STATIC, 1);
        let echo_int = generic.instantiate(vec![int32.clone()]).unwrap();
        assert_eq!(
            method_hash_code(&echo_int),
            type_hash_code(&program)
                ^ generic_instance_hash_code(name_hash_code("Echo"), [type_hash_code(&int32)])
        );
        assert_ne!(method_hash_code(&echo_int), method_hash_code(&generic));
    }
}
