//! Element type codes used in type signatures.

#[allow(non_snake_case)]
#[allow(missing_docs)]
/// ECMA-335 element types plus the `ZAPSIG` extensions understood by the runtime loader
pub mod ELEMENT_TYPE {
    //Marks end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDef or TypeRef token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDef or TypeRef token
    pub const CLASS: u8 = 0x12;
    // Generic parameter in a generic type definition, represented as number
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    // Generic type instantiation. Followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    // System.Object
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Generic parameter in a generic method definition,represented as number
    pub const MVAR: u8 = 0x1e;
    // Required modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_REQD: u8 = 0x1f;
    // Optional modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_OPT: u8 = 0x20;
    // Shared generic placeholder (__Canon)
    pub const CANON_ZAPSIG: u8 = 0x3e;
    // Followed by a module index, then a type in that module
    pub const MODULE_ZAPSIG: u8 = 0x3f;
    pub const MODIFIER: u8 = 0x40;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zapsig_extensions_do_not_collide() {
        let standard = [
            ELEMENT_TYPE::VOID,
            ELEMENT_TYPE::STRING,
            ELEMENT_TYPE::CLASS,
            ELEMENT_TYPE::GENERICINST,
            ELEMENT_TYPE::SZARRAY,
            ELEMENT_TYPE::MVAR,
            ELEMENT_TYPE::CMOD_OPT,
            ELEMENT_TYPE::MODIFIER,
        ];
        assert!(!standard.contains(&ELEMENT_TYPE::CANON_ZAPSIG));
        assert!(!standard.contains(&ELEMENT_TYPE::MODULE_ZAPSIG));
        assert_eq!(ELEMENT_TYPE::MODULE_ZAPSIG, 0x3f);
    }
}
