//! Signature encoding for fixups.
//!
//! Fixup signatures reuse the ECMA-335 compressed integer and type signature encodings
//! with a few extensions understood by the runtime loader:
//!
//! - `MODULE_ZAPSIG` switches token resolution to another module for the following type
//! - `CANON_ZAPSIG` stands for the `__Canon` placeholder of shared generic code
//! - method signatures start with a flags value ([`MethodSigFlags`]) instead of a calling
//!   convention, followed by a bare row id
//!
//! Every signature is encoded relative to a [`SignatureContext`], the module whose
//! metadata the tokens refer to.

use crate::{
    metadata::{
        token::{ModuleId, Token, TokenType},
        typesystem::{FieldDesc, MethodDesc, TypeDesc, ELEMENT_TYPE},
    },
    readytorun::constants::{FieldSigFlags, FixupKind, MethodSigFlags, FIXUP_MODULE_OVERRIDE},
    Error, Result,
};

const SIGN_MASK_ONEBYTE: u32 = 0xffff_ffc0;
const SIGN_MASK_TWOBYTE: u32 = 0xffff_e000;
const SIGN_MASK_FOURBYTE: u32 = 0xf000_0000;

/// Largest row id that fits a `TypeDefOrRef` coded token
const MAX_CODED_RID: u32 = 0x03FF_FFFF;

/// Module tokens of a signature are resolved against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SignatureContext {
    /// The module whose metadata tokens refer to
    pub module: ModuleId,
}

impl SignatureContext {
    /// Creates a context resolving tokens in `module`
    #[must_use]
    pub const fn new(module: ModuleId) -> Self {
        SignatureContext { module }
    }

    /// Index written after a module override referring to `module`
    #[must_use]
    pub const fn module_index(module: ModuleId) -> u32 {
        module.0
    }
}

/// Byte buffer with the signature encodings.
///
/// # Examples
///
/// ```rust
/// use readytorun::readytorun::SignatureBuilder;
///
/// let mut builder = SignatureBuilder::new();
/// builder.emit_uint(0x7F)?;
/// builder.emit_uint(0x80)?;
/// builder.emit_int(-1)?;
/// assert_eq!(builder.into_bytes(), vec![0x7F, 0x80, 0x80, 0x7F]);
/// # Ok::<(), readytorun::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct SignatureBuilder {
    data: Vec<u8>,
}

impl SignatureBuilder {
    /// Creates an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Finishes the signature
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Appends a single byte
    pub fn emit_byte(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Appends raw bytes
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends an ECMA-335 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for values above `0x1FFFFFFF`.
    pub fn emit_uint(&mut self, value: u32) -> Result<()> {
        if value <= 0x7F {
            self.data.push(value as u8);
        } else if value <= 0x3FFF {
            self.data.push(((value >> 8) | 0x80) as u8);
            self.data.push((value & 0xFF) as u8);
        } else if value <= 0x1FFF_FFFF {
            self.data.push(((value >> 24) | 0xC0) as u8);
            self.data.push(((value >> 16) & 0xFF) as u8);
            self.data.push(((value >> 8) & 0xFF) as u8);
            self.data.push((value & 0xFF) as u8);
        } else {
            return Err(malformed_error!(
                "value 0x{:08X} does not fit a compressed integer",
                value
            ));
        }
        Ok(())
    }

    /// Appends an ECMA-335 compressed signed integer.
    ///
    /// The value is rotated so the sign ends up in the low bit, then written with the
    /// smallest encoding that preserves it.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for values outside the 29-bit signed range.
    pub fn emit_int(&mut self, value: i32) -> Result<()> {
        let sign = u32::from(value < 0);
        let udata = value as u32;

        if udata & SIGN_MASK_ONEBYTE == 0 || udata & SIGN_MASK_ONEBYTE == SIGN_MASK_ONEBYTE {
            let encoded = ((udata & !SIGN_MASK_ONEBYTE) << 1) | sign;
            self.data.push(encoded as u8);
        } else if udata & SIGN_MASK_TWOBYTE == 0 || udata & SIGN_MASK_TWOBYTE == SIGN_MASK_TWOBYTE {
            let encoded = ((udata & !SIGN_MASK_TWOBYTE) << 1) | sign;
            self.data.push(((encoded >> 8) | 0x80) as u8);
            self.data.push((encoded & 0xFF) as u8);
        } else if udata & SIGN_MASK_FOURBYTE == 0 || udata & SIGN_MASK_FOURBYTE == SIGN_MASK_FOURBYTE {
            let encoded = ((udata & !SIGN_MASK_FOURBYTE) << 1) | sign;
            self.data.push(((encoded >> 24) | 0xC0) as u8);
            self.data.push(((encoded >> 16) & 0xFF) as u8);
            self.data.push(((encoded >> 8) & 0xFF) as u8);
            self.data.push((encoded & 0xFF) as u8);
        } else {
            return Err(malformed_error!(
                "value {} does not fit a compressed signed integer",
                value
            ));
        }
        Ok(())
    }

    /// Appends a `TypeDefOrRef` coded token: `rid << 2` tagged with the table.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for tokens of other tables or rids that do not fit.
    pub fn emit_token(&mut self, token: Token) -> Result<()> {
        let rid = token.rid();
        if rid > MAX_CODED_RID {
            return Err(malformed_error!("rid of token {} is too large to encode", token));
        }

        let tag = match token.token_type() {
            Some(TokenType::TypeDef) => 0,
            Some(TokenType::TypeRef) => 1,
            Some(TokenType::TypeSpec) => 2,
            _ => return Err(malformed_error!("token {} is not a TypeDefOrRef token", token)),
        };
        self.emit_uint((rid << 2) | tag)
    }

    /// Appends the fixup kind byte, with a module override when `target_module` differs
    /// from the context's module.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the module index does not fit.
    pub fn emit_fixup(
        &mut self,
        kind: FixupKind,
        target_module: Option<ModuleId>,
        context: SignatureContext,
    ) -> Result<()> {
        match target_module {
            Some(module) if module != context.module => {
                self.data.push(kind.value() | FIXUP_MODULE_OVERRIDE);
                self.emit_uint(SignatureContext::module_index(module))
            }
            _ => {
                self.data.push(kind.value());
                Ok(())
            }
        }
    }

    fn emit_module_override(&mut self, module: ModuleId, context: SignatureContext) -> Result<()> {
        if module != context.module {
            self.data.push(ELEMENT_TYPE::MODULE_ZAPSIG);
            self.emit_uint(SignatureContext::module_index(module))?;
        }
        Ok(())
    }

    /// Appends the signature of `ty`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if a token or count cannot be encoded.
    pub fn emit_type_signature(&mut self, ty: &TypeDesc, context: SignatureContext) -> Result<()> {
        match ty {
            TypeDesc::Definition(def) => {
                if let Some(element_type) = def.element_type {
                    self.data.push(element_type);
                    return Ok(());
                }
                self.emit_module_override(def.module, context)?;
                self.data.push(ty.signature_element_type());
                self.emit_token(def.token)
            }
            TypeDesc::Instantiated(inst) => {
                self.data.push(ELEMENT_TYPE::GENERICINST);
                self.emit_type_signature(&ty.type_definition(), context)?;
                self.emit_uint(inst.args.len() as u32)?;
                for arg in &inst.args {
                    self.emit_type_signature(arg, context)?;
                }
                Ok(())
            }
            TypeDesc::SzArray(element) => {
                self.data.push(ELEMENT_TYPE::SZARRAY);
                self.emit_type_signature(element, context)
            }
            TypeDesc::Array { element, rank } => {
                self.data.push(ELEMENT_TYPE::ARRAY);
                self.emit_type_signature(element, context)?;
                self.emit_uint(*rank)?;
                if *rank != 0 {
                    // no sizes, no lower bounds
                    self.emit_uint(0)?;
                    self.emit_uint(0)?;
                }
                Ok(())
            }
            TypeDesc::Pointer(pointee) => {
                self.data.push(ELEMENT_TYPE::PTR);
                self.emit_type_signature(pointee, context)
            }
            TypeDesc::ByRef(target) => {
                self.data.push(ELEMENT_TYPE::BYREF);
                self.emit_type_signature(target, context)
            }
            TypeDesc::GenericParameter { index, .. } => {
                self.data.push(ty.signature_element_type());
                self.emit_uint(*index)
            }
            TypeDesc::Canon => {
                self.data.push(ELEMENT_TYPE::CANON_ZAPSIG);
                Ok(())
            }
        }
    }

    /// Appends a method signature: flags, optional owner type, row id, optional method
    /// instantiation and optional constraint type.
    ///
    /// # Errors
    /// Returns [`Error::NotImplemented`] for methods on array types and for tokens that are
    /// neither `MethodDef` nor `MemberRef`.
    pub fn emit_method_signature(
        &mut self,
        method: &MethodDesc,
        constrained: Option<&TypeDesc>,
        unboxing: bool,
        instantiating: bool,
        context: SignatureContext,
    ) -> Result<()> {
        let flags = method_signature_flags(method, constrained, unboxing, instantiating)?;

        self.emit_uint(flags.bits())?;
        if flags.contains(MethodSigFlags::OWNER_TYPE) {
            self.emit_type_signature(method.owning_type(), context)?;
        }
        self.emit_uint(method.token().rid())?;
        if flags.contains(MethodSigFlags::METHOD_INSTANTIATION) {
            self.emit_uint(method.instantiation().len() as u32)?;
            for arg in method.instantiation() {
                self.emit_type_signature(arg, context)?;
            }
        }
        if let Some(constrained) = constrained {
            self.emit_type_signature(constrained, context)?;
        }
        Ok(())
    }

    /// Appends a field signature: flags, optional owner type and row id.
    ///
    /// # Errors
    /// Returns [`Error::NotImplemented`] for tokens that are neither `FieldDef` nor
    /// `MemberRef`.
    pub fn emit_field_signature(&mut self, field: &FieldDesc, context: SignatureContext) -> Result<()> {
        let mut flags = FieldSigFlags::empty();
        match field.token().token_type() {
            Some(TokenType::FieldDef) => {}
            Some(TokenType::MemberRef) => flags |= FieldSigFlags::MEMBER_REF_TOKEN,
            _ => {
                return Err(Error::NotImplemented(format!(
                    "field token {} of '{}'",
                    field.token(),
                    field
                )))
            }
        }
        if field.owning_type().has_instantiation() {
            flags |= FieldSigFlags::OWNER_TYPE;
        }

        self.emit_uint(flags.bits())?;
        if flags.contains(FieldSigFlags::OWNER_TYPE) {
            self.emit_type_signature(field.owning_type(), context)?;
        }
        self.emit_uint(field.token().rid())
    }
}

/// Computes the flags prefix of a method signature.
///
/// # Errors
/// Returns [`Error::NotImplemented`] for methods on array types and for tokens that are
/// neither `MethodDef` nor `MemberRef`.
pub fn method_signature_flags(
    method: &MethodDesc,
    constrained: Option<&TypeDesc>,
    unboxing: bool,
    instantiating: bool,
) -> Result<MethodSigFlags> {
    if matches!(
        method.owning_type(),
        TypeDesc::SzArray(_) | TypeDesc::Array { .. }
    ) {
        return Err(Error::NotImplemented(format!("array method '{method}'")));
    }

    let mut flags = MethodSigFlags::empty();
    flags.set(MethodSigFlags::UNBOXING_STUB, unboxing);
    flags.set(MethodSigFlags::INSTANTIATING_STUB, instantiating);
    flags.set(MethodSigFlags::CONSTRAINED, constrained.is_some());
    flags.set(MethodSigFlags::OWNER_TYPE, method.owning_type().has_instantiation());
    flags.set(MethodSigFlags::METHOD_INSTANTIATION, method.has_instantiation());

    match method.token().token_type() {
        Some(TokenType::MethodDef) => {}
        Some(TokenType::MemberRef) => flags |= MethodSigFlags::MEMBER_REF_TOKEN,
        _ => {
            return Err(Error::NotImplemented(format!(
                "method token {} of '{}'",
                method.token(),
                method
            )))
        }
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::typesystem::{MethodAttributes, TypeKind},
        test::factories::corelib,
    };

    fn encode_uint(value: u32) -> Vec<u8> {
        let mut builder = SignatureBuilder::new();
        builder.emit_uint(value).unwrap();
        builder.into_bytes()
    }

    fn encode_int(value: i32) -> Vec<u8> {
        let mut builder = SignatureBuilder::new();
        builder.emit_int(value).unwrap();
        builder.into_bytes()
    }

    #[test]
    fn compressed_unsigned() {
        assert_eq!(encode_uint(0x03), vec![0x03]);
        assert_eq!(encode_uint(0x7F), vec![0x7F]);
        assert_eq!(encode_uint(0x80), vec![0x80, 0x80]);
        assert_eq!(encode_uint(0x2E57), vec![0xAE, 0x57]);
        assert_eq!(encode_uint(0x3FFF), vec![0xBF, 0xFF]);
        assert_eq!(encode_uint(0x4000), vec![0xC0, 0x00, 0x40, 0x00]);
        assert_eq!(encode_uint(0x1FFF_FFFF), vec![0xDF, 0xFF, 0xFF, 0xFF]);

        let mut builder = SignatureBuilder::new();
        assert!(matches!(builder.emit_uint(0x2000_0000), Err(Error::Malformed { .. })));
    }

    #[test]
    fn compressed_signed() {
        // ECMA-335 II.23.2 examples
        assert_eq!(encode_int(3), vec![0x06]);
        assert_eq!(encode_int(-3), vec![0x7B]);
        assert_eq!(encode_int(64), vec![0x80, 0x80]);
        assert_eq!(encode_int(-64), vec![0x01]);
        assert_eq!(encode_int(8192), vec![0xC0, 0x00, 0x40, 0x00]);
        assert_eq!(encode_int(-8192), vec![0x80, 0x01]);
        assert_eq!(encode_int(268_435_455), vec![0xDF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(encode_int(-268_435_456), vec![0xC0, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn coded_tokens() {
        let mut builder = SignatureBuilder::new();
        builder.emit_token(Token::from_parts(TokenType::TypeDef, 3)).unwrap();
        builder.emit_token(Token::from_parts(TokenType::TypeRef, 3)).unwrap();
        builder.emit_token(Token::from_parts(TokenType::TypeSpec, 3)).unwrap();
        assert_eq!(builder.as_bytes(), &[0x0C, 0x0D, 0x0E]);

        assert!(builder
            .emit_token(Token::from_parts(TokenType::MethodDef, 1))
            .is_err());
    }

    #[test]
    fn fixup_kind_with_module_override() {
        let context = SignatureContext::new(ModuleId(0));
        let mut builder = SignatureBuilder::new();
        builder
            .emit_fixup(FixupKind::TypeHandle, Some(ModuleId(0)), context)
            .unwrap();
        builder
            .emit_fixup(FixupKind::TypeHandle, Some(ModuleId(2)), context)
            .unwrap();
        builder.emit_fixup(FixupKind::TypeHandle, None, context).unwrap();
        assert_eq!(builder.as_bytes(), &[0x10, 0x90, 0x02, 0x10]);
    }

    #[test]
    fn type_signatures() {
        let lib = corelib();
        let context = SignatureContext::new(lib.module.id);

        let mut builder = SignatureBuilder::new();
        builder.emit_type_signature(&lib.string, context).unwrap();
        builder.emit_type_signature(&lib.int32.make_sz_array(), context).unwrap();
        builder.emit_type_signature(&TypeDesc::Canon, context).unwrap();
        assert_eq!(
            builder.as_bytes(),
            &[ELEMENT_TYPE::STRING, ELEMENT_TYPE::SZARRAY, ELEMENT_TYPE::I4, ELEMENT_TYPE::CANON_ZAPSIG]
        );

        let list_of_int = lib.list.instantiate(vec![lib.int32.clone()]).unwrap();
        let list_rid = lib.list.definition().unwrap().token.rid();
        let mut builder = SignatureBuilder::new();
        builder.emit_type_signature(&list_of_int, context).unwrap();
        assert_eq!(
            builder.into_bytes(),
            vec![
                ELEMENT_TYPE::GENERICINST,
                ELEMENT_TYPE::CLASS,
                (list_rid << 2) as u8,
                1,
                ELEMENT_TYPE::I4
            ]
        );

        let mut builder = SignatureBuilder::new();
        builder.emit_type_signature(&lib.int32.make_array(2), context).unwrap();
        assert_eq!(builder.into_bytes(), vec![ELEMENT_TYPE::ARRAY, ELEMENT_TYPE::I4, 2, 0, 0]);
    }

    #[test]
    fn foreign_type_gets_module_override() {
        let lib = corelib();
        let mut app = crate::metadata::typesystem::ModuleDesc::new(ModuleId(1), "App");
        let widget = app.define_type("App", "Widget", TypeKind::Class);

        let mut builder = SignatureBuilder::new();
        builder
            .emit_type_signature(&widget, SignatureContext::new(lib.module.id))
            .unwrap();
        assert_eq!(builder.into_bytes(), vec![ELEMENT_TYPE::MODULE_ZAPSIG, 1, ELEMENT_TYPE::CLASS, 0x04]);

        let mut builder = SignatureBuilder::new();
        builder
            .emit_type_signature(&widget, SignatureContext::new(app.id))
            .unwrap();
        assert_eq!(builder.into_bytes(), vec![ELEMENT_TYPE::CLASS, 0x04]);
    }

    #[test]
    fn method_signatures() {
        let mut lib = corelib();
        let context = SignatureContext::new(lib.module.id);
        let object = lib.object.clone();
        let to_string = lib
            .module
            .define_method(&object, "ToString", MethodAttributes::VIRTUAL);
        let rid = to_string.token().rid() as u8;

        let mut builder = SignatureBuilder::new();
        builder
            .emit_method_signature(&to_string, None, false, false, context)
            .unwrap();
        assert_eq!(builder.into_bytes(), vec![0x00, rid]);

        let mut builder = SignatureBuilder::new();
        builder
            .emit_method_signature(&to_string, Some(&lib.int32), true, false, context)
            .unwrap();
        assert_eq!(builder.into_bytes(), vec![0x21, rid, ELEMENT_TYPE::I4]);

        let list_of_string = lib.list.instantiate(vec![lib.string.clone()]).unwrap();
        let list = lib.list.clone();
        let add = lib.module.define_method(&list, "Add", MethodAttributes::empty());
        let add = add.on_type(list_of_string);
        let mut builder = SignatureBuilder::new();
        builder.emit_method_signature(&add, None, false, false, context).unwrap();
        let bytes = builder.into_bytes();
        assert_eq!(bytes[0], MethodSigFlags::OWNER_TYPE.bits() as u8);
        assert_eq!(bytes[1], ELEMENT_TYPE::GENERICINST);
        assert_eq!(*bytes.last().unwrap(), add.token().rid() as u8);
    }

    #[test]
    fn generic_method_instantiation() {
        let mut lib = corelib();
        let context = SignatureContext::new(lib.module.id);
        let object = lib.object.clone();
        let empty = lib
            .module
            .define_generic_method(&object, "Empty", MethodAttributes::STATIC, 1);
        let empty_of_int = empty.instantiate(vec![lib.int32.clone()]).unwrap();

        let mut builder = SignatureBuilder::new();
        builder
            .emit_method_signature(&empty_of_int, None, false, true, context)
            .unwrap();
        assert_eq!(
            builder.into_bytes(),
            vec![0x06, empty.token().rid() as u8, 1, ELEMENT_TYPE::I4]
        );
    }

    #[test]
    fn array_methods_are_not_supported() {
        let lib = corelib();
        let get = MethodDesc::new(
            lib.int32.make_array(2),
            "Get",
            Token::from_parts(TokenType::MemberRef, 1),
            MethodAttributes::empty(),
        );
        let mut builder = SignatureBuilder::new();
        let result = builder.emit_method_signature(&get, None, false, false, SignatureContext::new(ModuleId(0)));
        assert!(matches!(result, Err(Error::NotImplemented(_))));
    }

    #[test]
    fn field_signatures() {
        let lib = corelib();
        let context = SignatureContext::new(lib.module.id);
        let field = FieldDesc::new(lib.string.clone(), "Empty", Token::from_parts(TokenType::FieldDef, 5), true);
        let mut builder = SignatureBuilder::new();
        builder.emit_field_signature(&field, context).unwrap();
        assert_eq!(builder.into_bytes(), vec![0x00, 0x05]);

        let field = FieldDesc::new(lib.string.clone(), "Empty", Token::from_parts(TokenType::MemberRef, 9), true);
        let mut builder = SignatureBuilder::new();
        builder.emit_field_signature(&field, context).unwrap();
        assert_eq!(builder.into_bytes(), vec![0x10, 0x09]);
    }
}
