//! Fixup signatures.
//!
//! A [`FixupSignature`] describes what the runtime loader must resolve before an import
//! cell can be used. Signatures are plain values with structural equality, so the node
//! factory can cache one signature node per distinct `(fixup, context)` pair.

use std::fmt;

use crate::{
    metadata::{
        token::{ModuleId, ModuleToken, TokenType},
        typesystem::{FieldDesc, MethodDesc, TypeDesc},
    },
    readytorun::{
        constants::{FixupKind, GenericLookupKind, MethodSigFlags, ReadyToRunHelper},
        signature::{method_signature_flags, SignatureBuilder, SignatureContext},
    },
    Error, Result,
};

/// Flags of a plain `MemberRef` method, encodable in the compact `*RefToken` forms
const MEMBER_REF_ONLY: MethodSigFlags = MethodSigFlags::MEMBER_REF_TOKEN;

/// Entity a generic dictionary lookup resolves
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LookupTarget {
    /// A type
    Type(TypeDesc),
    /// A method
    Method(MethodDesc),
    /// A field
    Field(FieldDesc),
}

impl LookupTarget {
    fn module(&self) -> Option<ModuleId> {
        match self {
            LookupTarget::Type(ty) => ty.module(),
            LookupTarget::Method(method) => method.module(),
            LookupTarget::Field(field) => field.owning_type().module(),
        }
    }
}

impl fmt::Display for LookupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupTarget::Type(ty) => write!(f, "{ty}"),
            LookupTarget::Method(method) => write!(f, "{method}"),
            LookupTarget::Field(field) => write!(f, "{field}"),
        }
    }
}

/// The load-time resolution a fixup requests
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Fixup {
    /// Address of a runtime helper
    Helper(ReadyToRunHelper),
    /// A type-based fixup: type handles, allocators, casts, static bases
    Type {
        /// Fixup kind
        kind: FixupKind,
        /// The type
        ty: TypeDesc,
    },
    /// A method-based fixup: entry points, virtual entries, handles, dictionaries
    Method {
        /// Fixup kind
        kind: FixupKind,
        /// The method
        method: MethodDesc,
        /// Constraint type of a constrained call
        constrained: Option<TypeDesc>,
        /// Unboxing stub of a value type method
        unboxing: bool,
        /// Instantiating stub supplying the generic dictionary
        instantiating: bool,
    },
    /// A field-based fixup
    Field {
        /// Fixup kind
        kind: FixupKind,
        /// The field
        field: FieldDesc,
    },
    /// A string literal
    String(ModuleToken),
    /// Optimized delegate construction for a known target
    DelegateCtor {
        /// The delegate type
        delegate_type: TypeDesc,
        /// The method the delegate is bound to
        target: MethodDesc,
    },
    /// Lookup through the generic dictionary of shared code
    GenericLookup {
        /// How the dictionary is reached
        lookup_kind: GenericLookupKind,
        /// What the dictionary slot holds
        fixup_kind: FixupKind,
        /// Entity stored in the slot
        target: LookupTarget,
        /// Shared method the lookup happens in
        method_context: MethodDesc,
    },
}

impl Fixup {
    /// Fixup kind byte written first, before any module override
    #[must_use]
    pub fn kind(&self) -> FixupKind {
        match self {
            Fixup::Helper(_) => FixupKind::Helper,
            Fixup::Type { kind, .. } | Fixup::Method { kind, .. } | Fixup::Field { kind, .. } => *kind,
            Fixup::String(_) => FixupKind::StringHandle,
            Fixup::DelegateCtor { .. } => FixupKind::DelegateCtor,
            Fixup::GenericLookup { lookup_kind, .. } => lookup_kind.fixup_kind(),
        }
    }
}

/// A fixup expressed relative to a signature context
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FixupSignature {
    /// What to resolve
    pub fixup: Fixup,
    /// Module tokens refer to
    pub context: SignatureContext,
}

impl FixupSignature {
    /// Creates a signature
    #[must_use]
    pub fn new(fixup: Fixup, context: SignatureContext) -> Self {
        FixupSignature { fixup, context }
    }

    /// Helper signature; helpers are resolved without any module context
    #[must_use]
    pub fn helper(helper: ReadyToRunHelper, context: SignatureContext) -> Self {
        FixupSignature::new(Fixup::Helper(helper), context)
    }

    /// Type-based signature
    #[must_use]
    pub fn ty(kind: FixupKind, ty: TypeDesc, context: SignatureContext) -> Self {
        FixupSignature::new(Fixup::Type { kind, ty }, context)
    }

    /// Method-based signature
    #[must_use]
    pub fn method(
        kind: FixupKind,
        method: MethodDesc,
        constrained: Option<TypeDesc>,
        unboxing: bool,
        instantiating: bool,
        context: SignatureContext,
    ) -> Self {
        FixupSignature::new(
            Fixup::Method {
                kind,
                method,
                constrained,
                unboxing,
                instantiating,
            },
            context,
        )
    }

    /// Field-based signature
    #[must_use]
    pub fn field(kind: FixupKind, field: FieldDesc, context: SignatureContext) -> Self {
        FixupSignature::new(Fixup::Field { kind, field }, context)
    }

    /// Encodes the signature blob.
    ///
    /// # Errors
    /// Returns [`Error::NotImplemented`] for entities the format cannot express and
    /// [`Error::Malformed`] for values that overflow their encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let context = self.context;
        let mut builder = SignatureBuilder::new();

        match &self.fixup {
            Fixup::Helper(helper) => {
                builder.emit_byte(FixupKind::Helper.value());
                builder.emit_uint(helper.value())?;
            }
            Fixup::Type { kind, ty } => {
                builder.emit_fixup(*kind, None, context)?;
                builder.emit_type_signature(ty, context)?;
            }
            Fixup::Method {
                kind,
                method,
                constrained,
                unboxing,
                instantiating,
            } => {
                let flags =
                    method_signature_flags(method, constrained.as_ref(), *unboxing, *instantiating)?;
                let compact = match kind {
                    FixupKind::MethodEntry if flags.is_empty() => Some(FixupKind::MethodEntryDefToken),
                    FixupKind::VirtualEntry if flags.is_empty() => Some(FixupKind::VirtualEntryDefToken),
                    FixupKind::MethodEntry if flags == MEMBER_REF_ONLY => Some(FixupKind::MethodEntryRefToken),
                    FixupKind::VirtualEntry if flags == MEMBER_REF_ONLY => Some(FixupKind::VirtualEntryRefToken),
                    _ => None,
                };

                match compact {
                    Some(compact) => {
                        builder.emit_fixup(compact, method.module(), context)?;
                        builder.emit_uint(method.token().rid())?;
                    }
                    None => {
                        builder.emit_fixup(*kind, method.module(), context)?;
                        builder.emit_method_signature(
                            method,
                            constrained.as_ref(),
                            *unboxing,
                            *instantiating,
                            context,
                        )?;
                    }
                }
            }
            Fixup::Field { kind, field } => {
                builder.emit_fixup(*kind, field.owning_type().module(), context)?;
                builder.emit_field_signature(field, context)?;
            }
            Fixup::String(token) => {
                if token.token_type() != Some(TokenType::String) {
                    return Err(Error::NotImplemented(format!("string literal token {token}")));
                }
                builder.emit_fixup(FixupKind::StringHandle, Some(token.module), context)?;
                builder.emit_uint(token.token.rid())?;
            }
            Fixup::DelegateCtor {
                delegate_type,
                target,
            } => {
                builder.emit_fixup(FixupKind::DelegateCtor, target.module(), context)?;
                builder.emit_method_signature(target, None, false, false, context)?;
                builder.emit_type_signature(delegate_type, context)?;
            }
            Fixup::GenericLookup {
                lookup_kind,
                fixup_kind,
                target,
                method_context,
            } => {
                builder.emit_fixup(lookup_kind.fixup_kind(), target.module(), context)?;
                if *lookup_kind == GenericLookupKind::ThisObj {
                    builder.emit_type_signature(method_context.owning_type(), context)?;
                }
                builder.emit_byte(fixup_kind.value());
                match target {
                    LookupTarget::Type(ty) => builder.emit_type_signature(ty, context)?,
                    LookupTarget::Method(method) => {
                        builder.emit_method_signature(method, None, false, false, context)?;
                    }
                    LookupTarget::Field(field) => builder.emit_field_signature(field, context)?,
                }
            }
        }

        Ok(builder.into_bytes())
    }
}

impl fmt::Display for FixupSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fixup {
            Fixup::Helper(helper) => write!(f, "Helper({helper})"),
            Fixup::Type { kind, ty } => write!(f, "{kind}({ty})"),
            Fixup::Method {
                kind,
                method,
                constrained,
                unboxing,
                instantiating,
            } => {
                write!(f, "{kind}(")?;
                if let Some(constrained) = constrained {
                    write!(f, "[{constrained}]")?;
                }
                write!(f, "{method}")?;
                if *unboxing {
                    write!(f, " unbox")?;
                }
                if *instantiating {
                    write!(f, " inst")?;
                }
                write!(f, ")")
            }
            Fixup::Field { kind, field } => write!(f, "{kind}({field})"),
            Fixup::String(token) => write!(f, "String({token})"),
            Fixup::DelegateCtor {
                delegate_type,
                target,
            } => write!(f, "DelegateCtor({delegate_type} -> {target})"),
            Fixup::GenericLookup {
                lookup_kind,
                fixup_kind,
                target,
                method_context,
            } => write!(f, "{lookup_kind}Lookup({fixup_kind}: {target} in {method_context})"),
        }?;
        write!(f, "@{}", self.context.module)
    }
}
