//! Minimal type-system model consumed by the image compiler.
//!
//! The compiler does not resolve metadata itself. It needs stable identity (equality and
//! hashing) for types, methods and fields, the structural accessors used by the
//! version-resilient hash, metadata tokens for signature encoding, and the canonical
//! form of shared generic code. This module provides exactly that surface.
//!
//! # Key Components
//!
//! - [`TypeDesc`]: a type, either a definition, an instantiation or a parameterized type
//! - [`MethodDesc`] / [`FieldDesc`]: members with their owning type and token
//! - [`MethodSignature`] / [`ValueTypeLayout`]: what calling-convention decisions need
//! - [`ModuleDesc`]: the definitions a module contributes to the compilation
//! - [`hash`]: version-resilient hash codes for types and methods
//!
//! # Examples
//!
//! ```rust
//! use readytorun::metadata::typesystem::{ModuleDesc, TypeKind};
//! use readytorun::metadata::token::ModuleId;
//!
//! let mut module = ModuleDesc::new(ModuleId(0), "System.Private.CoreLib");
//! let list = module.define_generic_type("System.Collections.Generic", "List`1", TypeKind::Class, 1);
//! let int32 = module.define_type("System", "Int32", TypeKind::ValueType);
//! let list_of_int = list.instantiate(vec![int32])?;
//! assert!(list_of_int.has_instantiation());
//! # Ok::<(), readytorun::Error>(())
//! ```

mod element;
pub mod hash;

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use bitflags::bitflags;

pub use element::ELEMENT_TYPE;

use crate::{
    metadata::token::{ModuleId, Token, TokenType},
    Error, Result,
};

/// Broad category of a type definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Reference type
    Class,
    /// Value type (struct or enum)
    ValueType,
    /// Interface
    Interface,
}

/// Instance layout of a value type, as far as argument passing needs it
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ValueTypeLayout {
    /// Instance size in bytes
    pub size: u32,
    /// Offsets of the object reference fields
    pub gc_refs: Vec<u32>,
}

impl ValueTypeLayout {
    /// A layout of `size` bytes holding object references at `gc_refs`
    #[must_use]
    pub fn new(size: u32, gc_refs: Vec<u32>) -> Self {
        ValueTypeLayout { size, gc_refs }
    }
}

/// A type definition row of some module.
///
/// Identity is the `(module, token)` pair; the remaining fields are descriptive.
#[derive(Debug)]
pub struct TypeDefinition {
    /// Module that defines the type
    pub module: ModuleId,
    /// `TypeDef` token of the type in its module
    pub token: Token,
    /// Namespace, empty for nested and global types
    pub namespace: String,
    /// Simple name including the generic arity suffix
    pub name: String,
    /// Reference, value or interface type
    pub kind: TypeKind,
    /// Element type code for the well-known primitive and special types
    pub element_type: Option<u8>,
    /// Number of generic parameters
    pub generic_arity: u32,
    /// Enclosing type for nested types
    pub enclosing: Option<TypeDesc>,
    /// Instance layout of non-primitive value types, when known
    pub layout: Option<ValueTypeLayout>,
}

impl PartialEq for TypeDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module && self.token == other.token
    }
}

impl Eq for TypeDefinition {}

impl Hash for TypeDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.module.hash(state);
        self.token.hash(state);
    }
}

/// A generic type definition closed over a list of type arguments
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct InstantiatedType {
    /// The generic definition
    pub definition: Arc<TypeDefinition>,
    /// The type arguments, one per generic parameter
    pub args: Vec<TypeDesc>,
}

/// Owner of a generic parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GenericParameterKind {
    /// Parameter of a generic type (`!n`)
    Type,
    /// Parameter of a generic method (`!!n`)
    Method,
}

/// A type as seen by the compiler.
///
/// Cloning is cheap; equality and hashing are structural.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    /// A non-generic type or an open generic definition
    Definition(Arc<TypeDefinition>),
    /// A generic instantiation
    Instantiated(Arc<InstantiatedType>),
    /// Single-dimensional zero-based array
    SzArray(Arc<TypeDesc>),
    /// Multi-dimensional array of the given rank
    Array {
        /// Element type
        element: Arc<TypeDesc>,
        /// Number of dimensions
        rank: u32,
    },
    /// Unmanaged pointer
    Pointer(Arc<TypeDesc>),
    /// Managed reference
    ByRef(Arc<TypeDesc>),
    /// Generic parameter reference
    GenericParameter {
        /// Type or method parameter
        kind: GenericParameterKind,
        /// Parameter position
        index: u32,
    },
    /// The `__Canon` placeholder standing in for any reference type in shared code
    Canon,
}

impl TypeDesc {
    /// Wraps a type definition
    #[must_use]
    pub fn from_definition(definition: TypeDefinition) -> Self {
        TypeDesc::Definition(Arc::new(definition))
    }

    /// Closes this generic definition over `args`.
    ///
    /// # Errors
    /// Returns [`Error::TypeSystem`] if this is not a generic definition or the number of
    /// arguments does not match its arity.
    pub fn instantiate(&self, args: Vec<TypeDesc>) -> Result<TypeDesc> {
        match self {
            TypeDesc::Definition(def) if def.generic_arity as usize == args.len() && !args.is_empty() => {
                Ok(TypeDesc::Instantiated(Arc::new(InstantiatedType {
                    definition: def.clone(),
                    args,
                })))
            }
            _ => Err(Error::TypeSystem(format!(
                "cannot instantiate '{}' over {} argument(s)",
                self,
                args.len()
            ))),
        }
    }

    /// Returns the single-dimensional array type of this element type
    #[must_use]
    pub fn make_sz_array(&self) -> TypeDesc {
        TypeDesc::SzArray(Arc::new(self.clone()))
    }

    /// Returns the multi-dimensional array type of this element type
    #[must_use]
    pub fn make_array(&self, rank: u32) -> TypeDesc {
        TypeDesc::Array {
            element: Arc::new(self.clone()),
            rank,
        }
    }

    /// Returns the unmanaged pointer type to this type
    #[must_use]
    pub fn make_pointer(&self) -> TypeDesc {
        TypeDesc::Pointer(Arc::new(self.clone()))
    }

    /// Returns the managed reference type to this type
    #[must_use]
    pub fn make_byref(&self) -> TypeDesc {
        TypeDesc::ByRef(Arc::new(self.clone()))
    }

    /// The type definition behind a definition or instantiation
    #[must_use]
    pub fn definition(&self) -> Option<&Arc<TypeDefinition>> {
        match self {
            TypeDesc::Definition(def) => Some(def),
            TypeDesc::Instantiated(inst) => Some(&inst.definition),
            _ => None,
        }
    }

    /// The open generic definition of an instantiation, or the type itself
    #[must_use]
    pub fn type_definition(&self) -> TypeDesc {
        match self {
            TypeDesc::Instantiated(inst) => TypeDesc::Definition(inst.definition.clone()),
            other => other.clone(),
        }
    }

    /// The module that defines this type, following element types of parameterized types
    #[must_use]
    pub fn module(&self) -> Option<ModuleId> {
        match self {
            TypeDesc::Definition(def) => Some(def.module),
            TypeDesc::Instantiated(inst) => Some(inst.definition.module),
            TypeDesc::SzArray(elem)
            | TypeDesc::Array { element: elem, .. }
            | TypeDesc::Pointer(elem)
            | TypeDesc::ByRef(elem) => elem.module(),
            TypeDesc::GenericParameter { .. } | TypeDesc::Canon => None,
        }
    }

    /// Element type of arrays, pointers and byrefs
    #[must_use]
    pub fn parameter_type(&self) -> Option<&TypeDesc> {
        match self {
            TypeDesc::SzArray(elem)
            | TypeDesc::Array { element: elem, .. }
            | TypeDesc::Pointer(elem)
            | TypeDesc::ByRef(elem) => Some(elem),
            _ => None,
        }
    }

    /// Type arguments of an instantiation, empty otherwise
    #[must_use]
    pub fn instantiation(&self) -> &[TypeDesc] {
        match self {
            TypeDesc::Instantiated(inst) => &inst.args,
            _ => &[],
        }
    }

    /// Returns `true` for generic instantiations
    #[must_use]
    pub fn has_instantiation(&self) -> bool {
        matches!(self, TypeDesc::Instantiated(_))
    }

    /// Returns `true` for value types
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.definition()
            .is_some_and(|def| def.kind == TypeKind::ValueType)
    }

    /// Returns `true` if values of this type are object references
    #[must_use]
    pub fn is_gc_reference(&self) -> bool {
        match self {
            TypeDesc::Definition(_) | TypeDesc::Instantiated(_) => !self.is_value_type(),
            TypeDesc::SzArray(_) | TypeDesc::Array { .. } | TypeDesc::Canon => true,
            TypeDesc::Pointer(_) | TypeDesc::ByRef(_) | TypeDesc::GenericParameter { .. } => false,
        }
    }

    /// Returns `true` if `__Canon` appears anywhere in this type
    #[must_use]
    pub fn is_canonical_subtype(&self) -> bool {
        match self {
            TypeDesc::Canon => true,
            TypeDesc::Instantiated(inst) => inst.args.iter().any(TypeDesc::is_canonical_subtype),
            TypeDesc::SzArray(elem)
            | TypeDesc::Array { element: elem, .. }
            | TypeDesc::Pointer(elem)
            | TypeDesc::ByRef(elem) => elem.is_canonical_subtype(),
            TypeDesc::Definition(_) | TypeDesc::GenericParameter { .. } => false,
        }
    }

    /// Converts the type to the form whose code is shared across instantiations.
    ///
    /// Reference-type arguments collapse to `__Canon`; value-type arguments stay exact but
    /// are canonicalized recursively.
    #[must_use]
    pub fn convert_to_canon_form(&self) -> TypeDesc {
        match self {
            TypeDesc::Instantiated(inst) => TypeDesc::Instantiated(Arc::new(InstantiatedType {
                definition: inst.definition.clone(),
                args: inst.args.iter().map(canon_argument).collect(),
            })),
            other => other.clone(),
        }
    }

    /// Replaces generic parameters by the given type and method arguments.
    ///
    /// Parameters without a matching argument are left in place.
    #[must_use]
    pub fn substitute(&self, type_args: &[TypeDesc], method_args: &[TypeDesc]) -> TypeDesc {
        match self {
            TypeDesc::GenericParameter { kind, index } => {
                let args = match kind {
                    GenericParameterKind::Type => type_args,
                    GenericParameterKind::Method => method_args,
                };
                args.get(*index as usize).cloned().unwrap_or_else(|| self.clone())
            }
            TypeDesc::Instantiated(inst) => TypeDesc::Instantiated(Arc::new(InstantiatedType {
                definition: inst.definition.clone(),
                args: inst
                    .args
                    .iter()
                    .map(|arg| arg.substitute(type_args, method_args))
                    .collect(),
            })),
            TypeDesc::SzArray(elem) => TypeDesc::SzArray(Arc::new(elem.substitute(type_args, method_args))),
            TypeDesc::Array { element, rank } => TypeDesc::Array {
                element: Arc::new(element.substitute(type_args, method_args)),
                rank: *rank,
            },
            TypeDesc::Pointer(elem) => TypeDesc::Pointer(Arc::new(elem.substitute(type_args, method_args))),
            TypeDesc::ByRef(elem) => TypeDesc::ByRef(Arc::new(elem.substitute(type_args, method_args))),
            TypeDesc::Definition(_) | TypeDesc::Canon => self.clone(),
        }
    }

    /// Element type code used when this type appears in a signature
    #[must_use]
    pub fn signature_element_type(&self) -> u8 {
        match self {
            TypeDesc::Definition(def) => def.element_type.unwrap_or(match def.kind {
                TypeKind::ValueType => ELEMENT_TYPE::VALUETYPE,
                TypeKind::Class | TypeKind::Interface => ELEMENT_TYPE::CLASS,
            }),
            TypeDesc::Instantiated(_) => ELEMENT_TYPE::GENERICINST,
            TypeDesc::SzArray(_) => ELEMENT_TYPE::SZARRAY,
            TypeDesc::Array { .. } => ELEMENT_TYPE::ARRAY,
            TypeDesc::Pointer(_) => ELEMENT_TYPE::PTR,
            TypeDesc::ByRef(_) => ELEMENT_TYPE::BYREF,
            TypeDesc::GenericParameter {
                kind: GenericParameterKind::Type,
                ..
            } => ELEMENT_TYPE::VAR,
            TypeDesc::GenericParameter {
                kind: GenericParameterKind::Method,
                ..
            } => ELEMENT_TYPE::MVAR,
            TypeDesc::Canon => ELEMENT_TYPE::CANON_ZAPSIG,
        }
    }
}

fn canon_argument(arg: &TypeDesc) -> TypeDesc {
    if arg.is_gc_reference() {
        TypeDesc::Canon
    } else {
        arg.convert_to_canon_form()
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Definition(def) => {
                if let Some(enclosing) = &def.enclosing {
                    write!(f, "{}+{}", enclosing, def.name)
                } else if def.namespace.is_empty() {
                    write!(f, "{}", def.name)
                } else {
                    write!(f, "{}.{}", def.namespace, def.name)
                }
            }
            TypeDesc::Instantiated(inst) => {
                write!(f, "{}<", TypeDesc::Definition(inst.definition.clone()))?;
                for (i, arg) in inst.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            TypeDesc::SzArray(elem) => write!(f, "{elem}[]"),
            TypeDesc::Array { element, rank } => {
                write!(f, "{element}[{}]", ",".repeat(rank.saturating_sub(1) as usize))
            }
            TypeDesc::Pointer(elem) => write!(f, "{elem}*"),
            TypeDesc::ByRef(elem) => write!(f, "{elem}&"),
            TypeDesc::GenericParameter {
                kind: GenericParameterKind::Type,
                index,
            } => write!(f, "!{index}"),
            TypeDesc::GenericParameter {
                kind: GenericParameterKind::Method,
                index,
            } => write!(f, "!!{index}"),
            TypeDesc::Canon => write!(f, "System.__Canon"),
        }
    }
}

bitflags! {
    /// Method attributes relevant to code generation
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MethodAttributes: u32 {
        /// No `this` parameter
        const STATIC = 0x0001;
        /// Occupies a vtable slot
        const VIRTUAL = 0x0002;
        /// Has no body
        const ABSTRACT = 0x0004;
        /// Instance constructor
        const CONSTRUCTOR = 0x0008;
    }
}

/// Return and parameter types of a method, excluding `this`.
///
/// Types may refer to the generic parameters of the method and its owning type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Return type; `None` for `void`
    pub return_type: Option<TypeDesc>,
    /// Parameter types in declaration order
    pub parameters: Vec<TypeDesc>,
}

impl MethodSignature {
    /// A signature returning `return_type` and taking `parameters`
    #[must_use]
    pub fn new(return_type: Option<TypeDesc>, parameters: Vec<TypeDesc>) -> Self {
        MethodSignature {
            return_type,
            parameters,
        }
    }

    fn substitute(&self, type_args: &[TypeDesc], method_args: &[TypeDesc]) -> MethodSignature {
        MethodSignature {
            return_type: self
                .return_type
                .as_ref()
                .map(|ty| ty.substitute(type_args, method_args)),
            parameters: self
                .parameters
                .iter()
                .map(|ty| ty.substitute(type_args, method_args))
                .collect(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct MethodData {
    owning_type: TypeDesc,
    name: String,
    token: Token,
    generic_arity: u32,
    instantiation: Vec<TypeDesc>,
    attributes: MethodAttributes,
    signature: MethodSignature,
}

/// A method, possibly on an instantiated type and possibly instantiated itself.
///
/// The token always refers to the `MethodDef` (or `MemberRef`) in the module of the
/// owning type's definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDesc(Arc<MethodData>);

impl MethodDesc {
    /// Creates a non-generic method on `owning_type`
    #[must_use]
    pub fn new(
        owning_type: TypeDesc,
        name: impl Into<String>,
        token: Token,
        attributes: MethodAttributes,
    ) -> Self {
        Self::new_generic(owning_type, name, token, attributes, 0)
    }

    /// Creates an open generic method definition with `arity` method type parameters
    #[must_use]
    pub fn new_generic(
        owning_type: TypeDesc,
        name: impl Into<String>,
        token: Token,
        attributes: MethodAttributes,
        arity: u32,
    ) -> Self {
        MethodDesc(Arc::new(MethodData {
            owning_type,
            name: name.into(),
            token,
            generic_arity: arity,
            instantiation: Vec::new(),
            attributes,
            signature: MethodSignature::default(),
        }))
    }

    /// The same method with `signature` as its declared signature
    #[must_use]
    pub fn with_signature(&self, signature: MethodSignature) -> MethodDesc {
        MethodDesc(Arc::new(MethodData {
            owning_type: self.0.owning_type.clone(),
            name: self.0.name.clone(),
            token: self.0.token,
            generic_arity: self.0.generic_arity,
            instantiation: self.0.instantiation.clone(),
            attributes: self.0.attributes,
            signature,
        }))
    }

    /// Instantiates a generic method over `args`.
    ///
    /// # Errors
    /// Returns [`Error::TypeSystem`] on an arity mismatch.
    pub fn instantiate(&self, args: Vec<TypeDesc>) -> Result<MethodDesc> {
        if self.0.generic_arity as usize != args.len() || args.is_empty() {
            return Err(Error::TypeSystem(format!(
                "cannot instantiate '{}' over {} argument(s)",
                self,
                args.len()
            )));
        }
        Ok(MethodDesc(Arc::new(MethodData {
            owning_type: self.0.owning_type.clone(),
            name: self.0.name.clone(),
            token: self.0.token,
            generic_arity: self.0.generic_arity,
            instantiation: args,
            attributes: self.0.attributes,
            signature: self.0.signature.clone(),
        })))
    }

    /// The same method on a different instantiation of its owning type
    #[must_use]
    pub fn on_type(&self, owning_type: TypeDesc) -> MethodDesc {
        MethodDesc(Arc::new(MethodData {
            owning_type,
            name: self.0.name.clone(),
            token: self.0.token,
            generic_arity: self.0.generic_arity,
            instantiation: self.0.instantiation.clone(),
            attributes: self.0.attributes,
            signature: self.0.signature.clone(),
        }))
    }

    /// The type declaring this method
    #[must_use]
    pub fn owning_type(&self) -> &TypeDesc {
        &self.0.owning_type
    }

    /// The method name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Metadata token of the method
    #[must_use]
    pub fn token(&self) -> Token {
        self.0.token
    }

    /// Module whose metadata defines the method
    #[must_use]
    pub fn module(&self) -> Option<ModuleId> {
        self.0.owning_type.module()
    }

    /// Method type arguments, empty for non-generic methods and open definitions
    #[must_use]
    pub fn instantiation(&self) -> &[TypeDesc] {
        &self.0.instantiation
    }

    /// Returns `true` if the method carries method type arguments
    #[must_use]
    pub fn has_instantiation(&self) -> bool {
        !self.0.instantiation.is_empty()
    }

    /// Number of method type parameters
    #[must_use]
    pub fn generic_arity(&self) -> u32 {
        self.0.generic_arity
    }

    /// Returns `true` for generic definitions that still have unbound type parameters,
    /// either their own or their owning type's
    #[must_use]
    pub fn is_open_generic(&self) -> bool {
        let open_method = self.0.generic_arity > 0 && self.0.instantiation.is_empty();
        let open_owner = matches!(&self.0.owning_type, TypeDesc::Definition(def) if def.generic_arity > 0);
        open_method || open_owner
    }

    /// Method attributes
    #[must_use]
    pub fn attributes(&self) -> MethodAttributes {
        self.0.attributes
    }

    /// Returns `true` for methods without a `this` parameter
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.0.attributes.contains(MethodAttributes::STATIC)
    }

    /// The declared signature, in terms of the generic parameters
    #[must_use]
    pub fn signature(&self) -> &MethodSignature {
        &self.0.signature
    }

    /// The signature with the owning type's and the method's type arguments substituted
    #[must_use]
    pub fn instantiated_signature(&self) -> MethodSignature {
        self.0
            .signature
            .substitute(self.0.owning_type.instantiation(), &self.0.instantiation)
    }

    /// Returns `true` if shared code of this method receives its generic context
    /// through the method-desc argument
    #[must_use]
    pub fn requires_inst_method_desc_arg(&self) -> bool {
        self.is_shared_by_generic_instantiations() && self.has_instantiation()
    }

    /// Returns `true` if shared code of this method receives its generic context
    /// through the method-table argument; instance methods of reference types use `this`
    #[must_use]
    pub fn requires_inst_method_table_arg(&self) -> bool {
        self.is_shared_by_generic_instantiations()
            && !self.has_instantiation()
            && (self.is_static() || self.0.owning_type.is_value_type())
    }

    /// Returns `true` for virtual methods
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.0.attributes.contains(MethodAttributes::VIRTUAL)
    }

    /// Returns `true` if the method has an IL body that can be compiled
    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.0.attributes.contains(MethodAttributes::ABSTRACT)
    }

    /// Returns `true` if the method is generic over method or type parameters
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.has_instantiation() || self.0.owning_type.has_instantiation()
    }

    /// The form whose body is shared by all compatible instantiations
    #[must_use]
    pub fn canonical_method(&self) -> MethodDesc {
        if !self.is_generic() {
            return self.clone();
        }
        MethodDesc(Arc::new(MethodData {
            owning_type: self.0.owning_type.convert_to_canon_form(),
            name: self.0.name.clone(),
            token: self.0.token,
            generic_arity: self.0.generic_arity,
            instantiation: self.0.instantiation.iter().map(canon_argument).collect(),
            attributes: self.0.attributes,
            signature: self.0.signature.clone(),
        }))
    }

    /// Returns `true` if this method's code is shared with other instantiations and needs
    /// a generic dictionary argument
    #[must_use]
    pub fn is_shared_by_generic_instantiations(&self) -> bool {
        self.0.owning_type.is_canonical_subtype()
            || self.0.instantiation.iter().any(TypeDesc::is_canonical_subtype)
    }
}

impl fmt::Display for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.owning_type, self.0.name)?;
        if !self.0.instantiation.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.0.instantiation.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{arg}")?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct FieldData {
    owning_type: TypeDesc,
    name: String,
    token: Token,
    is_static: bool,
}

/// A field of a (possibly instantiated) type
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldDesc(Arc<FieldData>);

impl FieldDesc {
    /// Creates a field
    #[must_use]
    pub fn new(owning_type: TypeDesc, name: impl Into<String>, token: Token, is_static: bool) -> Self {
        FieldDesc(Arc::new(FieldData {
            owning_type,
            name: name.into(),
            token,
            is_static,
        }))
    }

    /// The type declaring this field
    #[must_use]
    pub fn owning_type(&self) -> &TypeDesc {
        &self.0.owning_type
    }

    /// The field name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Metadata token of the field
    #[must_use]
    pub fn token(&self) -> Token {
        self.0.token
    }

    /// Returns `true` for static fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.0.is_static
    }
}

impl fmt::Display for FieldDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.0.owning_type, self.0.name)
    }
}

/// The definitions one input module contributes to a compilation.
///
/// Rids are assigned in definition order, starting at 1 like metadata rows.
#[derive(Debug, Clone)]
pub struct ModuleDesc {
    /// Module identity
    pub id: ModuleId,
    /// Simple assembly or module name
    pub name: String,
    types: Vec<TypeDesc>,
    methods: Vec<MethodDesc>,
}

impl ModuleDesc {
    /// Creates an empty module
    #[must_use]
    pub fn new(id: ModuleId, name: impl Into<String>) -> Self {
        ModuleDesc {
            id,
            name: name.into(),
            types: Vec::new(),
            methods: Vec::new(),
        }
    }

    fn next_type_token(&self) -> Token {
        Token::from_parts(TokenType::TypeDef, self.types.len() as u32 + 1)
    }

    fn push_type(&mut self, definition: TypeDefinition) -> TypeDesc {
        let ty = TypeDesc::from_definition(definition);
        self.types.push(ty.clone());
        ty
    }

    /// Defines a non-generic top-level type
    pub fn define_type(&mut self, namespace: &str, name: &str, kind: TypeKind) -> TypeDesc {
        self.define_generic_type(namespace, name, kind, 0)
    }

    /// Defines a top-level type with `arity` generic parameters
    pub fn define_generic_type(
        &mut self,
        namespace: &str,
        name: &str,
        kind: TypeKind,
        arity: u32,
    ) -> TypeDesc {
        let definition = TypeDefinition {
            module: self.id,
            token: self.next_type_token(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            element_type: None,
            generic_arity: arity,
            enclosing: None,
            layout: None,
        };
        self.push_type(definition)
    }

    /// Defines a well-known type that signatures encode by element type code
    pub fn define_primitive(&mut self, namespace: &str, name: &str, kind: TypeKind, element_type: u8) -> TypeDesc {
        let definition = TypeDefinition {
            module: self.id,
            token: self.next_type_token(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            element_type: Some(element_type),
            generic_arity: 0,
            enclosing: None,
            layout: None,
        };
        self.push_type(definition)
    }

    /// Defines a value type with a known instance layout
    pub fn define_value_type(&mut self, namespace: &str, name: &str, layout: ValueTypeLayout) -> TypeDesc {
        let definition = TypeDefinition {
            module: self.id,
            token: self.next_type_token(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind: TypeKind::ValueType,
            element_type: None,
            generic_arity: 0,
            enclosing: None,
            layout: Some(layout),
        };
        self.push_type(definition)
    }

    /// Defines a type nested in `enclosing`
    pub fn define_nested_type(&mut self, enclosing: &TypeDesc, name: &str, kind: TypeKind) -> TypeDesc {
        let definition = TypeDefinition {
            module: self.id,
            token: self.next_type_token(),
            namespace: String::new(),
            name: name.to_string(),
            kind,
            element_type: None,
            generic_arity: 0,
            enclosing: Some(enclosing.clone()),
            layout: None,
        };
        self.push_type(definition)
    }

    /// Defines a method on `owning_type`; the `MethodDef` rid follows definition order
    pub fn define_method(&mut self, owning_type: &TypeDesc, name: &str, attributes: MethodAttributes) -> MethodDesc {
        self.define_generic_method(owning_type, name, attributes, 0)
    }

    /// Defines a generic method with `arity` method type parameters
    pub fn define_generic_method(
        &mut self,
        owning_type: &TypeDesc,
        name: &str,
        attributes: MethodAttributes,
        arity: u32,
    ) -> MethodDesc {
        let token = Token::from_parts(TokenType::MethodDef, self.methods.len() as u32 + 1);
        let method = MethodDesc::new_generic(owning_type.clone(), name, token, attributes, arity);
        self.methods.push(method.clone());
        method
    }

    /// Defines a method with a declared signature; `arity` is its number of method type
    /// parameters
    pub fn define_method_with_signature(
        &mut self,
        owning_type: &TypeDesc,
        name: &str,
        attributes: MethodAttributes,
        arity: u32,
        signature: MethodSignature,
    ) -> MethodDesc {
        let token = Token::from_parts(TokenType::MethodDef, self.methods.len() as u32 + 1);
        let method =
            MethodDesc::new_generic(owning_type.clone(), name, token, attributes, arity).with_signature(signature);
        self.methods.push(method.clone());
        method
    }

    /// All type definitions in rid order
    #[must_use]
    pub fn types(&self) -> &[TypeDesc] {
        &self.types
    }

    /// All method definitions in rid order
    #[must_use]
    pub fn methods(&self) -> &[MethodDesc] {
        &self.methods
    }
}
