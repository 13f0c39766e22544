//! Metadata tokens and module-qualified tokens.
//!
//! A [`Token`] names a row of a metadata table; a [`ModuleToken`] pairs it with the
//! [`ModuleId`] whose metadata it refers to.

use std::fmt;

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index (rid) within that table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table kind and a row id
    #[must_use]
    pub const fn from_parts(kind: TokenType, rid: u32) -> Self {
        Token(((kind as u32) << 24) | (rid & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub const fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub const fn rid(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns the table kind, if the high byte names one this crate knows about
    #[must_use]
    pub fn token_type(&self) -> Option<TokenType> {
        TokenType::from_table(self.table())
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, rid: {})",
            self.0,
            self.table(),
            self.rid()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Metadata tables referenced by tokens that appear in fixup signatures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// `Module` table
    Module = 0x00,
    /// `TypeRef` table
    TypeRef = 0x01,
    /// `TypeDef` table
    TypeDef = 0x02,
    /// `Field` table
    FieldDef = 0x04,
    /// `MethodDef` table
    MethodDef = 0x06,
    /// `MemberRef` table
    MemberRef = 0x0A,
    /// `TypeSpec` table
    TypeSpec = 0x1B,
    /// `MethodSpec` table
    MethodSpec = 0x2B,
    /// User string heap
    String = 0x70,
}

impl TokenType {
    /// Maps a token's high byte back to its table kind
    #[must_use]
    pub fn from_table(table: u8) -> Option<Self> {
        Some(match table {
            0x00 => TokenType::Module,
            0x01 => TokenType::TypeRef,
            0x02 => TokenType::TypeDef,
            0x04 => TokenType::FieldDef,
            0x06 => TokenType::MethodDef,
            0x0A => TokenType::MemberRef,
            0x1B => TokenType::TypeSpec,
            0x2B => TokenType::MethodSpec,
            0x70 => TokenType::String,
            _ => return None,
        })
    }
}

/// Identifies one module taking part in a compilation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// A token together with the module whose metadata it indexes.
///
/// Tokens are only meaningful relative to a module; fixups referencing entities from
/// several modules carry the module alongside the token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleToken {
    /// The module whose metadata tables the token indexes
    pub module: ModuleId,
    /// The token within that module
    pub token: Token,
}

impl ModuleToken {
    /// Creates a new module token
    #[must_use]
    pub const fn new(module: ModuleId, token: Token) -> Self {
        ModuleToken { module, token }
    }

    /// Returns the table kind of the token
    #[must_use]
    pub fn token_type(&self) -> Option<TokenType> {
        self.token.token_type()
    }
}

impl fmt::Display for ModuleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.token)
    }
}
