//! # readytorun Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the readytorun library. Import it to get quick access to everything needed to set
//! up and run a compilation.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all readytorun operations
pub use crate::Error;

/// The result type used throughout readytorun
pub use crate::Result;

// ================================================================================================
// Compilation
// ================================================================================================

/// Configuration, module group, driver and output image
pub use crate::compilation::{
    CodeCompiler, CompilationConfig, CompilationModuleGroup, CompilationStats, ObjectImage,
    ReadyToRunCompilation, TargetArchitecture, TargetDetails, TargetOs,
};

/// Profile data consulted by profile-guided compilations
pub use crate::profile::{
    MethodProfileData, MethodProfilingDataFlags, ProfileData, ProfileDataManager, ProfileSource,
    RecordedProfile,
};

// ================================================================================================
// Node Factory
// ================================================================================================

/// The factory and the payloads code compilers hand back
pub use crate::factory::{HelperTarget, ImportSectionId, MethodCode, NodeFactory};

/// Node identity and relocations
pub use crate::dependency::{NodeId, Relocation, RelocationKind};

// ================================================================================================
// Type System
// ================================================================================================

/// Metadata tokens
pub use crate::metadata::token::{ModuleId, ModuleToken, Token, TokenType};

/// Types, methods, fields and modules
pub use crate::metadata::typesystem::{
    FieldDesc, MethodAttributes, MethodDesc, ModuleDesc, TypeDesc, TypeKind,
};

// ================================================================================================
// Image Format
// ================================================================================================

/// Helper identifiers and fixup kinds
pub use crate::readytorun::constants::{FixupKind, ReadyToRunHelper, ReadyToRunHelperId};

/// Signature encoding context
pub use crate::readytorun::SignatureContext;
