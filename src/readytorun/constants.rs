//! Constants of the ReadyToRun image format.
//!
//! Values in this module are part of the contract with the runtime loader and must not
//! change. The helper id enums at the end are compiler-side identifiers that the node
//! factory translates into fixups and helper cells.

use bitflags::bitflags;
use strum::{Display, EnumCount, EnumIter};

/// `RTR` signature at the start of the ReadyToRun header
pub const READYTORUN_SIGNATURE: u32 = 0x0052_5452;
/// Major version of the emitted header
pub const READYTORUN_MAJOR_VERSION: u16 = 2;
/// Minor version of the emitted header
pub const READYTORUN_MINOR_VERSION: u16 = 2;

/// Size of one entry in the import sections table
pub const IMPORT_SECTION_ENTRY_SIZE: usize = 20;

/// Bit set on a fixup kind byte when a module index follows
pub const FIXUP_MODULE_OVERRIDE: u8 = 0x80;

/// Identifiers of the sections listed in the ReadyToRun header
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Display, EnumIter, EnumCount)]
pub enum SectionType {
    /// Null-terminated name of the compiler that produced the image
    CompilerIdentifier = 100,
    /// Table of import sections
    ImportSections = 101,
    /// Runtime function table of all compiled methods
    RuntimeFunctions = 102,
    /// Entry points of non-generic methods, indexed by `MethodDef` rid
    MethodDefEntryPoints = 103,
    /// Exception handling clauses, indexed by method start
    ExceptionInfo = 104,
    /// Debug information
    DebugInfo = 105,
    /// Thunks of delay-loaded method calls
    DelayLoadMethodCallThunks = 106,
    /// Types defined by the image, keyed by version-resilient hash
    AvailableTypes = 108,
    /// Entry points of generic instantiations, keyed by version-resilient hash
    InstanceMethodEntryPoints = 109,
}

/// Classification of an import section's cells
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Display)]
pub enum ImportSectionType {
    /// Cells of mixed or unspecified content
    Unknown = 0,
    /// Cells holding external method entry points
    ExternalMethod = 1,
    /// Cells holding virtual stub dispatch targets
    StubDispatch = 2,
    /// Cells holding string literal handles
    StringHandle = 3,
    /// Cells holding type handles
    TypeHandle = 4,
    /// Cells holding method handles
    MethodHandle = 5,
    /// Cells holding virtual method entry points
    VirtualMethod = 6,
}

bitflags! {
    /// Resolution policy of an import section
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
    pub struct ImportSectionFlags: u16 {
        /// Cells are resolved when the module is loaded
        const EAGER = 0x0001;
        /// Section contains code
        const CODE = 0x0002;
        /// Cells hold pointers to code
        const PCODE = 0x0004;
    }
}

bitflags! {
    /// Flags prefixing a method signature in a fixup
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
    pub struct MethodSigFlags: u32 {
        /// Unboxing stub of a value type method
        const UNBOXING_STUB = 0x01;
        /// Stub supplying the generic dictionary argument
        const INSTANTIATING_STUB = 0x02;
        /// Method instantiation arguments follow the token
        const METHOD_INSTANTIATION = 0x04;
        /// Vtable slot instead of a token
        const SLOT_INSTEAD_OF_TOKEN = 0x08;
        /// The token is a `MemberRef` instead of a `MethodDef`
        const MEMBER_REF_TOKEN = 0x10;
        /// A constraint type signature follows
        const CONSTRAINED = 0x20;
        /// The owning type signature precedes the token
        const OWNER_TYPE = 0x40;
    }
}

bitflags! {
    /// Flags prefixing a field signature in a fixup
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
    pub struct FieldSigFlags: u32 {
        /// Field index instead of a token
        const INDEX_INSTEAD_OF_TOKEN = 0x08;
        /// The token is a `MemberRef` instead of a `FieldDef`
        const MEMBER_REF_TOKEN = 0x10;
        /// The owning type signature precedes the token
        const OWNER_TYPE = 0x40;
    }
}

/// Kind byte at the start of every fixup signature
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Display, EnumIter)]
#[allow(missing_docs)]
pub enum FixupKind {
    Invalid = 0x00,

    ThisObjDictionaryLookup = 0x07,
    TypeDictionaryLookup = 0x08,
    MethodDictionaryLookup = 0x09,

    TypeHandle = 0x10,
    MethodHandle = 0x11,
    FieldHandle = 0x12,

    /// Entry point of a method
    MethodEntry = 0x13,
    /// [`FixupKind::MethodEntry`] with a bare `MethodDef` rid
    MethodEntryDefToken = 0x14,
    /// [`FixupKind::MethodEntry`] with a bare `MemberRef` rid
    MethodEntryRefToken = 0x15,

    /// Target of a virtual call
    VirtualEntry = 0x16,
    VirtualEntryDefToken = 0x17,
    VirtualEntryRefToken = 0x18,
    VirtualEntrySlot = 0x19,

    /// Address of a runtime helper
    Helper = 0x1A,
    StringHandle = 0x1B,

    NewObject = 0x1C,
    NewArray = 0x1D,

    IsInstanceOf = 0x1E,
    ChkCast = 0x1F,

    /// Address of a cross-module static field
    FieldAddress = 0x20,
    /// Static constructor trigger
    CctorTrigger = 0x21,

    StaticBaseNonGC = 0x22,
    StaticBaseGC = 0x23,
    ThreadStaticBaseNonGC = 0x24,
    ThreadStaticBaseGC = 0x25,

    FieldBaseOffset = 0x26,
    FieldOffset = 0x27,

    TypeDictionary = 0x28,
    MethodDictionary = 0x29,

    CheckTypeLayout = 0x2A,
    CheckFieldOffset = 0x2B,

    DelegateCtor = 0x2C,
    DeclaringTypeHandle = 0x2D,
}

impl FixupKind {
    /// The raw kind byte
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }
}

/// Helpers the runtime resolves for ReadyToRun code
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Display, EnumIter)]
#[allow(missing_docs)]
pub enum ReadyToRunHelper {
    Invalid = 0x00,

    /// Handle of the current module, passed to delay-load helpers
    Module = 0x01,
    GSCookie = 0x02,

    DelayLoadMethodCall = 0x08,
    DelayLoadHelper = 0x10,
    DelayLoadHelperObj = 0x11,
    DelayLoadHelperObjObj = 0x12,

    Throw = 0x20,
    Rethrow = 0x21,
    Overflow = 0x22,
    RngChkFail = 0x23,
    FailFast = 0x24,
    ThrowNullRef = 0x25,
    ThrowDivZero = 0x26,

    WriteBarrier = 0x30,
    CheckedWriteBarrier = 0x31,
    ByRefWriteBarrier = 0x32,

    StelemRef = 0x38,
    LdelemaRef = 0x39,

    MemSet = 0x40,
    MemCpy = 0x41,

    GetString = 0x50,
    LogMethodEnter = 0x51,

    GetRuntimeTypeHandle = 0x54,
    GetRuntimeMethodHandle = 0x55,
    GetRuntimeFieldHandle = 0x56,

    Box = 0x58,
    BoxNullable = 0x59,
    Unbox = 0x5A,
    UnboxNullable = 0x5B,
    NewMultiDimArr = 0x5C,
    NewMultiDimArrNonVarArg = 0x5D,

    NewObject = 0x60,
    NewArray = 0x61,
    CheckCastAny = 0x62,
    CheckInstanceAny = 0x63,
    GenericGcStaticBase = 0x64,
    GenericNonGcStaticBase = 0x65,
    GenericGcTlsBase = 0x66,
    GenericNonGcTlsBase = 0x67,
    VirtualFuncPtr = 0x68,

    LMul = 0xC0,
    LMulOfv = 0xC1,
    ULMulOvf = 0xC2,
    LDiv = 0xC3,
    LMod = 0xC4,
    ULDiv = 0xC5,
    ULMod = 0xC6,
    LLsh = 0xC7,
    LRsh = 0xC8,
    LRsz = 0xC9,
    Lng2Dbl = 0xCA,
    ULng2Dbl = 0xCB,

    Div = 0xCC,
    Mod = 0xCD,
    UDiv = 0xCE,
    UMod = 0xCF,

    Dbl2Int = 0xD0,
    Dbl2IntOvf = 0xD1,
    Dbl2Lng = 0xD2,
    Dbl2LngOvf = 0xD3,
    Dbl2UInt = 0xD4,
    Dbl2UIntOvf = 0xD5,
    Dbl2ULng = 0xD6,
    Dbl2ULngOvf = 0xD7,

    FltRem = 0xE0,
    DblRem = 0xE1,
    FltRound = 0xE2,
    DblRound = 0xE3,

    PersonalityRoutine = 0xF0,
    PersonalityRoutineFilterFunclet = 0xF1,

    WriteBarrierEAX = 0x100,
    WriteBarrierEBX = 0x101,
    WriteBarrierECX = 0x102,
    WriteBarrierESI = 0x103,
    WriteBarrierEDI = 0x104,
    WriteBarrierEBP = 0x105,
    CheckedWriteBarrierEAX = 0x106,
    CheckedWriteBarrierEBX = 0x107,
    CheckedWriteBarrierECX = 0x108,
    CheckedWriteBarrierESI = 0x109,
    CheckedWriteBarrierEDI = 0x10A,
    CheckedWriteBarrierEBP = 0x10B,

    EndCatch = 0x110,
}

impl ReadyToRunHelper {
    /// The raw helper number
    #[must_use]
    pub const fn value(self) -> u32 {
        self as u32
    }
}

/// Runtime lookup a generic dictionary access goes through
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Display)]
pub enum GenericLookupKind {
    /// Dictionary reached through the `this` object's type
    ThisObj,
    /// Dictionary passed as a hidden type argument
    ClassParam,
    /// Dictionary passed as a hidden method argument
    MethodParam,
}

impl GenericLookupKind {
    /// Fixup kind byte that introduces a lookup of this kind
    #[must_use]
    pub const fn fixup_kind(self) -> FixupKind {
        match self {
            GenericLookupKind::ThisObj => FixupKind::ThisObjDictionaryLookup,
            GenericLookupKind::ClassParam => FixupKind::TypeDictionaryLookup,
            GenericLookupKind::MethodParam => FixupKind::MethodDictionaryLookup,
        }
    }
}

/// Helper requests made by the code compiler through the node factory
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Display, EnumIter)]
pub enum ReadyToRunHelperId {
    /// Allocate an object
    NewHelper,
    /// Allocate a single-dimensional array
    NewArr1,
    /// Base of the GC statics of a type
    GetGCStaticBase,
    /// Base of the non-GC statics of a type
    GetNonGCStaticBase,
    /// Base of the GC thread statics of a type
    GetThreadStaticBase,
    /// Base of the non-GC thread statics of a type
    GetThreadNonGcStaticBase,
    /// `isinst`
    IsInstanceOf,
    /// `castclass`
    CastClass,
    /// Exact type handle
    TypeHandle,
    /// Type handle that is only compared, never used to allocate
    NecessaryTypeHandle,
    /// Method handle
    MethodHandle,
    /// Field handle
    FieldHandle,
    /// Virtual method call target
    VirtualCall,
    /// Optimized delegate constructor
    DelegateCtor,
    /// Run the class constructor of a type
    CctorTrigger,
    /// Generic dictionary of a type
    TypeDictionary,
    /// Generic dictionary of a method
    MethodDictionary,
    /// Method entry point through a generic lookup
    MethodEntry,
    /// Virtual stub dispatch cell through a generic lookup
    VirtualDispatchCell,
    /// `ldvirtftn`
    ResolveVirtualFunction,
}

/// Helpers the code compiler calls directly, resolved through eager helper cells
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Display, EnumIter)]
#[allow(missing_docs)]
pub enum JitHelper {
    Throw,
    Rethrow,
    Overflow,
    RngChkFail,
    FailFast,
    ThrowNullRef,
    ThrowDivZero,

    WriteBarrier,
    CheckedWriteBarrier,
    ByRefWriteBarrier,

    StelemRef,
    LdelemaRef,
    MemSet,
    MemCpy,

    GetString,

    GetRuntimeTypeHandle,
    GetRuntimeMethodHandle,
    GetRuntimeFieldHandle,
    TypeHandleToRuntimeTypeHandle,

    Box,
    BoxNullable,
    Unbox,
    UnboxNullable,
    NewMultiDimArr,
    NewMultiDimArrNonVarArg,

    NewObject,
    NewArray,
    CheckCastAny,
    CheckInstanceAny,
    GenericGcStaticBase,
    GenericNonGcStaticBase,
    GenericGcTlsBase,
    GenericNonGcTlsBase,
    VirtualFuncPtr,

    LMul,
    LMulOfv,
    ULMulOvf,
    LDiv,
    LMod,
    ULDiv,
    ULMod,
    LLsh,
    LRsh,
    LRsz,
    Lng2Dbl,
    ULng2Dbl,

    Div,
    Mod,
    UDiv,
    UMod,

    Dbl2Int,
    Dbl2IntOvf,
    Dbl2Lng,
    Dbl2LngOvf,
    Dbl2UInt,
    Dbl2UIntOvf,
    Dbl2ULng,
    Dbl2ULngOvf,

    FltRem,
    DblRem,
    FltRound,
    DblRound,

    WriteBarrierEAX,
    WriteBarrierEBX,
    WriteBarrierECX,
    WriteBarrierESI,
    WriteBarrierEDI,
    WriteBarrierEBP,
    CheckedWriteBarrierEAX,
    CheckedWriteBarrierEBX,
    CheckedWriteBarrierECX,
    CheckedWriteBarrierESI,
    CheckedWriteBarrierEDI,
    CheckedWriteBarrierEBP,
    EndCatch,

    MonitorEnter,
    MonitorExit,
    MonitorEnterStatic,
    MonitorExitStatic,
    GetRefAny,
    PInvokeBegin,
    PInvokeEnd,
    ReversePInvokeEnter,
    ReversePInvokeExit,

    AreTypesEquivalent,
    StackProbe,
}

/// How a [`JitHelper`] is satisfied in a ReadyToRun image
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JitHelperMapping {
    /// Through an eager cell holding the given runtime helper
    Helper(ReadyToRunHelper),
    /// Only the runtime JIT can compile code using this helper
    RequiresRuntimeJit,
    /// The image format has no equivalent
    Unsupported,
}

impl JitHelper {
    /// Maps the helper to its ReadyToRun representation
    #[must_use]
    pub fn mapping(self) -> JitHelperMapping {
        use JitHelperMapping::{Helper, RequiresRuntimeJit, Unsupported};
        use ReadyToRunHelper as R;

        match self {
            JitHelper::Throw => Helper(R::Throw),
            JitHelper::Rethrow => Helper(R::Rethrow),
            JitHelper::Overflow => Helper(R::Overflow),
            JitHelper::RngChkFail => Helper(R::RngChkFail),
            JitHelper::FailFast => Helper(R::FailFast),
            JitHelper::ThrowNullRef => Helper(R::ThrowNullRef),
            JitHelper::ThrowDivZero => Helper(R::ThrowDivZero),
            JitHelper::WriteBarrier => Helper(R::WriteBarrier),
            JitHelper::CheckedWriteBarrier => Helper(R::CheckedWriteBarrier),
            JitHelper::ByRefWriteBarrier => Helper(R::ByRefWriteBarrier),
            JitHelper::StelemRef => Helper(R::StelemRef),
            JitHelper::LdelemaRef => Helper(R::LdelemaRef),
            JitHelper::MemSet => Helper(R::MemSet),
            JitHelper::MemCpy => Helper(R::MemCpy),
            JitHelper::GetString => Helper(R::GetString),
            JitHelper::GetRuntimeTypeHandle | JitHelper::TypeHandleToRuntimeTypeHandle => {
                Helper(R::GetRuntimeTypeHandle)
            }
            JitHelper::GetRuntimeMethodHandle => Helper(R::GetRuntimeMethodHandle),
            JitHelper::GetRuntimeFieldHandle => Helper(R::GetRuntimeFieldHandle),
            JitHelper::Box => Helper(R::Box),
            JitHelper::BoxNullable => Helper(R::BoxNullable),
            JitHelper::Unbox => Helper(R::Unbox),
            JitHelper::UnboxNullable => Helper(R::UnboxNullable),
            JitHelper::NewMultiDimArr => Helper(R::NewMultiDimArr),
            JitHelper::NewMultiDimArrNonVarArg => Helper(R::NewMultiDimArrNonVarArg),
            JitHelper::NewObject => Helper(R::NewObject),
            JitHelper::NewArray => Helper(R::NewArray),
            JitHelper::CheckCastAny => Helper(R::CheckCastAny),
            JitHelper::CheckInstanceAny => Helper(R::CheckInstanceAny),
            JitHelper::GenericGcStaticBase => Helper(R::GenericGcStaticBase),
            JitHelper::GenericNonGcStaticBase => Helper(R::GenericNonGcStaticBase),
            JitHelper::GenericGcTlsBase => Helper(R::GenericGcTlsBase),
            JitHelper::GenericNonGcTlsBase => Helper(R::GenericNonGcTlsBase),
            JitHelper::VirtualFuncPtr => Helper(R::VirtualFuncPtr),
            JitHelper::LMul => Helper(R::LMul),
            JitHelper::LMulOfv => Helper(R::LMulOfv),
            JitHelper::ULMulOvf => Helper(R::ULMulOvf),
            JitHelper::LDiv => Helper(R::LDiv),
            JitHelper::LMod => Helper(R::LMod),
            JitHelper::ULDiv => Helper(R::ULDiv),
            JitHelper::ULMod => Helper(R::ULMod),
            JitHelper::LLsh => Helper(R::LLsh),
            JitHelper::LRsh => Helper(R::LRsh),
            JitHelper::LRsz => Helper(R::LRsz),
            JitHelper::Lng2Dbl => Helper(R::Lng2Dbl),
            JitHelper::ULng2Dbl => Helper(R::ULng2Dbl),
            JitHelper::Div => Helper(R::Div),
            JitHelper::Mod => Helper(R::Mod),
            JitHelper::UDiv => Helper(R::UDiv),
            JitHelper::UMod => Helper(R::UMod),
            JitHelper::Dbl2Int => Helper(R::Dbl2Int),
            JitHelper::Dbl2IntOvf => Helper(R::Dbl2IntOvf),
            JitHelper::Dbl2Lng => Helper(R::Dbl2Lng),
            JitHelper::Dbl2LngOvf => Helper(R::Dbl2LngOvf),
            JitHelper::Dbl2UInt => Helper(R::Dbl2UInt),
            JitHelper::Dbl2UIntOvf => Helper(R::Dbl2UIntOvf),
            JitHelper::Dbl2ULng => Helper(R::Dbl2ULng),
            JitHelper::Dbl2ULngOvf => Helper(R::Dbl2ULngOvf),
            JitHelper::FltRem => Helper(R::FltRem),
            JitHelper::DblRem => Helper(R::DblRem),
            JitHelper::FltRound => Helper(R::FltRound),
            JitHelper::DblRound => Helper(R::DblRound),
            JitHelper::WriteBarrierEAX => Helper(R::WriteBarrierEAX),
            JitHelper::WriteBarrierEBX => Helper(R::WriteBarrierEBX),
            JitHelper::WriteBarrierECX => Helper(R::WriteBarrierECX),
            JitHelper::WriteBarrierESI => Helper(R::WriteBarrierESI),
            JitHelper::WriteBarrierEDI => Helper(R::WriteBarrierEDI),
            JitHelper::WriteBarrierEBP => Helper(R::WriteBarrierEBP),
            JitHelper::CheckedWriteBarrierEAX => Helper(R::CheckedWriteBarrierEAX),
            JitHelper::CheckedWriteBarrierEBX => Helper(R::CheckedWriteBarrierEBX),
            JitHelper::CheckedWriteBarrierECX => Helper(R::CheckedWriteBarrierECX),
            JitHelper::CheckedWriteBarrierESI => Helper(R::CheckedWriteBarrierESI),
            JitHelper::CheckedWriteBarrierEDI => Helper(R::CheckedWriteBarrierEDI),
            JitHelper::CheckedWriteBarrierEBP => Helper(R::CheckedWriteBarrierEBP),
            JitHelper::EndCatch => Helper(R::EndCatch),
            JitHelper::MonitorEnter
            | JitHelper::MonitorExit
            | JitHelper::MonitorEnterStatic
            | JitHelper::MonitorExitStatic
            | JitHelper::GetRefAny
            | JitHelper::PInvokeBegin
            | JitHelper::PInvokeEnd
            | JitHelper::ReversePInvokeEnter
            | JitHelper::ReversePInvokeExit => RequiresRuntimeJit,
            JitHelper::AreTypesEquivalent | JitHelper::StackProbe => Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn header_section_ids() {
        assert_eq!(SectionType::CompilerIdentifier as u32, 100);
        assert_eq!(SectionType::ImportSections as u32, 101);
        assert_eq!(SectionType::InstanceMethodEntryPoints as u32, 109);
        assert_eq!(SectionType::COUNT, 9);
    }

    #[test]
    fn lookup_kinds_map_to_dictionary_fixups() {
        assert_eq!(GenericLookupKind::ThisObj.fixup_kind().value(), 0x07);
        assert_eq!(GenericLookupKind::ClassParam.fixup_kind().value(), 0x08);
        assert_eq!(GenericLookupKind::MethodParam.fixup_kind().value(), 0x09);
    }

    #[test]
    fn fixup_kinds_fit_below_override_bit() {
        for kind in FixupKind::iter() {
            assert_eq!(kind.value() & FIXUP_MODULE_OVERRIDE, 0, "{kind}");
        }
    }

    #[test]
    fn jit_helper_mapping() {
        assert_eq!(
            JitHelper::TypeHandleToRuntimeTypeHandle.mapping(),
            JitHelperMapping::Helper(ReadyToRunHelper::GetRuntimeTypeHandle)
        );
        assert_eq!(JitHelper::MonitorEnter.mapping(), JitHelperMapping::RequiresRuntimeJit);
        assert_eq!(JitHelper::StackProbe.mapping(), JitHelperMapping::Unsupported);

        let mapped = JitHelper::iter()
            .filter(|h| matches!(h.mapping(), JitHelperMapping::Helper(_)))
            .count();
        assert_eq!(mapped, JitHelper::iter().count() - 11);
    }
}
