//! GC reference maps of calls resolved through stub dispatch cells.
//!
//! While a delay-load helper resolves a method or dispatch cell, the arguments of the
//! interrupted call live in the caller's transition block and the runtime must be able
//! to report them to the GC without decoding the callee's signature. Each such cell
//! therefore has a compact map of `<slot, token>` pairs:
//!
//! - the stream starts at a byte boundary; every byte carries 7 payload bits and the high
//!   bit marks that another byte follows
//! - slots are delta encoded from the previous one
//! - the basic unit is two bits: skip one slot, object reference, interior pointer, or 3
//!   for an extended value in 4-bit groups whose high bit continues the integer
//! - on x86 the map starts with the number of stack slots the callee pops
//!
//! [`GcRefMapBuilder`] implements the encoding, [`TransitionBlock`] knows where a target
//! passes each argument.

use std::collections::BTreeMap;

use crate::{
    compilation::{TargetArchitecture, TargetDetails, TargetOs},
    metadata::typesystem::{MethodDesc, TypeDesc, TypeKind, ValueTypeLayout, ELEMENT_TYPE},
    Error, Result,
};

/// Number of ref maps between two entries of a section's lookup index
pub const GCREFMAP_LOOKUP_STRIDE: usize = 1024;

/// What a transition block slot holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum GcRefMapToken {
    /// Nothing the GC cares about
    Skip = 0,
    /// Object reference
    Ref = 1,
    /// Interior pointer
    Interior = 2,
    /// Instantiating method descriptor
    MethodParam = 3,
    /// Instantiating method table
    TypeParam = 4,
    /// Varargs signature cookie
    VaSigCookie = 5,
}

/// Bit-level writer of GC ref maps.
///
/// Any number of maps can be appended; each ends with [`GcRefMapBuilder::flush`].
///
/// # Examples
///
/// ```rust
/// use readytorun::readytorun::{GcRefMapBuilder, GcRefMapToken};
///
/// let mut builder = GcRefMapBuilder::new();
/// builder.write_token(0, GcRefMapToken::Ref);
/// builder.write_token(3, GcRefMapToken::Ref);
/// builder.flush();
/// assert_eq!(builder.data(), &[0b0100_0001]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct GcRefMapBuilder {
    data: Vec<u8>,
    pending: u8,
    // trailing zero bits are never written, so this can exceed 7
    bits: u32,
    pos: u32,
}

impl GcRefMapBuilder {
    /// Creates an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn append_bit(&mut self, bit: u32) {
        if bit != 0 {
            while self.bits >= 7 {
                self.data.push(self.pending | 0x80);
                self.pending = 0;
                self.bits -= 7;
            }
            self.pending |= 1 << self.bits;
        }
        self.bits += 1;
    }

    fn append_two_bit(&mut self, bits: u32) {
        self.append_bit(bits & 1);
        self.append_bit(bits >> 1);
    }

    fn append_int(&mut self, mut value: u32) {
        loop {
            self.append_bit(value & 1);
            self.append_bit((value >> 1) & 1);
            self.append_bit((value >> 2) & 1);
            value >>= 3;
            self.append_bit(u32::from(value != 0));
            if value == 0 {
                break;
            }
        }
    }

    /// Starts an x86 map with the number of stack slots the callee pops
    pub fn write_stack_pop(&mut self, slots: u32) {
        if slots < 3 {
            self.append_two_bit(slots);
        } else {
            self.append_two_bit(3);
            self.append_int(slots - 3);
        }
    }

    /// Records `token` at slot `pos`; slots must be written in increasing order
    pub fn write_token(&mut self, pos: u32, token: GcRefMapToken) {
        let delta = pos - self.pos;
        self.pos = pos + 1;

        if delta != 0 {
            if delta < 4 {
                for _ in 0..delta {
                    self.append_two_bit(0);
                }
            } else {
                self.append_two_bit(3);
                self.append_int((delta - 4) << 1);
            }
        }

        let token = token as u32;
        if token < 3 {
            self.append_two_bit(token);
        } else {
            self.append_two_bit(3);
            self.append_int(((token - 3) << 1) | 1);
        }
    }

    /// Ends the current map at a byte boundary.
    ///
    /// A map without any token still takes one zero byte.
    pub fn flush(&mut self) {
        if (self.pending & 0x7F) != 0 || self.pos == 0 {
            self.data.push(self.pending & 0x7F);
        }
        self.pending = 0;
        self.bits = 0;
        self.pos = 0;
    }

    /// Bytes of all flushed maps
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes written so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no map was flushed yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the builder, returning the encoded maps
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// How a parameter is passed and reported
#[derive(Debug)]
enum ArgKind<'a> {
    Primitive { size: u32, float: bool },
    Reference,
    ByRef,
    Struct(&'a ValueTypeLayout),
}

fn primitive_size(element_type: u8, pointer_size: u32) -> Option<u32> {
    match element_type {
        ELEMENT_TYPE::BOOLEAN | ELEMENT_TYPE::I1 | ELEMENT_TYPE::U1 => Some(1),
        ELEMENT_TYPE::CHAR | ELEMENT_TYPE::I2 | ELEMENT_TYPE::U2 => Some(2),
        ELEMENT_TYPE::I4 | ELEMENT_TYPE::U4 | ELEMENT_TYPE::R4 => Some(4),
        ELEMENT_TYPE::I8 | ELEMENT_TYPE::U8 | ELEMENT_TYPE::R8 => Some(8),
        ELEMENT_TYPE::I | ELEMENT_TYPE::U | ELEMENT_TYPE::PTR | ELEMENT_TYPE::FNPTR => Some(pointer_size),
        _ => None,
    }
}

/// Transition block slots and the GC tokens stored in them, by byte offset
#[derive(Debug, Default)]
struct Frame {
    slots: BTreeMap<u32, GcRefMapToken>,
}

impl Frame {
    fn mark(&mut self, offset: u32, token: GcRefMapToken) {
        self.slots.insert(offset, token);
    }

    fn token(&self, offset: u32) -> GcRefMapToken {
        self.slots.get(&offset).copied().unwrap_or(GcRefMapToken::Skip)
    }
}

/// Register frame pushed by the stubs that call into delay-load helpers.
///
/// Offsets are relative to the start of the block; stack arguments follow it directly.
///
/// | Target      | Argument registers      | Block size | Register offset |
/// |-------------|-------------------------|------------|-----------------|
/// | x86         | ECX, EDX                | 28         | 0               |
/// | x64 Windows | RCX, RDX, R8, R9 (home) | 72         | 72              |
/// | x64 Unix    | RDI, RSI, RDX, RCX, R8, R9 | 104     | 0               |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionBlock {
    architecture: TargetArchitecture,
    unix_abi: bool,
    pointer_size: u32,
    argument_registers: u32,
    argument_registers_offset: u32,
    size: u32,
    // value types above this size, or of a size that is not a power of two, go by reference
    enregistered_param_max: Option<u32>,
    enregistered_return_max: u32,
}

/// Argument placement state while walking a signature
#[derive(Debug, Default)]
struct ArgCursor {
    registers_used: u32,
    float_registers_used: u32,
    // bytes of stack arguments placed so far
    stack_bytes: u32,
}

const X64_UNIX_FLOAT_REGISTERS: u32 = 8;
const X64_UNIX_FLOAT_REGISTERS_OFFSET: u32 = 16 * X64_UNIX_FLOAT_REGISTERS;

impl TransitionBlock {
    /// The transition block of `target`.
    ///
    /// # Errors
    /// Returns [`Error::NotImplemented`] for ARM targets, which have no stub dispatch
    /// code.
    pub fn for_target(target: &TargetDetails) -> Result<TransitionBlock> {
        match target.architecture {
            TargetArchitecture::X86 => Ok(TransitionBlock {
                architecture: TargetArchitecture::X86,
                unix_abi: false,
                pointer_size: 4,
                argument_registers: 2,
                argument_registers_offset: 0,
                // argument registers, 4 callee-saved registers, return address
                size: 2 * 4 + 4 * 4 + 4,
                enregistered_param_max: None,
                enregistered_return_max: 4,
            }),
            TargetArchitecture::X64 if target.operating_system == TargetOs::Windows => Ok(TransitionBlock {
                architecture: TargetArchitecture::X64,
                unix_abi: false,
                pointer_size: 8,
                argument_registers: 4,
                // the register home area lies in the caller's frame, right above the block
                argument_registers_offset: 8 * 8 + 8,
                size: 8 * 8 + 8,
                enregistered_param_max: Some(8),
                enregistered_return_max: 8,
            }),
            TargetArchitecture::X64 => Ok(TransitionBlock {
                architecture: TargetArchitecture::X64,
                unix_abi: true,
                pointer_size: 8,
                argument_registers: 6,
                argument_registers_offset: 0,
                size: 6 * 8 + 6 * 8 + 8,
                enregistered_param_max: Some(16),
                enregistered_return_max: 16,
            }),
            architecture @ (TargetArchitecture::Arm | TargetArchitecture::Arm64) => {
                Err(Error::NotImplemented(format!("GC ref maps for {architecture}")))
            }
        }
    }

    /// Size of the block; stack arguments start at this offset
    #[must_use]
    pub const fn offset_of_args(&self) -> u32 {
        self.size
    }

    /// Offset of the first argument register
    #[must_use]
    pub const fn argument_registers_offset(&self) -> u32 {
        self.argument_registers_offset
    }

    /// Offset a ref map slot number stands for.
    ///
    /// x86 numbers its two argument registers backwards, ECX first.
    #[must_use]
    pub const fn offset_from_pos(&self, pos: u32) -> u32 {
        if self.is_x86() {
            if pos < self.argument_registers {
                self.argument_registers_offset + (self.argument_registers - pos - 1) * self.pointer_size
            } else {
                self.size + (pos - self.argument_registers) * self.pointer_size
            }
        } else {
            self.argument_registers_offset + pos * self.pointer_size
        }
    }

    const fn is_x86(&self) -> bool {
        matches!(self.architecture, TargetArchitecture::X86)
    }

    fn classify<'a>(&self, ty: &'a TypeDesc) -> Result<ArgKind<'a>> {
        match ty {
            TypeDesc::Definition(def) if def.kind == TypeKind::ValueType => {
                if let Some(element_type) = def.element_type {
                    let size = primitive_size(element_type, self.pointer_size).ok_or_else(|| {
                        Error::TypeSystem(format!("'{ty}' has no primitive size"))
                    })?;
                    let float = matches!(element_type, ELEMENT_TYPE::R4 | ELEMENT_TYPE::R8);
                    return Ok(ArgKind::Primitive { size, float });
                }
                def.layout
                    .as_ref()
                    .map(ArgKind::Struct)
                    .ok_or_else(|| Error::TypeSystem(format!("value type '{ty}' has no layout")))
            }
            TypeDesc::Instantiated(_) if ty.is_value_type() => Err(Error::TypeSystem(format!(
                "generic value type '{ty}' has no layout"
            ))),
            TypeDesc::Definition(_)
            | TypeDesc::Instantiated(_)
            | TypeDesc::SzArray(_)
            | TypeDesc::Array { .. }
            | TypeDesc::Canon => Ok(ArgKind::Reference),
            TypeDesc::Pointer(_) => Ok(ArgKind::Primitive {
                size: self.pointer_size,
                float: false,
            }),
            TypeDesc::ByRef(_) => Ok(ArgKind::ByRef),
            TypeDesc::GenericParameter { .. } => {
                Err(Error::TypeSystem(format!("unresolved generic parameter '{ty}' in a call signature")))
            }
        }
    }

    fn is_passed_by_ref(&self, size: u32) -> bool {
        self.enregistered_param_max
            .is_some_and(|max| size > max || size & size.wrapping_sub(1) != 0)
    }

    fn uses_return_buffer(&self, return_type: &TypeDesc) -> Result<bool> {
        Ok(match self.classify(return_type)? {
            ArgKind::Struct(layout) => {
                let size = layout.size;
                size & size.wrapping_sub(1) != 0 || size > self.enregistered_return_max
            }
            _ => false,
        })
    }

    fn next_register(&self, cursor: &mut ArgCursor) -> u32 {
        cursor.registers_used += 1;
        if self.is_x86() {
            self.argument_registers_offset + (self.argument_registers - cursor.registers_used) * self.pointer_size
        } else {
            self.argument_registers_offset + (cursor.registers_used - 1) * self.pointer_size
        }
    }

    fn next_stack_slot(&self, cursor: &mut ArgCursor, size: u32) -> u32 {
        let offset = self.size + cursor.stack_bytes;
        cursor.stack_bytes += size.next_multiple_of(self.pointer_size);
        offset
    }

    /// Offset of the next argument of kind `kind`
    fn next_offset(&self, cursor: &mut ArgCursor, kind: &ArgKind<'_>) -> u32 {
        if self.is_x86() {
            let in_register = cursor.registers_used < self.argument_registers
                && match kind {
                    ArgKind::Primitive { size, float } => !float && *size <= 4,
                    ArgKind::Reference | ArgKind::ByRef => true,
                    ArgKind::Struct(layout) => matches!(layout.size, 1 | 2 | 4),
                };
            if in_register {
                return self.next_register(cursor);
            }
            let size = match kind {
                ArgKind::Primitive { size, .. } => *size,
                ArgKind::Reference | ArgKind::ByRef => self.pointer_size,
                ArgKind::Struct(layout) => layout.size,
            };
            return self.next_stack_slot(cursor, size);
        }

        if self.unix_abi {
            if matches!(kind, ArgKind::Primitive { float: true, .. }) {
                if cursor.float_registers_used < X64_UNIX_FLOAT_REGISTERS {
                    let offset = X64_UNIX_FLOAT_REGISTERS_OFFSET + cursor.float_registers_used * 8;
                    cursor.float_registers_used += 1;
                    return offset;
                }
            } else if cursor.registers_used < self.argument_registers {
                return self.next_register(cursor);
            }
            // structs take a single slot, passed by reference when they do not fit
            return self.next_stack_slot(cursor, self.pointer_size);
        }

        // x64 Windows: one slot per argument, registers and home area are contiguous
        self.next_register(cursor)
    }

    fn scan_roots(&self, kind: &ArgKind<'_>, offset: u32, frame: &mut Frame) {
        match kind {
            ArgKind::Primitive { .. } => {}
            ArgKind::Reference => frame.mark(offset, GcRefMapToken::Ref),
            ArgKind::ByRef => frame.mark(offset, GcRefMapToken::Interior),
            ArgKind::Struct(layout) => {
                if self.is_passed_by_ref(layout.size) {
                    frame.mark(offset, GcRefMapToken::Interior);
                } else {
                    for &field in &layout.gc_refs {
                        frame.mark(offset + field, GcRefMapToken::Ref);
                    }
                }
            }
        }
    }

    /// Appends the ref map of a call to `method` to `builder`.
    ///
    /// `unboxing` calls receive a boxed `this` even on value type methods.
    ///
    /// # Errors
    /// Returns [`Error::TypeSystem`] if a parameter or the return type is a value type
    /// without a known layout, or the signature still has unresolved generic parameters.
    pub fn call_ref_map(&self, method: &MethodDesc, unboxing: bool, builder: &mut GcRefMapBuilder) -> Result<()> {
        let signature = method.instantiated_signature();
        let canonical = method.canonical_method();

        let mut frame = Frame::default();
        let mut cursor = ArgCursor::default();

        if !method.is_static() {
            let token = if method.owning_type().is_value_type() && !unboxing {
                GcRefMapToken::Interior
            } else {
                GcRefMapToken::Ref
            };
            let offset = self.next_register(&mut cursor);
            frame.mark(offset, token);
        }

        let return_buffer = match &signature.return_type {
            Some(return_type) => self.uses_return_buffer(return_type)?,
            None => false,
        };
        if return_buffer {
            // x86 passes the buffer as the first stack argument
            let offset = if self.is_x86() {
                self.next_stack_slot(&mut cursor, self.pointer_size)
            } else {
                self.next_register(&mut cursor)
            };
            frame.mark(offset, GcRefMapToken::Interior);
        }

        let param_token = if canonical.requires_inst_method_desc_arg() {
            Some(GcRefMapToken::MethodParam)
        } else if canonical.requires_inst_method_table_arg() {
            Some(GcRefMapToken::TypeParam)
        } else {
            None
        };
        if let Some(token) = param_token {
            let offset = self.next_register(&mut cursor);
            frame.mark(offset, token);
        }

        for parameter in &signature.parameters {
            let kind = self.classify(parameter)?;
            let offset = self.next_offset(&mut cursor, &kind);
            self.scan_roots(&kind, offset, &mut frame);
        }

        let slots = if self.is_x86() {
            builder.write_stack_pop(cursor.stack_bytes / self.pointer_size);
            cursor.stack_bytes / self.pointer_size + self.argument_registers
        } else if self.unix_abi {
            (self.size + cursor.stack_bytes - self.argument_registers_offset) / self.pointer_size
        } else {
            // the register home area is part of the caller's argument space
            cursor.registers_used.max(self.argument_registers)
        };

        for pos in 0..slots {
            let token = frame.token(self.offset_from_pos(pos));
            if token != GcRefMapToken::Skip {
                builder.write_token(pos, token);
            }
        }
        builder.flush();
        Ok(())
    }
}
