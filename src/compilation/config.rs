//! Compilation configuration
//!
//! This module provides the options that shape a ReadyToRun compilation: the target
//! machine, the identifier string embedded in the image, profile-guided rooting and
//! the failure budget of the driver.

use strum::Display;

use crate::dependency::ObjectNodeSection;

/// Default identifier string embedded in every image
pub const DEFAULT_COMPILER_IDENTIFIER: &str = "CoreRT Ready-To-Run Compiler";

/// Processor architecture of the target.
///
/// Every architecture has a header and table layout, but stub code is only emitted for
/// x86 and x64; compilations for [`TargetArchitecture::Arm`] and
/// [`TargetArchitecture::Arm64`] are rejected when they are set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TargetArchitecture {
    /// 32-bit x86
    X86,
    /// x86-64
    X64,
    /// 32-bit ARM
    Arm,
    /// 64-bit ARM
    Arm64,
}

/// Operating system of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TargetOs {
    /// Windows
    Windows,
    /// Linux
    Linux,
    /// macOS
    OSX,
    /// FreeBSD
    FreeBSD,
}

/// Architecture and operating system the image is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetDetails {
    /// Processor architecture
    pub architecture: TargetArchitecture,
    /// Operating system
    pub operating_system: TargetOs,
}

impl TargetDetails {
    /// Creates a target description
    #[must_use]
    pub const fn new(architecture: TargetArchitecture, operating_system: TargetOs) -> Self {
        TargetDetails {
            architecture,
            operating_system,
        }
    }

    /// Size of a pointer (and of an import cell) in bytes
    #[must_use]
    pub const fn pointer_size(&self) -> usize {
        match self.architecture {
            TargetArchitecture::X86 | TargetArchitecture::Arm => 4,
            TargetArchitecture::X64 | TargetArchitecture::Arm64 => 8,
        }
    }

    /// Whether import thunks can be emitted for this target
    #[must_use]
    pub const fn emits_stub_code(&self) -> bool {
        matches!(self.architecture, TargetArchitecture::X86 | TargetArchitecture::X64)
    }

    /// Section the header tables are placed in.
    ///
    /// Windows maps read-only data that is never written; other loaders apply
    /// relocations in place, so the tables go to the writable data section.
    #[must_use]
    pub const fn table_section(&self) -> ObjectNodeSection {
        match self.operating_system {
            TargetOs::Windows => ObjectNodeSection::ReadOnlyData,
            TargetOs::Linux | TargetOs::OSX | TargetOs::FreeBSD => ObjectNodeSection::Data,
        }
    }
}

impl Default for TargetDetails {
    fn default() -> Self {
        TargetDetails::new(TargetArchitecture::X64, TargetOs::Windows)
    }
}

/// Options of one ReadyToRun compilation.
///
/// Defaults compile every method reachable from the roots for Windows x64 and never
/// abort because of per-method failures.
///
/// # Examples
///
/// ```rust
/// use readytorun::compilation::{CompilationConfig, TargetArchitecture, TargetDetails, TargetOs};
///
/// let config = CompilationConfig::default()
///     .with_target(TargetDetails::new(TargetArchitecture::X64, TargetOs::Linux))
///     .with_max_failed_methods(Some(10))
///     .with_types_table(false);
///
/// assert_eq!(config.target.pointer_size(), 8);
/// assert!(!config.emit_types_table);
/// assert!(config.emit_instance_entry_points);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationConfig {
    /// Machine the image runs on
    pub target: TargetDetails,

    /// String stored in the compiler identifier section
    pub compiler_identifier: String,

    /// Root only the methods a profile reports as executed
    pub profile_guided: bool,

    /// Abort once more than this many methods failed to compile
    pub max_failed_methods: Option<usize>,

    /// Emit the instance entry point table for generic instantiations
    pub emit_instance_entry_points: bool,

    /// Emit the available types table
    pub emit_types_table: bool,
}

impl Default for CompilationConfig {
    fn default() -> Self {
        Self {
            target: TargetDetails::default(),
            compiler_identifier: DEFAULT_COMPILER_IDENTIFIER.to_string(),
            profile_guided: false,
            max_failed_methods: None,
            emit_instance_entry_points: true,
            emit_types_table: true,
        }
    }
}

impl CompilationConfig {
    /// Sets the target machine
    #[must_use]
    pub fn with_target(mut self, target: TargetDetails) -> Self {
        self.target = target;
        self
    }

    /// Sets the compiler identifier string
    #[must_use]
    pub fn with_compiler_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.compiler_identifier = identifier.into();
        self
    }

    /// Enables or disables profile-guided rooting
    #[must_use]
    pub fn with_profile_guided(mut self, enabled: bool) -> Self {
        self.profile_guided = enabled;
        self
    }

    /// Sets the failure budget; `None` never aborts
    #[must_use]
    pub fn with_max_failed_methods(mut self, limit: Option<usize>) -> Self {
        self.max_failed_methods = limit;
        self
    }

    /// Enables or disables the instance entry point table
    #[must_use]
    pub fn with_instance_entry_points(mut self, enabled: bool) -> Self {
        self.emit_instance_entry_points = enabled;
        self
    }

    /// Enables or disables the available types table
    #[must_use]
    pub fn with_types_table(mut self, enabled: bool) -> Self {
        self.emit_types_table = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompilationConfig::default();
        assert_eq!(config.compiler_identifier, "CoreRT Ready-To-Run Compiler");
        assert_eq!(config.target.architecture, TargetArchitecture::X64);
        assert_eq!(config.target.operating_system, TargetOs::Windows);
        assert!(!config.profile_guided);
        assert_eq!(config.max_failed_methods, None);
        assert!(config.emit_instance_entry_points);
        assert!(config.emit_types_table);
    }

    #[test]
    fn test_table_section_by_os() {
        let windows = TargetDetails::new(TargetArchitecture::X64, TargetOs::Windows);
        let linux = TargetDetails::new(TargetArchitecture::Arm64, TargetOs::Linux);
        assert_eq!(windows.table_section(), ObjectNodeSection::ReadOnlyData);
        assert_eq!(linux.table_section(), ObjectNodeSection::Data);
    }

    #[test]
    fn test_pointer_sizes() {
        assert_eq!(TargetDetails::new(TargetArchitecture::X86, TargetOs::Windows).pointer_size(), 4);
        assert_eq!(TargetDetails::new(TargetArchitecture::Arm, TargetOs::Linux).pointer_size(), 4);
        assert_eq!(TargetDetails::new(TargetArchitecture::Arm64, TargetOs::OSX).pointer_size(), 8);
    }

    #[test]
    fn test_stub_code_targets() {
        assert!(TargetDetails::default().emits_stub_code());
        assert!(TargetDetails::new(TargetArchitecture::X86, TargetOs::Linux).emits_stub_code());
        assert!(!TargetDetails::new(TargetArchitecture::Arm, TargetOs::Linux).emits_stub_code());
        assert!(!TargetDetails::new(TargetArchitecture::Arm64, TargetOs::OSX).emits_stub_code());
    }

    #[test]
    fn test_setters_chain() {
        let config = CompilationConfig::default()
            .with_compiler_identifier("test")
            .with_profile_guided(true)
            .with_instance_entry_points(false);
        assert_eq!(config.compiler_identifier, "test");
        assert!(config.profile_guided);
        assert!(!config.emit_instance_entry_points);
    }
}
