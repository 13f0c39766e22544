use thiserror::Error;

use crate::dependency::NodeId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into two groups that callers must treat differently:
///
/// ## Fatal errors
/// - [`Error::NotImplemented`] - The compiler reached a feature it has no support for
/// - [`Error::Malformed`] - Input data or internal state is inconsistent
/// - [`Error::InvalidNode`] - A node handle does not belong to the factory it was used with
/// - [`Error::LockError`] - Thread synchronization failure
/// - [`Error::Io`] - Filesystem I/O errors
///
/// ## Per-method errors
/// - [`Error::TypeSystem`] - The code compiler could not resolve something in the type system
/// - [`Error::RequiresRuntimeJit`] - The method can only be compiled by the runtime JIT
///
/// Per-method errors are absorbed by the compilation driver, which leaves the affected
/// method without a precompiled body. Use [`Error::is_recoverable`] to tell them apart.
///
/// # Examples
///
/// ```rust
/// use readytorun::Error;
///
/// let err = Error::TypeSystem("unresolved field 'Foo::bar'".to_string());
/// assert!(err.is_recoverable());
///
/// let err = Error::NotImplemented("helper VirtualDispatchCell".to_string());
/// assert!(!err.is_recoverable());
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A feature the compiler does not support was requested.
    ///
    /// This signals a capability gap in the compiler (an unknown helper id, an unsupported
    /// target architecture, an array method signature) rather than a problem with the input.
    /// The compilation is aborted.
    #[error("Not implemented - {0}")]
    NotImplemented(String),

    /// The data is inconsistent and no valid image can be produced from it.
    ///
    /// Raised for duplicate profile records, encodings that overflow their format, and
    /// internal state that violates an invariant of the image layout. The error includes
    /// the source location where the problem was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Type-system resolution failed while compiling a single method.
    #[error("Type system failure - {0}")]
    TypeSystem(String),

    /// The method (or a helper it needs) can only be handled by the runtime JIT.
    #[error("Requires runtime JIT - {0}")]
    RequiresRuntimeJit(String),

    /// A node handle was used with a factory that did not create it.
    #[error("Invalid node - {0}")]
    InvalidNode(NodeId),

    /// More methods failed to compile than the configured budget allows.
    #[error("Too many methods failed to compile - {0}")]
    TooManyFailures(usize),

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically
    /// when a mutex guarding a shared cache was poisoned.
    #[error("Failed to lock target")]
    LockError,

    /// File I/O error.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the error only affects the method being compiled.
    ///
    /// The compilation driver leaves such methods to the runtime JIT and continues.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::TypeSystem(_) | Error::RequiresRuntimeJit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(Error::TypeSystem("x".into()).is_recoverable());
        assert!(Error::RequiresRuntimeJit("x".into()).is_recoverable());
        assert!(!Error::NotImplemented("x".into()).is_recoverable());
        assert!(!malformed_error!("bad").is_recoverable());
        assert!(!Error::LockError.is_recoverable());
    }

    #[test]
    fn malformed_macro_formats() {
        let err = malformed_error!("duplicate method {}", 7);
        match err {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "duplicate method 7");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("expected Malformed"),
        }
    }
}
