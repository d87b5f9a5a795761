//! Compile-time and runtime error kinds.
//!
//! Runtime errors are domain values: `die` may throw any scalar (including a
//! blessed reference) and an `eval` block must hand exactly that value back
//! through `$@`. [`RunError`] therefore carries a [`Scalar`] payload rather
//! than a formatted string, plus the raise location used for Perl's
//! `" at FILE line N.\n"` suffix rule.

use std::{error::Error, fmt, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    ast::SourcePos,
    value::{FlowKind, FlowMarker, Scalar, ScalarPayload},
};

/// Result alias for operations that can raise a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Error raised by the bytecode compiler.
///
/// Never caught internally; surfaced to the caller of `compile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub message: String,
    pub pos: SourcePos,
}

impl CompileError {
    #[must_use]
    pub fn new(message: impl Into<String>, pos: SourcePos) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}", self.message, self.pos.line)
    }
}

impl Error for CompileError {}

/// Where a runtime error was raised, for the `$@` suffix rule.
#[derive(Debug, Clone)]
pub struct ErrorLocation {
    pub file: Rc<str>,
    pub line: u32,
}

/// A runtime exception in flight.
#[derive(Debug, Clone)]
pub struct RunError {
    /// The thrown value. Plain-string errors get the location suffix when
    /// stored into `$@`; references pass through untouched.
    pub value: Scalar,
    /// Raise site; filled in by the dispatcher if the raiser did not know it.
    pub location: Option<ErrorLocation>,
}

impl RunError {
    /// Error from a plain message, location to be filled by the dispatcher.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            value: Scalar::from_string(message.into()),
            location: None,
        }
    }

    /// Error carrying an arbitrary `die` payload.
    #[must_use]
    pub fn die_value(value: Scalar) -> Self {
        Self { value, location: None }
    }

    /// Internal engine diagnostic (runtime type errors and the like).
    /// The message should already include the opcode/PC context.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::msg(message)
    }

    /// The error produced when a control-flow marker escapes every loop.
    #[must_use]
    pub fn unmatched_marker(marker: &FlowMarker) -> Self {
        let message = match marker.kind {
            FlowKind::Goto => match &marker.label {
                Some(label) => format!("Can't find label {label}"),
                None => "goto must have a label".to_owned(),
            },
            kind => format!("Can't \"{kind}\" outside a loop block"),
        };
        Self::msg(message)
    }

    #[must_use]
    pub fn with_location(mut self, file: Rc<str>, line: u32) -> Self {
        if self.location.is_none() {
            self.location = Some(ErrorLocation { file, line });
        }
        self
    }

    /// The scalar to store into `$@` for this error.
    ///
    /// A string payload without a trailing newline gains
    /// `" at FILE line N.\n"`; everything else (references, objects,
    /// messages that already end in a newline) is stored unchanged.
    #[must_use]
    pub fn into_error_scalar(self) -> Scalar {
        let payload = self.value.payload();
        if let ScalarPayload::Str(s) = &payload {
            if !s.ends_with('\n') {
                let suffix = match &self.location {
                    Some(loc) => format!(" at {} line {}.\n", loc.file, loc.line),
                    None => ".\n".to_owned(),
                };
                return Scalar::from_string(format!("{s}{suffix}"));
            }
        }
        self.value
    }

    /// Human-readable rendering for hosts that print uncaught errors.
    #[must_use]
    pub fn render(&self) -> String {
        match self.clone().into_error_scalar().payload() {
            ScalarPayload::Str(s) => s.to_string(),
            other => format!("{other:?}"),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.render().trim_end_matches('\n'))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::value::{RefPayload, RefTarget};

    #[test]
    fn plain_message_gains_location_suffix() {
        let err = RunError::msg("oops").with_location(Rc::from("t.pl"), 3);
        match err.into_error_scalar().payload() {
            ScalarPayload::Str(s) => assert_eq!(&*s, "oops at t.pl line 3.\n"),
            other => panic!("expected Str, got {other:?}"),
        }
    }

    #[test]
    fn newline_terminated_message_passes_through() {
        let err = RunError::msg("oops\n").with_location(Rc::from("t.pl"), 3);
        match err.into_error_scalar().payload() {
            ScalarPayload::Str(s) => assert_eq!(&*s, "oops\n"),
            other => panic!("expected Str, got {other:?}"),
        }
    }

    #[test]
    fn reference_payload_passes_through() {
        let target = Scalar::from_int(7);
        let payload = ScalarPayload::Ref(RefPayload {
            target: RefTarget::Scalar(target.clone()),
            blessed: None,
        });
        let err = RunError::die_value(Scalar::from_payload(payload)).with_location(Rc::from("t.pl"), 9);
        match err.into_error_scalar().payload() {
            ScalarPayload::Ref(r) => match r.target {
                RefTarget::Scalar(s) => assert!(s.same_cell(&target)),
                other => panic!("expected scalar target, got {other:?}"),
            },
            other => panic!("expected Ref, got {other:?}"),
        }
    }
}
