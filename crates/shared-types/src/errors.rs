//! # Error Types
//!
//! `TracedError` is the error every fabric boundary speaks. It wraps an inner
//! error and records a stack of frames: one per place the error was created or
//! passed through, in the order they were captured. When an error crosses the
//! bus it is serialized with its stack, so the caller's trace continues into
//! the remote service.
//!
//! ## Capturing Frames
//!
//! Rust has no runtime access to the enclosing function name, so the macros
//! are the primary way to create and trace errors:
//!
//! ```rust,ignore
//! use shared_types::{errorf, new_error, traced};
//!
//! let err = new_error!("queue name is empty", "while parsing options");
//! let err = traced!(err, "at startup");
//! let err = errorf!("port {} out of range", 70000);
//! ```
//!
//! The `#[track_caller]` constructors record file and line only.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use thiserror::Error;

/// Surface vocabulary of error kinds, each mapped to an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad URL, bad queue name, bad validation rule, overweight element, etc.
    InvalidArgument,
    /// Time budget exceeded.
    Timeout,
    /// The transport has no subscriber for the topic.
    NoResponder,
    /// The call context was cancelled.
    Cancelled,
    /// Missing Content-Length, missing body or missing indexed fragment.
    MalformedFragment,
    /// A remote handler aborted.
    HandlerPanic,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// HTTP status code surfaced for this kind.
    pub const fn status_code(self) -> u16 {
        match self {
            Self::InvalidArgument | Self::MalformedFragment => 400,
            Self::Timeout => 408,
            Self::NoResponder => 503,
            Self::Cancelled => 504,
            Self::HandlerPanic | Self::Internal => 500,
        }
    }

    /// Best-effort kind for a status code received without a structured body.
    pub const fn from_status_code(code: u16) -> Self {
        match code {
            408 => Self::Timeout,
            503 => Self::NoResponder,
            504 => Self::Cancelled,
            400..=499 => Self::InvalidArgument,
            _ => Self::Internal,
        }
    }

    /// Stable label used in logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Timeout => "timeout",
            Self::NoResponder => "no_responder",
            Self::Cancelled => "cancelled",
            Self::MalformedFragment => "malformed_fragment",
            Self::HandlerPanic => "handler_panic",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured location in an error's path. Immutable once pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    #[serde(default)]
    pub function: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
}

impl StackFrame {
    pub fn new(file: &str, line: u32, function: &str) -> Self {
        Self {
            file: file.to_string(),
            function: function.to_string(),
            line,
            annotations: Vec::new(),
        }
    }

    /// Frame for the caller's location. The function name is unknown.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self::new(location.file(), location.line(), "")
    }

    pub fn annotate(mut self, note: impl fmt::Display) -> Self {
        self.annotations.push(note.to_string());
        self
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.function.is_empty() {
            writeln!(f, "{}", self.function)?;
        }
        write!(f, "\t{}:{}", self.file, self.line)?;
        for note in &self.annotations {
            write!(f, "\n\t{}", note)?;
        }
        Ok(())
    }
}

/// Plain text error used as the inner error of errors created from a message.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct Message(pub String);

/// An error with a kind, a status code and an append-only stack of frames.
#[derive(Clone)]
pub struct TracedError {
    kind: ErrorKind,
    status_code: u16,
    inner: Arc<dyn StdError + Send + Sync + 'static>,
    stack: Vec<StackFrame>,
}

impl TracedError {
    /// Error from a message with an empty stack.
    pub fn bare(message: impl Into<String>) -> Self {
        Self::from_error(Message(message.into()))
    }

    /// Wraps a standard error. The stack starts empty.
    pub fn from_error<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Internal,
            status_code: ErrorKind::Internal.status_code(),
            inner: Arc::new(err),
            stack: Vec::new(),
        }
    }

    /// `Internal` error from a message, with the caller's frame.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self::bare(message).with_frame(StackFrame::caller())
    }

    /// Error of the given kind from a message, with the caller's frame.
    #[track_caller]
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::bare(message)
            .of_kind(kind)
            .with_frame(StackFrame::caller())
    }

    #[track_caller]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::InvalidArgument, message)
    }

    #[track_caller]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Timeout, message)
    }

    #[track_caller]
    pub fn no_responder(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::NoResponder, message)
    }

    #[track_caller]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Cancelled, message)
    }

    #[track_caller]
    pub fn malformed_fragment(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::MalformedFragment, message)
    }

    #[track_caller]
    pub fn handler_panic(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::HandlerPanic, message)
    }

    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Internal, message)
    }

    /// Sets the kind and the matching status code.
    pub fn of_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self.status_code = kind.status_code();
        self
    }

    /// Overrides the status code without changing the kind.
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.stack.push(frame);
        self
    }

    pub fn push_frame(&mut self, frame: StackFrame) {
        self.stack.push(frame);
    }

    /// Appends the caller's frame.
    #[track_caller]
    pub fn trace(self) -> Self {
        self.with_frame(StackFrame::caller())
    }

    /// `None` in, `None` out; otherwise appends the caller's frame.
    #[track_caller]
    pub fn trace_option(err: Option<Self>) -> Option<Self> {
        let frame = StackFrame::caller();
        err.map(|e| e.with_frame(frame))
    }

    /// Adds an annotation to the most recent frame, if there is one.
    pub fn annotate(mut self, note: impl fmt::Display) -> Self {
        if let Some(top) = self.stack.pop() {
            self.stack.push(top.annotate(note));
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn stack(&self) -> &[StackFrame] {
        &self.stack
    }

    pub fn message(&self) -> String {
        self.inner.to_string()
    }

    /// The wrapped error, peeled of kind and stack.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    /// Message followed by the stack, most recent frame first.
    pub fn verbose(&self) -> String {
        let mut out = self.message();
        for frame in self.stack.iter().rev() {
            out.push('\n');
            out.push_str(&frame.to_string());
        }
        out
    }
}

impl fmt::Debug for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedError")
            .field("kind", &self.kind)
            .field("status_code", &self.status_code)
            .field("message", &self.message())
            .field("stack", &self.stack)
            .finish()
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str(&self.verbose())
        } else {
            write!(f, "{}", self.inner)
        }
    }
}

impl StdError for TracedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Wire shape of a `TracedError`.
#[derive(Serialize, Deserialize)]
struct WireError {
    error: String,
    kind: ErrorKind,
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(default)]
    stack: Vec<StackFrame>,
}

impl Serialize for TracedError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireError {
            error: self.message(),
            kind: self.kind,
            status_code: self.status_code,
            stack: self.stack.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TracedError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireError::deserialize(deserializer)?;
        Ok(Self {
            kind: wire.kind,
            status_code: wire.status_code,
            inner: Arc::new(Message(wire.error)),
            stack: wire.stack,
        })
    }
}

impl From<Message> for TracedError {
    fn from(err: Message) -> Self {
        Self::from_error(err)
    }
}

impl From<std::io::Error> for TracedError {
    fn from(err: std::io::Error) -> Self {
        Self::from_error(err)
    }
}

impl From<serde_json::Error> for TracedError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_error(err).of_kind(ErrorKind::InvalidArgument)
    }
}

/// Appends the caller's frame to the error of a `Result`.
pub trait TraceExt<T> {
    fn traced(self) -> Result<T, TracedError>;
}

impl<T, E> TraceExt<T> for Result<T, E>
where
    E: Into<TracedError>,
{
    #[track_caller]
    fn traced(self) -> Result<T, TracedError> {
        let frame = StackFrame::caller();
        self.map_err(|e| e.into().with_frame(frame))
    }
}

/// Result type for operations that cross a fabric boundary.
pub type FabricResult<T> = Result<T, TracedError>;

/// Path of the enclosing function, without closure suffixes.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        let name = name.strip_suffix("::f").unwrap_or(name);
        name.trim_end_matches("::{{closure}}")
    }};
}

/// Frame for the current location, including the function name.
#[macro_export]
macro_rules! here {
    () => {
        $crate::errors::StackFrame::new(file!(), line!(), $crate::function_name!())
    };
}

/// `New(msg, annotations...)`: a new `Internal` error with one frame.
#[macro_export]
macro_rules! new_error {
    ($msg:expr $(, $note:expr)* $(,)?) => {
        $crate::errors::TracedError::bare($msg).with_frame($crate::here!()$(.annotate($note))*)
    };
}

/// `Newf(fmt, args...)`: a new `Internal` error from a format string.
#[macro_export]
macro_rules! errorf {
    ($($arg:tt)+) => {
        $crate::errors::TracedError::bare(format!($($arg)+)).with_frame($crate::here!())
    };
}

/// `Trace(err, annotations...)`: converts into `TracedError` and appends a frame.
#[macro_export]
macro_rules! traced {
    ($err:expr $(, $note:expr)* $(,)?) => {
        $crate::errors::TracedError::from($err).with_frame($crate::here!()$(.annotate($note))*)
    };
}
