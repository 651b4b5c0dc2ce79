//! Error types.
//!
//! Each error is represented by a unique type that implements [`std::error::Error`].
//! Every API returns the higher level [`ProtocolError`] enum, and each error
//! type converts into it, so they can be used with `?`:
//!
//! ```
//! use mdrive::error::{InvalidArgumentError, ProtocolError};
//!
//! fn foo() -> Result<(), InvalidArgumentError> {
//!     // ...
//! # unimplemented!();
//! }
//!
//! fn bar() -> Result<(), ProtocolError> {
//!     foo()?;
//!     // ...
//! # Ok(())
//! }
//! ```
//!
//! To get a concrete error back out of a [`ProtocolError`], use [`TryFrom`]:
//!
//! ```
//! # use mdrive::error::{ProtocolError, TimeoutError};
//! # fn wrapper(error: ProtocolError) {
//! if let Ok(timeout) = TimeoutError::try_from(error) {
//!     println!("nothing arrived after sending {:?}", timeout.command());
//! }
//! # }
//! ```

use std::time::Duration;

/// Implement Error and Display traits for the specified type.
///
/// After the type define the format string and any arguments it should
/// reference after `self =>` (to abide by macro hygiene rules).
macro_rules! impl_error_display {
    (
        $name:path,
        $self:ident =>
        $display:literal
        $(,
            $($arg:expr),+
        )?
    ) => {
        impl std::error::Error for $name {}

        impl std::fmt::Display for $name {
            fn fmt(&$self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    $display
                    $(,
                        $($arg),+
                    )?
                )
            }
        }
    };
}

/// Define error enums that contain concrete error types (not other error enums).
///
/// From and TryFrom traits will be implemented for the enum and it's underlying
/// errors. The enum's Display implementation will defer to the underlying errors'
/// Display implementations.
///
/// ```compile_fail
/// # // This fails to compile because the macro is not exported.
/// error_enum!{
///     #[non_exhaustive]
///     pub enum ThisError {
///         VariantA(A),
///         VariantB(B),
///         // ...
///     }
/// }
/// ```
macro_rules! error_enum {
    (
        $(#[$attr:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_attr:meta])*
                $variant:ident($inner:path)
            ),+
            $(,)?
        }
    ) => {
        $(
            #[$attr]
        )*
        pub enum $name {
            $(
                $(#[$variant_attr])*
                $variant($inner)
            ),+
        }

        impl std::error::Error for $name {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                match self {
                    $(
                        $name::$variant(e) => Some(e)
                    ),+
                }
            }
        }

        // Defer the display to the inner error type
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        $name::$variant(e) => e.fmt(f)
                    ),+
                }
            }
        }

        // Allow the enum to be convertible from an infallible error
        impl From<std::convert::Infallible> for $name {
            fn from(_: std::convert::Infallible) -> Self {
                unreachable!();
            }
        }

        // Conversions with underlying errors
        $(
            impl From<$inner> for $name {
                fn from(other: $inner) -> Self {
                    $name::$variant(other)
                }
            }

            impl TryFrom<$name> for $inner {
                type Error = $name;
                fn try_from(other: $name) -> Result<Self, Self::Error> {
                    match other {
                        $name::$variant(value) => Ok(value),
                        value => Err(value)
                    }
                }
            }
        )+
    };
}

error_enum! {
    /// Any error returned by this library.
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum ProtocolError {
        /// The port could not be opened.
        SerialDeviceInUseOrDisconnected(SerialDeviceInUseOrDisconnectedError),
        /// Any other transport failure.
        Io(std::io::Error),
        /// The controller did not echo the command back verbatim.
        EchoMismatch(EchoMismatchError),
        /// An expected line never arrived.
        Timeout(TimeoutError),
        /// A line from the controller was longer than any valid reply.
        LineTooLong(LineTooLongError),
        /// A numeric response could not be parsed.
        Parse(ParseError),
        /// A motion parameter was rejected before anything was sent.
        InvalidArgument(InvalidArgumentError),
        /// A command could not be framed.
        InvalidCommand(InvalidCommandError),
        /// An axis did not stop moving in time.
        MotionTimeout(MotionTimeoutError),
    }
}

impl ProtocolError {
    /// A convenience function for determining if the error is due to the
    /// port timing out.
    ///
    /// A [`MotionTimeout`](ProtocolError::MotionTimeout) is not a port
    /// timeout: the controller answered, the axis just kept moving.
    pub fn is_timeout(&self) -> bool {
        match self {
            ProtocolError::Timeout(_) => true,
            ProtocolError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

impl From<serialport::Error> for ProtocolError {
    fn from(other: serialport::Error) -> Self {
        use std::io;

        match other.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::SerialDeviceInUseOrDisconnected(
                SerialDeviceInUseOrDisconnectedError(other.description.into_boxed_str()),
            ),
            serialport::ErrorKind::InvalidInput => ProtocolError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                other.description,
            )),
            serialport::ErrorKind::Unknown => {
                ProtocolError::Io(io::Error::new(io::ErrorKind::Other, other.description))
            }
            serialport::ErrorKind::Io(kind) => {
                ProtocolError::Io(io::Error::new(kind, other.description))
            }
        }
    }
}

/// The specified device is either disconnected or already in use by another process.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SerialDeviceInUseOrDisconnectedError(Box<str>);

impl_error_display! {
    SerialDeviceInUseOrDisconnectedError,
    self =>
    "the specified device is either disconnected or already in use by another process: {}", self.0
}

/// The first line read after a command was not the command itself.
///
/// The command was still transmitted, so the controller may have acted on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EchoMismatchError(Box<(Box<str>, Box<str>)>);

impl_error_display! {
    EchoMismatchError,
    self => "command echo mismatch: {:?} -> {:?}", self.sent(), self.echoed()
}

impl EchoMismatchError {
    pub(crate) fn new(sent: &str, echoed: &str) -> Self {
        EchoMismatchError(Box::new((sent.into(), echoed.into())))
    }

    /// The command that was sent.
    pub fn sent(&self) -> &str {
        &self.0 .0
    }

    /// The line that came back in place of the echo.
    pub fn echoed(&self) -> &str {
        &self.0 .1
    }
}

/// The line a read was waiting for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Awaiting {
    /// The echo of the command.
    Echo,
    /// The prompt line that precedes a reply.
    Prompt,
    /// The reply itself.
    Reply,
    /// A line of a parameter dump.
    DumpLine,
}

impl std::fmt::Display for Awaiting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Awaiting::Echo => "echo",
            Awaiting::Prompt => "prompt",
            Awaiting::Reply => "reply",
            Awaiting::DumpLine => "parameter dump line",
        })
    }
}

/// An expected line did not arrive before the read deadline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeoutError(Box<(Box<str>, Awaiting)>);

impl_error_display! {
    TimeoutError,
    self => "timed out waiting for the {} to {:?}", self.awaiting(), self.command()
}

impl TimeoutError {
    pub(crate) fn new(command: &str, awaiting: Awaiting) -> Self {
        TimeoutError(Box::new((command.into(), awaiting)))
    }

    /// The command whose response was being read.
    pub fn command(&self) -> &str {
        &self.0 .0
    }

    /// What was being waited for.
    pub fn awaiting(&self) -> Awaiting {
        self.0 .1
    }
}

/// The controller sent more than the longest allowed line without ending it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineTooLongError(Box<(Box<str>, usize)>);

impl_error_display! {
    LineTooLongError,
    self => "reply to {:?} exceeded {} bytes without a line ending", self.command(), self.limit()
}

impl LineTooLongError {
    pub(crate) fn new(command: &str, limit: usize) -> Self {
        LineTooLongError(Box::new((command.into(), limit)))
    }

    /// The command whose response was being read.
    pub fn command(&self) -> &str {
        &self.0 .0
    }

    /// The longest line that would have been accepted.
    pub fn limit(&self) -> usize {
        self.0 .1
    }
}

/// A response that should have been an integer was not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParseError(Box<(Box<str>, Box<str>)>);

impl_error_display! {
    ParseError,
    self => "expected an integer in reply to {:?}, got {:?}", self.command(), self.response()
}

impl ParseError {
    pub(crate) fn new(command: &str, response: &str) -> Self {
        ParseError(Box::new((command.into(), response.into())))
    }

    /// The command that was answered.
    pub fn command(&self) -> &str {
        &self.0 .0
    }

    /// The response that could not be parsed.
    pub fn response(&self) -> &str {
        &self.0 .1
    }
}

/// A motion parameter was not an integer the controller can represent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvalidArgumentError(Box<(&'static str, Box<str>)>);

impl_error_display! {
    InvalidArgumentError,
    self => "invalid {}: {} is not a 32-bit integer", self.parameter(), self.value()
}

impl InvalidArgumentError {
    pub(crate) fn new<T: std::fmt::Display>(parameter: &'static str, value: T) -> Self {
        InvalidArgumentError(Box::new((parameter, value.to_string().into_boxed_str())))
    }

    /// The name of the rejected parameter.
    pub fn parameter(&self) -> &'static str {
        self.0 .0
    }

    /// The rejected value, formatted.
    pub fn value(&self) -> &str {
        &self.0 .1
    }
}

/// A command could not be written as a single frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvalidCommandError(Box<(Box<str>, &'static str)>);

impl_error_display! {
    InvalidCommandError,
    self => "cannot send {:?}: {}", self.command(), self.reason()
}

impl InvalidCommandError {
    pub(crate) fn new(command: &str, reason: &'static str) -> Self {
        InvalidCommandError(Box::new((command.into(), reason)))
    }

    /// The rejected command.
    pub fn command(&self) -> &str {
        &self.0 .0
    }

    /// Why it was rejected.
    pub fn reason(&self) -> &'static str {
        self.0 .1
    }
}

/// An axis was still moving when the motion deadline passed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MotionTimeoutError(Box<(Box<str>, Duration)>);

impl_error_display! {
    MotionTimeoutError,
    self => "axis {:?} still moving after {:?}", self.address(), self.timeout()
}

impl MotionTimeoutError {
    pub(crate) fn new(address: &str, timeout: Duration) -> Self {
        MotionTimeoutError(Box::new((address.into(), timeout)))
    }

    /// The address of the axis.
    pub fn address(&self) -> &str {
        &self.0 .0
    }

    /// How long the wait lasted.
    pub fn timeout(&self) -> Duration {
        self.0 .1
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use static_assertions::{assert_impl_all, const_assert};

    assert_impl_all!(ProtocolError: From<std::io::Error>);
    assert_impl_all!(ProtocolError: From<EchoMismatchError>);
    assert_impl_all!(ProtocolError: From<TimeoutError>);
    assert_impl_all!(ProtocolError: From<LineTooLongError>);
    assert_impl_all!(ProtocolError: From<ParseError>);
    assert_impl_all!(ProtocolError: From<InvalidArgumentError>);
    assert_impl_all!(ProtocolError: From<InvalidCommandError>);
    assert_impl_all!(ProtocolError: From<MotionTimeoutError>);
    assert_impl_all!(ProtocolError: From<serialport::Error>);
    assert_impl_all!(TimeoutError: TryFrom<ProtocolError>);
    assert_impl_all!(ProtocolError: Send, Sync);

    // Keep the common `Result<T, ProtocolError>` small.
    const_assert!(std::mem::size_of::<ProtocolError>() <= 24);

    #[test]
    fn is_timeout() {
        let err: ProtocolError = TimeoutError::new("MV", Awaiting::Reply).into();
        assert!(err.is_timeout());
        let err: ProtocolError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(err.is_timeout());
        let err: ProtocolError = MotionTimeoutError::new("1", Duration::from_secs(1)).into();
        assert!(!err.is_timeout());
        let err: ProtocolError = ParseError::new("MV", "x").into();
        assert!(!err.is_timeout());
        let err: ProtocolError = LineTooLongError::new("PR AL", 256).into();
        assert!(!err.is_timeout());
    }

    #[test]
    fn display() {
        let err = EchoMismatchError::new("P=1", "P=?");
        assert_eq!(err.to_string(), r#"command echo mismatch: "P=1" -> "P=?""#);
        let err = TimeoutError::new("PR P", Awaiting::Prompt);
        assert_eq!(err.to_string(), r#"timed out waiting for the prompt to "PR P""#);
        let err = InvalidArgumentError::new("position", 3.5);
        assert_eq!(err.to_string(), "invalid position: 3.5 is not a 32-bit integer");
    }

    #[test]
    fn try_from_round_trips_the_variant() {
        let err: ProtocolError = ParseError::new("1MV", "x").into();
        let err = TimeoutError::try_from(err).unwrap_err();
        let parse = ParseError::try_from(err).unwrap();
        assert_eq!(parse.response(), "x");
    }
}
