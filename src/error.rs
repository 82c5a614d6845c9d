use std::error::Error as ErrorTrait;
use std::fmt::Display;

///
/// Contains information about an error occurence
///
#[derive(Debug)]
pub struct Error {
    /// The type of this error
    pub kind: ErrorKind,
    /// Some errors come with more context
    pub context: Option<String>,
}

impl Error {
    /// An error of `kind` without context.
    pub fn new(kind: ErrorKind) -> Error {
        Error {
            kind,
            context: None,
        }
    }

    ///
    /// An error of `kind` with some context. Dynamic hooks use it to fail a fetch.
    ///
    pub fn new_with_context(kind: ErrorKind, context: impl Display) -> Error {
        Error {
            kind,
            context: Some(context.to_string()),
        }
    }

    ///
    /// Returns `true` if this error was raised while loading a fixture directory.
    ///
    pub fn is_fixture_load(&self) -> bool {
        matches!(self.kind, ErrorKind::FixtureLoad)
    }

    ///
    /// Returns `true` if this error comes from the real HTTP client.
    ///
    pub fn is_fetch(&self) -> bool {
        matches!(self.kind, ErrorKind::Fetch)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (context: {})",
            self.kind.description(),
            self.context.as_deref().unwrap_or("none")
        )
    }
}

impl ErrorTrait for Error {}

///
/// The type of an error
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The fixture directory or one of its files could not be loaded
    FixtureLoad,
    /// A matched fixture could not be turned into a response
    ResponseBuild,
    /// The response body is not a JSON object
    NotJson,
    /// The real HTTP client failed
    Fetch,
    /// The status code is invalid or out of range
    InvalidStatusCode,
    /// The URL can't be parsed
    InvalidUrl,
}

impl ErrorKind {
    fn description(&self) -> &'static str {
        match self {
            ErrorKind::FixtureLoad => "failed to load fixtures",
            ErrorKind::ResponseBuild => "failed to build the mocked response",
            ErrorKind::NotJson => "the response body is not a JSON object",
            ErrorKind::Fetch => "the HTTP request failed",
            ErrorKind::InvalidStatusCode => "invalid status code",
            ErrorKind::InvalidUrl => "invalid url",
        }
    }
}
