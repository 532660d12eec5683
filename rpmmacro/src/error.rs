use thiserror::Error;

/// Errors that abort a macro expansion
///
/// Every variant except [`MacroError::Io`] corresponds to the single
/// "bad spec" diagnostic of the classic engine; there is no partial result.
#[derive(Debug, Error)]
pub enum MacroError {
    /// `%{`, `%(` or a `{` body without its closing delimiter
    #[error("Unterminated {delim}: {text}")]
    Unterminated {
        /// The opening delimiter
        delim: char,
        /// The text starting at the delimiter
        text: String,
    },
    /// Macro names must start with a letter or `_` and be at least 3 chars
    #[error("Macro %{name} has illegal name (%{directive})")]
    IllegalName {
        /// The offending name
        name: String,
        /// `define` or `undefine`
        directive: &'static str,
    },
    /// `%define name {...` without the closing brace
    #[error("Macro %{0} has unterminated body")]
    UnterminatedBody(String),
    /// `%define name(opts` without the closing parenthesis
    #[error("Macro %{0} has unterminated opts")]
    UnterminatedOpts(String),
    /// `%define name` with nothing to define
    #[error("Macro %{0} has empty body")]
    EmptyBody(String),
    /// `%global` body could not be expanded
    #[error("Macro %{name} failed to expand")]
    ExpandFailed {
        /// The macro being defined
        name: String,
        /// What went wrong inside the body
        #[source]
        source: Box<MacroError>,
    },
    /// An argument binding hit an option letter the macro does not declare
    #[error("Unknown option {option} in {name}({opts})")]
    UnknownOption {
        /// The option letter
        option: char,
        /// The invoked macro
        name: String,
        /// Its declared option string
        opts: String,
    },
    /// An option declared with `:` was given no value
    #[error("Option -{option} requires an argument in {name}({opts})")]
    MissingArgument {
        /// The option letter
        option: char,
        /// The invoked macro
        name: String,
        /// Its declared option string
        opts: String,
    },
    /// The expansion ran out of destination capacity
    #[error("Target buffer overflow")]
    BufferOverflow,
    /// Nesting exceeded the configured maximum
    #[error("Recursion depth({depth}) greater than max({limit})")]
    RecursionLimit {
        /// Depth that was reached
        depth: usize,
        /// Configured maximum
        limit: usize,
    },
    /// Raised by the `%error` builtin
    #[error("{0}")]
    User(String),
    /// A `%(...)` command could not be run
    #[error("Failed to run shell escape '{command}': {source}")]
    Shell {
        /// The expanded command line
        command: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },
    /// I/O error (e.g., reading a macro file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MacroError {
    /// Whether this is one of the "bad spec" diagnostics
    #[must_use]
    pub fn is_bad_spec(&self) -> bool {
        !matches!(self, MacroError::Io(_))
    }

    pub(crate) fn unterminated(delim: u8, text: &[u8]) -> Self {
        MacroError::Unterminated {
            delim: char::from(delim),
            text: String::from_utf8_lossy(text).into_owned(),
        }
    }
}
