use std::rc::Rc;

/// Kind of diagnostic text produced by the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// `%echo`
    Echo,
    /// `%warn`
    Warning,
    /// `%trace` lines
    Trace,
    /// `%dump` output
    Dump,
}

/// Type alias for the diagnostic output handler
pub type MessageHandler = Rc<dyn Fn(MessageKind, &str)>;

/// Default maximum nesting of macro expansions
pub const MAX_MACRO_DEPTH: usize = 16;

/// Default expansion buffer size, the classic `BUFSIZ`
pub const DEFAULT_CAPACITY: usize = 8192;

/// Configuration for one expansion
#[derive(Clone)]
pub struct MacroConfig {
    /// Maximum recursion depth for macro expansion
    pub recursion_limit: usize,
    /// Size of the destination buffer, terminator included
    pub capacity: usize,
    /// Print each macro before it is expanded
    pub macro_trace: bool,
    /// Print each expansion result
    pub expand_trace: bool,
    /// Value consulted by `%{verbose:...}`
    pub verbose: bool,
    /// Shell used to run `%(...)`
    pub shell: String,
    /// Receives `%echo`, `%warn`, `%trace` and `%dump` output; stderr if unset
    pub message_handler: Option<MessageHandler>,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            recursion_limit: MAX_MACRO_DEPTH,
            capacity: DEFAULT_CAPACITY,
            macro_trace: false,
            expand_trace: false,
            verbose: false,
            shell: "/bin/sh".to_string(),
            message_handler: None,
        }
    }
}

impl MacroConfig {
    /// Set the maximum recursion depth
    #[must_use]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Set the destination buffer size
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Trace every macro and its expansion
    #[must_use]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.macro_trace = trace;
        self.expand_trace = trace;
        self
    }

    /// Set the verbosity seen by `%{verbose:...}`
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run shell escapes with `shell -c`
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Route diagnostic output to `handler`
    #[must_use]
    pub fn with_message_handler(mut self, handler: MessageHandler) -> Self {
        self.message_handler = Some(handler);
        self
    }

    pub(crate) fn emit(&self, kind: MessageKind, text: &str) {
        match &self.message_handler {
            Some(handler) => handler(kind, text),
            None if matches!(kind, MessageKind::Echo | MessageKind::Warning) => eprintln!("{text}"),
            None => eprint!("{text}"),
        }
    }
}
