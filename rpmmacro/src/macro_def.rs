/// Priority levels at which macros are defined
///
/// Lower levels are more persistent. Levels above [`MacroLevel::GLOBAL`] are
/// expansion depths: bindings made while expanding at depth `n` carry level
/// `n` and are discarded when that expansion returns.
pub struct MacroLevel;

impl MacroLevel {
    /// Built-in defaults
    pub const DEFAULT: i32 = -15;
    /// Definitions read from macro files
    pub const MACROFILES: i32 = -13;
    /// Definitions derived from rc files
    pub const RPMRC: i32 = -11;
    /// Definitions from the command line (`--define`)
    pub const CMDLINE: i32 = -7;
    /// Definitions taken from a tarball
    pub const TARBALL: i32 = -5;
    /// Definitions made by the spec parser
    pub const SPEC: i32 = -3;
    /// Legacy spec definitions
    pub const OLDSPEC: i32 = -1;
    /// `%global`
    pub const GLOBAL: i32 = 0;
}

/// One bound definition on a macro's shadowing stack
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroEntry {
    pub(crate) opts: Option<String>,
    pub(crate) body: String,
    pub(crate) level: i32,
    pub(crate) used: u32,
}

impl MacroEntry {
    pub(crate) fn new(opts: Option<&str>, body: &str, level: i32) -> Self {
        Self {
            opts: opts.map(str::to_string),
            body: body.to_string(),
            level,
            used: 0,
        }
    }

    /// The getopt-style option string, if the macro takes arguments
    #[must_use]
    pub fn opts(&self) -> Option<&str> {
        self.opts.as_deref()
    }

    /// Replacement text
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Level the definition was pushed at
    #[must_use]
    pub fn level(&self) -> i32 {
        self.level
    }

    /// How many times the definition was expanded
    #[must_use]
    pub fn used(&self) -> u32 {
        self.used
    }

    /// Whether the macro binds arguments when invoked
    #[must_use]
    pub fn is_parameterized(&self) -> bool {
        self.opts.is_some()
    }
}
