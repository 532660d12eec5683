#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # RPM Macro Library
//!
//! This library implements the macro language used by RPM spec files and
//! macro configuration files. Text is scanned for `%` references which are
//! replaced, recursively, by the bodies of named macros.
//!
//! ## Features
//!
//! - Shadowing macro tables (`%define`, `%global`, `%undefine`)
//! - Parameterized macros with getopt-style options (`%name -q -n foo arg`)
//! - Conditional forms (`%{?name:...}`, `%{!?name:...}`, `%{-f:...}`)
//! - Shell escapes (`%(command)`)
//! - Builtins such as `%{basename:...}`, `%{suffix:...}`, `%{expand:...}`
//! - Macro file loading and path helpers
//! - C FFI for integration with other languages
//!
//! ## Example
//!
//! ```rust
//! use rpmmacro::{MacroContext, MacroLevel};
//!
//! let mut mc = MacroContext::new();
//! mc.define("name", None, "hello", MacroLevel::SPEC);
//! mc.define("version", None, "2.10", MacroLevel::SPEC);
//!
//! let result = mc.expand("%{name}-%{version}.tar.gz").unwrap();
//! assert_eq!(result, "hello-2.10.tar.gz");
//! ```

mod args;
mod buffer;
mod builtins;
mod c_api;
mod compress;
mod config;
mod context;
mod engine;
mod error;
mod files;
mod macro_def;
mod path;
mod scan;
mod trace;

pub use builtins::url_path;
pub use compress::{Compression, detect_compression};
pub use config::{DEFAULT_CAPACITY, MAX_MACRO_DEPTH, MacroConfig, MessageHandler, MessageKind};
pub use context::{MacroContext, MacroSlot};
pub use error::MacroError;
pub use files::{LogicalLines, init_macros, load_macros};
pub use macro_def::{MacroEntry, MacroLevel};
pub use path::{clean_path, expand_path, gen_path};

use std::sync::{Mutex, MutexGuard, PoisonError};

use lazy_static::lazy_static;

lazy_static! {
    static ref GLOBAL_CONTEXT: Mutex<MacroContext> = Mutex::new(MacroContext::new());
    static ref CLI_CONTEXT: Mutex<MacroContext> = Mutex::new(MacroContext::new());
}

/// The process-wide default macro table
pub fn global_context() -> MutexGuard<'static, MacroContext> {
    GLOBAL_CONTEXT.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The process-wide table of command line definitions
pub fn cli_context() -> MutexGuard<'static, MacroContext> {
    CLI_CONTEXT.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Expand `text` into a destination of `capacity` bytes
///
/// # Errors
/// Returns `MacroError` if expansion fails or the result does not fit.
pub fn expand_macros(mc: &mut MacroContext, text: &str, capacity: usize) -> Result<String, MacroError> {
    mc.expand_with(text, &MacroConfig::default().with_capacity(capacity))
}

/// Define a macro from a `name(opts) body` directive, without expanding the body
///
/// This is the form used by macro files and `--define`.
///
/// # Errors
/// Returns `MacroError` if the name is illegal, the option list is not
/// terminated or the body is empty.
pub fn define_macro(mc: &mut MacroContext, text: &str, level: i32) -> Result<(), MacroError> {
    let (def, _) = engine::parse_define(text.as_bytes())?;
    mc.define(&def.name, def.opts.as_deref(), &def.body, level);
    Ok(())
}

/// Concatenate `parts` and expand the result
///
/// # Errors
/// Returns `MacroError` if expansion fails.
pub fn expand(mc: &mut MacroContext, parts: &[&str]) -> Result<String, MacroError> {
    mc.expand(&parts.concat())
}

/// Expand `text` and interpret the result as a number
///
/// `Y`/`y` is 1, `N`/`n` is 0, otherwise the whole result must parse as a
/// C integer literal (decimal, `0x` hex or leading-zero octal). Anything
/// else, including an unexpanded `%` reference or a failed expansion, is 0.
pub fn expand_numeric(mc: &mut MacroContext, text: &str) -> i64 {
    let value = match mc.expand(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, text, "numeric expansion failed");
            return 0;
        }
    };
    match value.as_bytes().first() {
        None | Some(b'%') => 0,
        Some(b'Y' | b'y') => 1,
        Some(b'N' | b'n') => 0,
        Some(_) => parse_c_integer(&value).unwrap_or(0),
    }
}

fn parse_c_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    if digits.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn define_macro_directive() {
        let mut mc = MacroContext::new();
        define_macro(&mut mc, "_libdir %{_prefix}/lib", MacroLevel::CMDLINE).unwrap();
        assert_eq!(mc.get_body("_libdir"), Some("%{_prefix}/lib"));
        assert_eq!(mc.get("_libdir").map(MacroEntry::level), Some(MacroLevel::CMDLINE));

        define_macro(&mut mc, "with_opts(qn:) %{-n*}", 0).unwrap();
        assert_eq!(mc.get("with_opts").and_then(MacroEntry::opts), Some("qn:"));

        assert!(matches!(
            define_macro(&mut mc, "ab body", 0),
            Err(MacroError::IllegalName { .. })
        ));
    }

    #[test]
    fn expand_concatenates_parts() {
        let mut mc = MacroContext::new();
        mc.define("_prefix", None, "/usr", 0);
        assert_eq!(expand(&mut mc, &["%{_prefix}", "/bin", ""]).unwrap(), "/usr/bin");
    }

    #[test]
    fn expand_macros_respects_capacity() {
        let mut mc = MacroContext::new();
        mc.define("long", None, "0123456789", 0);
        assert_eq!(expand_macros(&mut mc, "%long", 11).unwrap(), "0123456789");
        assert!(matches!(
            expand_macros(&mut mc, "%long", 10),
            Err(MacroError::BufferOverflow)
        ));
    }

    #[test]
    fn numeric_expansion() {
        let mut mc = MacroContext::new();
        mc.define("yes", None, "Yes", 0);
        mc.define("no", None, "no", 0);
        mc.define("jobs", None, "16", 0);
        mc.define("mode", None, "0755", 0);
        mc.define("mask", None, "0x1F", 0);
        mc.define("junk", None, "12abc", 0);
        assert_eq!(expand_numeric(&mut mc, "%yes"), 1);
        assert_eq!(expand_numeric(&mut mc, "%no"), 0);
        assert_eq!(expand_numeric(&mut mc, "%jobs"), 16);
        assert_eq!(expand_numeric(&mut mc, "-%jobs"), -16);
        assert_eq!(expand_numeric(&mut mc, "%mode"), 0o755);
        assert_eq!(expand_numeric(&mut mc, "%mask"), 31);
        assert_eq!(expand_numeric(&mut mc, "%junk"), 0);
        assert_eq!(expand_numeric(&mut mc, "%undefined"), 0);
        assert_eq!(expand_numeric(&mut mc, "%{error:boom}"), 0);
        assert_eq!(expand_numeric(&mut mc, ""), 0);
    }

    #[test]
    fn numeric_expansion_takes_one_sign() {
        let mut mc = MacroContext::new();
        assert_eq!(expand_numeric(&mut mc, "+5"), 5);
        assert_eq!(expand_numeric(&mut mc, "+-5"), 0);
        assert_eq!(expand_numeric(&mut mc, "-+5"), 0);
        assert_eq!(expand_numeric(&mut mc, "0x-5"), 0);
    }

    #[test]
    fn shared_contexts_are_independent() {
        global_context().define("_shared_global", None, "g", MacroLevel::DEFAULT);
        cli_context().define("_shared_cli", None, "c", MacroLevel::CMDLINE);
        assert!(global_context().is_defined("_shared_global"));
        assert!(!global_context().is_defined("_shared_cli"));

        let cli = cli_context().clone();
        cli.load_into(&mut global_context(), MacroLevel::CMDLINE);
        assert_eq!(global_context().get_body("_shared_cli"), Some("c"));
    }
}
