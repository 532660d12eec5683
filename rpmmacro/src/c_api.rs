use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::rc::Rc;

use crate::config::{MacroConfig, MessageKind};
use crate::context::MacroContext;

/// C-friendly configuration struct for an expansion
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct rpmmacro_config {
    /// Recursion limit
    pub recursion_limit: usize,
    /// Destination buffer size, terminator included
    pub capacity: usize,
    /// Non-zero to trace every macro
    pub trace: c_int,
    /// Message handler callback (optional, can be null)
    ///
    /// The first argument is 0 for `%echo`, 1 for `%warn`, 2 for trace lines
    /// and 3 for `%dump`.
    pub message_handler: Option<extern "C" fn(c_int, *const c_char)>,
}

/// Typedef for rpmmacro_config
#[allow(non_camel_case_types)]
pub type rpmmacro_config_t = rpmmacro_config;

fn kind_code(kind: MessageKind) -> c_int {
    match kind {
        MessageKind::Echo => 0,
        MessageKind::Warning => 1,
        MessageKind::Trace => 2,
        MessageKind::Dump => 3,
    }
}

/// Convert C config to Rust config with validation
fn macro_config_from_c(config: &rpmmacro_config_t) -> Result<MacroConfig, &'static str> {
    if config.recursion_limit == 0 || config.recursion_limit > 10000 {
        return Err("Invalid recursion_limit");
    }
    if config.capacity < 2 {
        return Err("Invalid capacity");
    }
    let mut rust_config = MacroConfig::default()
        .with_recursion_limit(config.recursion_limit)
        .with_capacity(config.capacity)
        .with_trace(config.trace != 0);
    if let Some(handler) = config.message_handler {
        rust_config = rust_config.with_message_handler(Rc::new(move |kind, msg: &str| {
            let Ok(c_msg) = CString::new(msg) else {
                return;
            };
            handler(kind_code(kind), c_msg.as_ptr());
        }));
    }
    Ok(rust_config)
}

/// Borrow a C string as UTF-8, or `None` for null or invalid input
///
/// # Safety
/// `s` must be null or point to a valid null-terminated C string.
unsafe fn str_arg<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

/// Create a new, empty macro context for C API
///
/// # Safety
/// This function is safe to call from C code.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rpmmacro_context_new() -> *mut MacroContext {
    Box::into_raw(Box::new(MacroContext::new()))
}

/// Free a macro context created by C API
///
/// # Safety
/// The pointer must have been created by `rpmmacro_context_new` and not already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rpmmacro_context_free(mc: *mut MacroContext) {
    if !mc.is_null() {
        unsafe {
            drop(Box::from_raw(mc));
        }
    }
}

/// Define a macro from a `name(opts) body` directive (C API)
///
/// Returns 0 on success and -1 on invalid arguments or a malformed directive.
///
/// # Safety
/// - The `mc` pointer must be valid and created by `rpmmacro_context_new`
/// - The `directive` pointer must point to a valid null-terminated C string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rpmmacro_define(
    mc: *mut MacroContext,
    directive: *const c_char,
    level: c_int,
) -> c_int {
    if mc.is_null() {
        return -1;
    }
    let Some(directive) = (unsafe { str_arg(directive) }) else {
        return -1;
    };
    let context = unsafe { &mut *mc };
    match crate::define_macro(context, directive, level) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Pop the visible definition of a macro (C API)
///
/// Returns 0 on success (including for unknown names) and -1 on invalid arguments.
///
/// # Safety
/// - The `mc` pointer must be valid and created by `rpmmacro_context_new`
/// - The `name` pointer must point to a valid null-terminated C string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rpmmacro_undefine(mc: *mut MacroContext, name: *const c_char) -> c_int {
    if mc.is_null() {
        return -1;
    }
    let Some(name) = (unsafe { str_arg(name) }) else {
        return -1;
    };
    unsafe { &mut *mc }.undefine(name);
    0
}

/// Expand text and return the result (C API)
///
/// Returns null if any argument is invalid or the expansion fails.
///
/// # Safety
/// - The `mc` pointer must be valid and created by `rpmmacro_context_new`
/// - The `input` pointer must point to a valid null-terminated C string
/// - The `config` pointer must be null (defaults) or point to a valid config
/// - The returned string must be freed with `rpmmacro_free_result`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rpmmacro_expand(
    mc: *mut MacroContext,
    input: *const c_char,
    config: *const rpmmacro_config_t,
) -> *mut c_char {
    if mc.is_null() {
        return std::ptr::null_mut();
    }
    let Some(input) = (unsafe { str_arg(input) }) else {
        return std::ptr::null_mut();
    };
    let rust_config = if config.is_null() {
        MacroConfig::default()
    } else {
        match macro_config_from_c(unsafe { &*config }) {
            Ok(c) => c,
            Err(_) => return std::ptr::null_mut(), // Invalid config
        }
    };
    let context = unsafe { &mut *mc };
    match context.expand_with(input, &rust_config) {
        Ok(result) => match CString::new(result) {
            Ok(cstr) => cstr.into_raw(),
            Err(_) => std::ptr::null_mut(),
        },
        Err(e) => {
            tracing::debug!(error = %e, "expansion failed");
            std::ptr::null_mut()
        }
    }
}

/// Free a result string returned by C API
///
/// # Safety
/// The pointer must have been returned by `rpmmacro_expand` and not already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rpmmacro_free_result(result: *mut c_char) {
    if !result.is_null() {
        unsafe {
            drop(CString::from_raw(result));
        }
    }
}
