//! Byte-level scanning of macro references.
//!
//! Classification is ASCII-only and locale independent; multi-byte UTF-8
//! sequences are never split because every delimiter is ASCII.

use std::ops::Range;

use crate::error::MacroError;

/// Space or tab
pub const fn is_blank(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

/// Newline or carriage return
pub const fn is_eol(c: u8) -> bool {
    c == b'\n' || c == b'\r'
}

/// Check if a byte can start a definable macro name (letter or underscore)
pub const fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

/// Check if a byte can continue a macro name (letter, digit, or underscore)
pub const fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Index of the `close` matching the `open` at `start`
///
/// Backslash-escaped bytes never count toward nesting.
pub fn match_delim(s: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut level = 0usize;
    let mut i = start;
    while i < s.len() {
        let c = s[i];
        if c == b'\\' {
            i += 2;
            continue;
        }
        if c == close {
            level = level.saturating_sub(1);
            if level == 0 {
                return Some(i);
            }
        } else if c == open {
            level += 1;
        }
        i += 1;
    }
    None
}

/// A parsed `%name`, `%{...}` or `%(...)` reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Head {
    /// `%(...)`: the command span and where scanning resumes
    Shell { command: Range<usize>, end: usize },
    /// `%name` or `%{...}`
    Macro(MacroHead),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MacroHead {
    pub negate: bool,
    pub check_exists: bool,
    pub braced: bool,
    pub name: Range<usize>,
    /// Text after `:` in `%{name:payload}`
    pub payload: Option<Range<usize>>,
    /// Text following the name: rest of input for `%name`, rest of the
    /// braces for `%{name ...}`
    pub tail: Range<usize>,
    /// Argument text for parameterized macros, and where scanning resumes
    /// when it is consumed
    pub args: Option<(Range<usize>, usize)>,
    /// Where scanning resumes when no arguments are consumed
    pub end: usize,
}

fn skip_prefixes(s: &[u8], mut i: usize, negate: &mut bool, check_exists: &mut bool) -> usize {
    while let Some(&c) = s.get(i) {
        match c {
            b'!' => *negate = !*negate,
            b'?' => *check_exists = true,
            _ => break,
        }
        i += 1;
    }
    i
}

/// Parse the reference whose `%` sits just before `pos`
pub(crate) fn parse_head(s: &[u8], pos: usize) -> Result<Head, MacroError> {
    let mut negate = false;
    let mut check_exists = false;

    match s.get(pos) {
        Some(&b'(') => {
            let close =
                match_delim(s, pos, b'(', b')').ok_or_else(|| MacroError::unterminated(b'(', &s[pos..]))?;
            Ok(Head::Shell {
                command: pos + 1..close,
                end: close + 1,
            })
        }
        Some(&b'{') => {
            let close =
                match_delim(s, pos, b'{', b'}').ok_or_else(|| MacroError::unterminated(b'{', &s[pos..]))?;
            let f = skip_prefixes(s, pos + 1, &mut negate, &mut check_exists);
            let mut fe = f;
            while fe < close && s[fe] != b':' && !is_blank(s[fe]) {
                fe += 1;
            }
            let (payload, args) = match s.get(fe) {
                Some(&b':') if fe < close => (Some(fe + 1..close), None),
                Some(&c) if fe < close && is_blank(c) => (None, Some((fe..close, close + 1))),
                _ => (None, None),
            };
            Ok(Head::Macro(MacroHead {
                negate,
                check_exists,
                braced: true,
                name: f..fe,
                payload,
                tail: fe..close,
                args,
                end: close + 1,
            }))
        }
        _ => {
            let f = skip_prefixes(s, pos, &mut negate, &mut check_exists);
            let mut fe = f;
            if s.get(fe) == Some(&b'-') {
                fe += 1;
            }
            while s.get(fe).is_some_and(|&c| is_name_char(c)) {
                fe += 1;
            }
            match s.get(fe) {
                Some(&b'*') => {
                    fe += 1;
                    if s.get(fe) == Some(&b'*') {
                        fe += 1;
                    }
                }
                Some(&b'#') => fe += 1,
                _ => {}
            }
            let args = match s.get(fe) {
                Some(&c) if is_blank(c) => {
                    let eol = s[fe..]
                        .iter()
                        .position(|&c| c == b'\n')
                        .map_or(s.len(), |n| fe + n);
                    Some((fe..eol, (eol + 1).min(s.len())))
                }
                _ => None,
            };
            Ok(Head::Macro(MacroHead {
                negate,
                check_exists,
                braced: false,
                name: f..fe,
                payload: None,
                tail: fe..s.len(),
                args,
                end: fe,
            }))
        }
    }
}
