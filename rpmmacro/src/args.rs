//! Argument binding for parameterized macros.
//!
//! An invocation such as `%setup -q -n foo bar` is split into words, the
//! words are scanned against the macro's getopt-style option string, and the
//! result becomes a set of short-lived macros:
//!
//! | Macro     | Value                                              |
//! |-----------|----------------------------------------------------|
//! | `%0`      | the macro name                                     |
//! | `%**`     | every argument word, options included              |
//! | `%-f`     | `-f`, or `-f value` when the option takes a value  |
//! | `%-f*`    | the option value                                   |
//! | `%#`      | 1 + number of positional words                     |
//! | `%1`...   | positional words after option parsing              |
//! | `%*`      | positional words joined with single spaces         |

use crate::error::MacroError;
use crate::scan::{is_blank, is_eol};

/// A single macro binding produced for an invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Binding {
    pub name: String,
    pub body: String,
}

impl Binding {
    fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArgKind {
    Flag,
    Required,
    Optional,
}

/// A parsed getopt option string
struct OptSpec<'a> {
    letters: &'a [u8],
    /// Stop at the first positional word instead of permuting
    posix: bool,
}

impl<'a> OptSpec<'a> {
    fn parse(opts: &'a str) -> Self {
        let mut letters = opts.as_bytes();
        let mut posix = false;
        while let Some((&first, rest)) = letters.split_first() {
            match first {
                b'+' => posix = true,
                b'-' | b':' => {}
                _ => break,
            }
            letters = rest;
        }
        Self { letters, posix }
    }

    fn lookup(&self, c: u8) -> Option<ArgKind> {
        if c == b':' || !c.is_ascii() {
            return None;
        }
        let i = self.letters.iter().position(|&l| l == c)?;
        Some(match (self.letters.get(i + 1), self.letters.get(i + 2)) {
            (Some(b':'), Some(b':')) => ArgKind::Optional,
            (Some(b':'), _) => ArgKind::Required,
            _ => ArgKind::Flag,
        })
    }
}

/// Options found by the scan, and the words left over
#[derive(Debug, Default, PartialEq, Eq)]
struct Parsed {
    options: Vec<(char, Option<String>)>,
    positional: Vec<String>,
}

/// getopt over a local argv; there is no process-wide cursor
fn getopt(name: &str, opts: &str, words: &[&str]) -> Result<Parsed, MacroError> {
    let spec = OptSpec::parse(opts);
    let mut parsed = Parsed::default();
    let mut i = 0;

    while i < words.len() {
        let word = words[i];
        i += 1;
        if word == "--" {
            parsed.positional.extend(words[i..].iter().map(|w| w.to_string()));
            break;
        }
        let Some(cluster) = word.strip_prefix('-').filter(|c| !c.is_empty()) else {
            parsed.positional.push(word.to_string());
            if spec.posix {
                parsed.positional.extend(words[i..].iter().map(|w| w.to_string()));
                break;
            }
            continue;
        };

        let bytes = cluster.as_bytes();
        let mut j = 0;
        while j < bytes.len() {
            let c = bytes[j];
            j += 1;
            let kind = spec.lookup(c).ok_or_else(|| MacroError::UnknownOption {
                option: char::from(c),
                name: name.to_string(),
                opts: opts.to_string(),
            })?;
            match kind {
                ArgKind::Flag => parsed.options.push((char::from(c), None)),
                ArgKind::Required | ArgKind::Optional => {
                    let attached = &cluster[j..];
                    let value = if !attached.is_empty() {
                        Some(attached.to_string())
                    } else if kind == ArgKind::Required {
                        let next = words.get(i).ok_or_else(|| MacroError::MissingArgument {
                            option: char::from(c),
                            name: name.to_string(),
                            opts: opts.to_string(),
                        })?;
                        i += 1;
                        Some(next.to_string())
                    } else {
                        None
                    };
                    parsed.options.push((char::from(c), value));
                    break;
                }
            }
        }
    }
    Ok(parsed)
}

/// Split invocation text into words on blanks and newlines
pub(crate) fn split_words(raw: &str) -> Vec<&str> {
    raw.split(|c: char| c.is_ascii() && (is_blank(c as u8) || is_eol(c as u8)))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Bindings for `name` invoked with the argument text `raw`
pub(crate) fn bind_args(name: &str, opts: &str, raw: &str) -> Result<Vec<Binding>, MacroError> {
    let words = split_words(raw);
    let parsed = getopt(name, opts, &words)?;

    let mut out = vec![Binding::new("0", name), Binding::new("**", words.join(" "))];
    for (letter, value) in parsed.options {
        match value {
            Some(v) => {
                out.push(Binding::new(format!("-{letter}"), format!("-{letter} {v}")));
                out.push(Binding::new(format!("-{letter}*"), v));
            }
            None => out.push(Binding::new(format!("-{letter}"), format!("-{letter}"))),
        }
    }
    out.push(Binding::new("#", (parsed.positional.len() + 1).to_string()));
    for (n, word) in parsed.positional.iter().enumerate() {
        out.push(Binding::new((n + 1).to_string(), word.clone()));
    }
    out.push(Binding::new("*", parsed.positional.join(" ")));
    Ok(out)
}

/// Bindings for a parameterized macro invoked without argument text
pub(crate) fn default_bindings(name: &str) -> Vec<Binding> {
    vec![
        Binding::new("**", ""),
        Binding::new("*", ""),
        Binding::new("#", "1"),
        Binding::new("0", name),
    ]
}
