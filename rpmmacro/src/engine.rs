//! The recursive macro evaluator.
//!
//! [`MacroBuf`] holds the state of one top-level expansion: the destination
//! buffer, the current depth and the trace flags. Nested work (macro bodies,
//! payloads of builtins, shell commands) re-enters [`MacroBuf::expand_macro`]
//! on the same state, either appending to the destination or, for payloads
//! that must be post-processed, into a scratch buffer swapped in for the
//! duration of the call.

use std::io::Read;
use std::process::{Command, Stdio};

use crate::args;
use crate::buffer::{ExpansionBuffer, into_string};
use crate::builtins::{Builtin, transform};
use crate::config::{DEFAULT_CAPACITY, MacroConfig, MessageKind};
use crate::context::MacroContext;
use crate::error::MacroError;
use crate::macro_def::MacroLevel;
use crate::scan::{Head, MacroHead, is_blank, is_eol, is_name_char, is_name_start, match_delim, parse_head};
use crate::trace;

/// A `%define` directive split into its parts
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Definition {
    pub name: String,
    pub opts: Option<String>,
    pub body: String,
}

fn skip_blanks(s: &[u8], mut i: usize) -> usize {
    while s.get(i).is_some_and(|&c| is_blank(c)) {
        i += 1;
    }
    i
}

/// Step over a single newline at `i`, if there is one
fn skip_newline(s: &[u8], i: usize) -> usize {
    if s.get(i) == Some(&b'\n') { i + 1 } else { i }
}

fn copy_name(s: &[u8], i: usize) -> (String, usize) {
    let start = skip_blanks(s, i);
    let mut end = start;
    while s.get(end).is_some_and(|&c| is_name_char(c)) {
        end += 1;
    }
    (String::from_utf8_lossy(&s[start..end]).into_owned(), end)
}

fn check_name(name: &str, directive: &'static str) -> Result<(), MacroError> {
    let legal = name.as_bytes().first().is_some_and(|&c| is_name_start(c)) && name.len() > 2;
    if legal {
        Ok(())
    } else {
        Err(MacroError::IllegalName {
            name: name.to_string(),
            directive,
        })
    }
}

/// Parse `name(opts) body` and return the definition and the bytes consumed
///
/// The body runs to the end of the line (a backslash escapes the next byte,
/// so `\` before a newline continues the body) or is a `{...}` group.
pub(crate) fn parse_define(s: &[u8]) -> Result<(Definition, usize), MacroError> {
    let (name, mut i) = copy_name(s, 0);

    let mut opts = None;
    let mut opts_terminated = true;
    if s.get(i) == Some(&b'(') {
        let start = i + 1;
        i = start;
        while s.get(i).is_some_and(|&c| c != b')') {
            i += 1;
        }
        opts_terminated = i < s.len();
        opts = Some(String::from_utf8_lossy(&s[start..i]).into_owned());
        i = (i + 1).min(s.len());
    }

    i = skip_blanks(s, i);
    let body = if s.get(i) == Some(&b'{') {
        let close = match_delim(s, i, b'{', b'}').ok_or_else(|| MacroError::UnterminatedBody(name.clone()))?;
        let body = s[i + 1..close].to_vec();
        i = close + 1;
        body
    } else {
        let mut body = Vec::new();
        while let Some(&c) = s.get(i) {
            if is_eol(c) {
                break;
            }
            if c == b'\\' {
                i += 1;
                match s.get(i) {
                    Some(&escaped) => body.push(escaped),
                    None => break,
                }
            } else {
                body.push(c);
            }
            i += 1;
        }
        while body.last().is_some_and(|&c| is_blank(c) || is_eol(c)) {
            body.pop();
        }
        body
    };
    let consumed = skip_newline(s, i);

    check_name(&name, "define")?;
    if !opts_terminated {
        return Err(MacroError::UnterminatedOpts(name));
    }
    if body.is_empty() {
        return Err(MacroError::EmptyBody(name));
    }
    Ok((
        Definition {
            name,
            opts,
            body: into_string(body),
        },
        consumed,
    ))
}

fn level_of(depth: usize) -> i32 {
    i32::try_from(depth).unwrap_or(i32::MAX)
}

/// Expansion state for one top-level call
pub(crate) struct MacroBuf<'a> {
    mc: &'a mut MacroContext,
    config: &'a MacroConfig,
    out: ExpansionBuffer,
    depth: usize,
    macro_trace: bool,
    expand_trace: bool,
}

impl<'a> MacroBuf<'a> {
    pub(crate) fn new(mc: &'a mut MacroContext, config: &'a MacroConfig) -> Self {
        let sticky = mc.trace;
        Self {
            mc,
            config,
            out: ExpansionBuffer::new(config.capacity),
            depth: 0,
            macro_trace: config.macro_trace || sticky,
            expand_trace: config.expand_trace || sticky,
        }
    }

    /// Expand `src` completely, consuming the state
    pub(crate) fn expand(mut self, src: &[u8]) -> Result<Vec<u8>, MacroError> {
        self.expand_macro(src)?;
        Ok(self.out.into_bytes())
    }

    /// Expand `src` one level deeper, appending to the destination
    fn expand_macro(&mut self, src: &[u8]) -> Result<(), MacroError> {
        self.depth += 1;
        if self.depth > self.config.recursion_limit {
            let err = MacroError::RecursionLimit {
                depth: self.depth,
                limit: self.config.recursion_limit,
            };
            self.depth -= 1;
            self.expand_trace = true;
            return Err(err);
        }

        let mut mark = self.out.len();
        let rc = self.scan(src, &mut mark);
        self.depth -= 1;

        if rc.is_err() || self.expand_trace {
            let from = mark.min(self.out.len());
            let line = trace::expansion_line(self.depth, &self.out.as_bytes()[from..]);
            self.config.emit(MessageKind::Trace, &line);
        }
        rc
    }

    /// Expand `src` into a fresh buffer and return the text
    fn expand_to_scratch(&mut self, src: &[u8]) -> Result<String, MacroError> {
        self.expand_to_scratch_sized(src, self.out.capacity())
    }

    fn expand_to_scratch_sized(&mut self, src: &[u8], capacity: usize) -> Result<String, MacroError> {
        let scratch = ExpansionBuffer::new(capacity);
        let saved = std::mem::replace(&mut self.out, scratch);
        let rc = self.expand_macro(src);
        let scratch = std::mem::replace(&mut self.out, saved);
        rc?;
        Ok(into_string(scratch.into_bytes()))
    }

    fn scan(&mut self, s: &[u8], mark: &mut usize) -> Result<(), MacroError> {
        let mut pos = 0;
        while pos < s.len() {
            let c = s[pos];
            pos += 1;
            if c != b'%' {
                self.out.push(c)?;
                continue;
            }
            if s.get(pos) == Some(&b'%') {
                pos += 1;
                self.out.push(b'%')?;
                continue;
            }

            if self.depth > 1 {
                *mark = self.out.len();
            }
            pos = match parse_head(s, pos)? {
                Head::Shell { command, end } => {
                    if self.macro_trace {
                        self.trace_macro(s, pos, end);
                    }
                    self.shell_escape(&s[command])?;
                    end
                }
                Head::Macro(head) => self.dispatch(s, pos, &head)?,
            };
        }
        Ok(())
    }

    fn trace_macro(&self, s: &[u8], start: usize, end: usize) {
        let line = trace::macro_line(self.depth, s, start, end);
        self.config.emit(MessageKind::Trace, &line);
    }

    /// Handle one `%name`/`%{...}` reference and return where scanning resumes
    fn dispatch(&mut self, s: &[u8], pos: usize, head: &MacroHead) -> Result<usize, MacroError> {
        let raw_name = &s[head.name.clone()];
        if raw_name.is_empty() {
            self.out.push(b'%')?;
            return Ok(head.end);
        }
        if self.macro_trace {
            self.trace_macro(s, pos, head.end);
        }

        if let Some(builtin) = Builtin::lookup(raw_name) {
            return self.builtin(builtin, s, head);
        }

        let name = String::from_utf8_lossy(raw_name).into_owned();
        let payload = head.payload.clone().filter(|g| !g.is_empty()).map(|g| &s[g]);

        if name.starts_with('-') {
            let found = self.mc.find_mut(&name).map(|slot| {
                let me = slot.top_mut();
                me.used += 1;
                me.body.clone()
            });
            self.conditional(found, head.negate, payload)?;
            return Ok(head.end);
        }

        if head.check_exists {
            let found = self.mc.get_body(&name).map(str::to_string);
            self.conditional(found, head.negate, payload)?;
            return Ok(head.end);
        }

        let Some(entry) = self.mc.get(&name) else {
            // unknown macros are copied through untouched
            self.out.push(b'%')?;
            return Ok(pos);
        };
        let opts = entry.opts.clone();
        let body = entry.body.clone();

        let mut next = head.end;
        let level = level_of(self.depth + 1);
        if let Some(opts) = &opts {
            let bindings = match &head.args {
                Some((text, end)) => {
                    next = *end;
                    args::bind_args(&name, opts, &String::from_utf8_lossy(&s[text.clone()]))?
                }
                None => args::default_bindings(&name),
            };
            for binding in bindings {
                self.mc.define(&binding.name, None, &binding.body, level);
            }
        }

        let rc = if body.is_empty() {
            Ok(())
        } else {
            self.expand_macro(body.as_bytes())
        };
        if rc.is_ok() && !body.is_empty() {
            if let Some(slot) = self.mc.find_mut(&name) {
                slot.top_mut().used += 1;
            }
        }
        if opts.is_some() {
            self.mc.free_args(level);
        }
        rc?;
        Ok(next)
    }

    /// Shared tail of the `%{-f...}` and `%{?name...}` forms
    fn conditional(&mut self, found: Option<String>, negate: bool, payload: Option<&[u8]>) -> Result<(), MacroError> {
        if found.is_some() == negate {
            return Ok(());
        }
        if let Some(payload) = payload {
            self.expand_macro(payload)
        } else if let Some(body) = found.filter(|b| !b.is_empty()) {
            self.expand_macro(body.as_bytes())
        } else {
            Ok(())
        }
    }

    fn builtin(&mut self, builtin: Builtin, s: &[u8], head: &MacroHead) -> Result<usize, MacroError> {
        // `%define` and friends read the rest of the line for a bare
        // reference, and the brace interior otherwise
        let directive = &s[head.tail.clone()];
        let after = |consumed: usize| {
            if head.braced {
                head.end
            } else {
                head.tail.start + consumed
            }
        };

        match builtin {
            Builtin::Global => {
                let consumed = self.do_define(directive, MacroLevel::GLOBAL, true)?;
                Ok(after(consumed))
            }
            Builtin::Define => {
                let consumed = self.do_define(directive, level_of(self.depth), false)?;
                Ok(after(consumed))
            }
            Builtin::Undefine => {
                let (name, end) = copy_name(directive, 0);
                let consumed = skip_newline(directive, end);
                check_name(&name, "undefine")?;
                self.mc.undefine(&name);
                Ok(after(consumed))
            }
            Builtin::Echo | Builtin::Warn | Builtin::Error => {
                let msg = match head.payload.clone().filter(|g| !g.is_empty()) {
                    Some(g) => &s[g],
                    None => &s[head.name.clone()],
                };
                let msg = self.expand_to_scratch(msg)?;
                match builtin {
                    Builtin::Error => Err(MacroError::User(msg)),
                    Builtin::Warn => {
                        tracing::warn!("{msg}");
                        self.config.emit(MessageKind::Warning, &msg);
                        Ok(head.end)
                    }
                    _ => {
                        self.config.emit(MessageKind::Echo, &msg);
                        Ok(head.end)
                    }
                }
            }
            Builtin::Trace => {
                let on = !head.negate;
                self.macro_trace = on;
                self.expand_trace = on;
                if self.depth == 1 {
                    self.mc.trace = on;
                }
                Ok(head.end)
            }
            Builtin::Dump => {
                self.config.emit(MessageKind::Dump, &self.mc.dump());
                Ok(skip_newline(s, head.end))
            }
            _ => {
                debug_assert!(builtin.is_transform());
                let buf = match head.payload.clone() {
                    Some(g) => self.expand_to_scratch(&s[g])?,
                    None => String::new(),
                };
                if let Some(rewritten) = transform(builtin, head.negate, self.config.verbose, &buf) {
                    self.expand_macro(rewritten.as_bytes())?;
                }
                Ok(head.end)
            }
        }
    }

    fn do_define(&mut self, text: &[u8], level: i32, expand_body: bool) -> Result<usize, MacroError> {
        let (def, consumed) = parse_define(text)?;
        let body = if expand_body {
            self.expand_to_scratch(def.body.as_bytes())
                .map_err(|source| MacroError::ExpandFailed {
                    name: def.name.clone(),
                    source: Box::new(source),
                })?
        } else {
            def.body
        };
        self.mc.define(&def.name, def.opts.as_deref(), &body, level);
        Ok(consumed)
    }

    /// Run `cmd` through the shell and append its output
    ///
    /// The command line has its own scratch buffer; the output is read only
    /// until the destination is full, then the child is killed.
    fn shell_escape(&mut self, cmd: &[u8]) -> Result<(), MacroError> {
        let command = self.expand_to_scratch_sized(cmd, DEFAULT_CAPACITY.max(self.out.capacity()))?;
        tracing::debug!(%command, "shell escape");
        let shell_error = |source| MacroError::Shell {
            command: command.clone(),
            source,
        };
        let mut child = Command::new(&self.config.shell)
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(shell_error)?;

        // one extra byte for the trimmed newline, one more to detect overflow
        let fits = self.out.remaining().saturating_sub(1);
        let limit = u64::try_from(fits).unwrap_or(u64::MAX).saturating_add(2);
        let mut stdout = Vec::new();
        let read = match child.stdout.take() {
            Some(pipe) => pipe.take(limit).read_to_end(&mut stdout).map(|_| ()),
            None => Ok(()),
        };
        let overflow = read.is_ok() && stdout.len() > fits + 1;
        if read.is_err() || overflow {
            let _ = child.kill();
        }
        let status = child.wait();
        read.map_err(shell_error)?;
        if overflow {
            return Err(MacroError::BufferOverflow);
        }
        match status {
            Ok(status) if !status.success() => {
                tracing::debug!(%command, %status, "shell escape exited unsuccessfully");
            }
            Ok(_) => {}
            Err(source) => return Err(shell_error(source)),
        }

        let mut output = stdout.as_slice();
        if let Some(rest) = output.strip_suffix(b"\n") {
            output = rest;
        }
        self.out.extend(output)
    }
}

impl MacroContext {
    /// Expand `text` with the default configuration
    ///
    /// # Errors
    /// Returns `MacroError` on malformed references, illegal definitions,
    /// buffer overflow, excessive recursion or `%error`.
    pub fn expand(&mut self, text: &str) -> Result<String, MacroError> {
        self.expand_with(text, &MacroConfig::default())
    }

    /// Expand `text` with an explicit configuration
    ///
    /// # Errors
    /// See [`MacroContext::expand`].
    pub fn expand_with(&mut self, text: &str, config: &MacroConfig) -> Result<String, MacroError> {
        MacroBuf::new(self, config).expand(text.as_bytes()).map(into_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn expand(mc: &mut MacroContext, text: &str) -> String {
        mc.expand(text).unwrap()
    }

    /// Config that records diagnostic output instead of printing it
    fn recording() -> (MacroConfig, Rc<RefCell<Vec<(MessageKind, String)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let config = MacroConfig::default().with_message_handler(Rc::new(move |kind, text: &str| {
            sink.borrow_mut().push((kind, text.to_string()));
        }));
        (config, log)
    }

    #[test]
    fn literal_text_is_unchanged() {
        let mut mc = MacroContext::new();
        assert_eq!(expand(&mut mc, "plain text\nwith lines"), "plain text\nwith lines");
        assert_eq!(expand(&mut mc, ""), "");
    }

    #[test]
    fn escaped_percent() {
        let mut mc = MacroContext::new();
        assert_eq!(expand(&mut mc, "100%%"), "100%");
        assert_eq!(expand(&mut mc, "%%{foo}"), "%{foo}");
    }

    #[test]
    fn define_use_undefine() {
        let mut mc = MacroContext::new();
        mc.define("foo", Some(""), "bar", -1);
        assert_eq!(expand(&mut mc, "%foo"), "bar");
        assert_eq!(expand(&mut mc, "%{foo}"), "bar");
        mc.undefine("foo");
        assert_eq!(expand(&mut mc, "%foo"), "%foo");
        assert_eq!(expand(&mut mc, "%{foo}"), "%{foo}");
    }

    #[test]
    fn shadowing_survives_invocation() {
        let mut mc = MacroContext::new();
        mc.define("x", Some(""), "1", 0);
        mc.define("x", Some(""), "2", 1);
        assert_eq!(expand(&mut mc, "%x"), "2");
        mc.undefine("x");
        assert_eq!(expand(&mut mc, "%x"), "1");
    }

    #[test]
    fn positional_arguments() {
        let mut mc = MacroContext::new();
        mc.define("greet", Some(""), "Hello %1", 0);
        assert_eq!(expand(&mut mc, "%greet World"), "Hello World");
        mc.define("count", Some(""), "%#", 0);
        assert_eq!(expand(&mut mc, "%count one"), "2");
        assert_eq!(expand(&mut mc, "%count"), "1");
        // bindings do not leak out of the invocation
        assert!(!mc.is_defined("1"));
        assert!(!mc.is_defined("#"));
    }

    #[test]
    fn arguments_stop_at_end_of_line() {
        let mut mc = MacroContext::new();
        mc.define("args", Some(""), "[%*]", 0);
        assert_eq!(expand(&mut mc, "%args a  b\nnext %args"), "[a b]next []");
        assert_eq!(expand(&mut mc, "%{args x y}!"), "[x y]!");
    }

    #[test]
    fn option_flags() {
        let mut mc = MacroContext::new();
        mc.define("opt", Some("qn:"), "%{-q:quiet }%{!-q:loud }%{-n*} %{-n}", 0);
        assert_eq!(expand(&mut mc, "%opt -q -n name"), "quiet name -n name");
        assert_eq!(expand(&mut mc, "%opt"), "loud  ");
        let err = mc.expand("%opt -z").unwrap_err();
        assert_eq!(err.to_string(), "Unknown option z in opt(qn:)");
        assert!(!mc.is_defined("-q"));
    }

    #[test]
    fn unparameterized_macro_leaves_trailing_text() {
        let mut mc = MacroContext::new();
        mc.define("ver", None, "1.0", 0);
        assert_eq!(expand(&mut mc, "%ver rest"), "1.0 rest");
    }

    #[test]
    fn existence_checks() {
        let mut mc = MacroContext::new();
        assert_eq!(expand(&mut mc, "%{?undefined_macro:YES}"), "");
        assert_eq!(expand(&mut mc, "%{!?undefined_macro:YES}"), "YES");
        mc.define("have", None, "value", 0);
        assert_eq!(expand(&mut mc, "%{?have:YES}"), "YES");
        assert_eq!(expand(&mut mc, "%{?have}"), "value");
        assert_eq!(expand(&mut mc, "%{!?have:YES}"), "");
        assert_eq!(expand(&mut mc, "%?have"), "value");
    }

    #[test]
    fn nested_expansion() {
        let mut mc = MacroContext::new();
        mc.define("name", None, "pkg", 0);
        mc.define("version", None, "1.2", 0);
        mc.define("nv", None, "%{name}-%{version}", 0);
        assert_eq!(expand(&mut mc, "%{nv}.tar.gz"), "pkg-1.2.tar.gz");
    }

    #[test]
    fn recursion_limit() {
        let mut mc = MacroContext::new();
        let (config, _log) = recording();
        let err = mc.expand_with("%define loop %loop\n%loop", &config).unwrap_err();
        assert!(matches!(err, MacroError::RecursionLimit { depth: 17, limit: 16 }));

        let config = config.with_recursion_limit(4);
        let err = mc.expand_with("%loop", &config).unwrap_err();
        assert!(matches!(err, MacroError::RecursionLimit { limit: 4, .. }));
    }

    #[test]
    fn buffer_overflow() {
        let mut mc = MacroContext::new();
        mc.define("big", None, &"x".repeat(64), 0);
        let config = MacroConfig::default().with_capacity(32);
        assert!(matches!(
            mc.expand_with("%big", &config),
            Err(MacroError::BufferOverflow)
        ));
        let config = MacroConfig::default().with_capacity(65);
        assert_eq!(mc.expand_with("%big", &config).unwrap().len(), 64);
    }

    #[test]
    fn basename_and_suffix() {
        let mut mc = MacroContext::new();
        assert_eq!(expand(&mut mc, "%{basename:/a/b/c.txt}"), "c.txt");
        assert_eq!(expand(&mut mc, "%{suffix:/a/b/c.txt}"), "txt");
        mc.define("src", None, "/usr/src/foo.tar.gz", 0);
        assert_eq!(expand(&mut mc, "%{basename:%{src}}"), "foo.tar.gz");
        assert_eq!(expand(&mut mc, "%{suffix:%src}"), "gz");
    }

    #[test]
    fn numbered_sources() {
        let mut mc = MacroContext::new();
        mc.define("SOURCE1", None, "foo.tar.gz", 0);
        mc.define("PATCH2", None, "fix.patch", 0);
        assert_eq!(expand(&mut mc, "%{S:1} %{P:2}"), "foo.tar.gz fix.patch");
        assert_eq!(expand(&mut mc, "%{F:3}"), "file3.file");
        assert_eq!(expand(&mut mc, "%{expand:%%{S:1}}"), "foo.tar.gz");
    }

    #[test]
    fn illegal_define_name() {
        let mut mc = MacroContext::new();
        let err = mc.expand("%define a body").unwrap_err();
        assert!(matches!(err, MacroError::IllegalName { directive: "define", .. }));
        assert!(!mc.is_defined("a"));
        assert!(matches!(
            mc.expand("%define abc"),
            Err(MacroError::EmptyBody(name)) if name == "abc"
        ));
        assert!(matches!(
            mc.expand("%define abc(q body"),
            Err(MacroError::UnterminatedOpts(_))
        ));
        assert!(matches!(
            mc.expand("%undefine xy"),
            Err(MacroError::IllegalName { directive: "undefine", .. })
        ));
    }

    #[test]
    fn define_forms() {
        let mut mc = MacroContext::new();
        assert_eq!(expand(&mut mc, "%define foo  bar baz  \nafter"), "after");
        assert_eq!(mc.get_body("foo"), Some("bar baz"));
        assert_eq!(mc.get("foo").map(|e| e.level()), Some(1));

        expand(&mut mc, "%define multi line one\\\nline two");
        assert_eq!(mc.get_body("multi"), Some("line one\nline two"));

        expand(&mut mc, "%define grouped {a {b} c} tail");
        assert_eq!(mc.get_body("grouped"), Some("a {b} c"));

        expand(&mut mc, "%define withopts(ab:) body %1");
        let entry = mc.get("withopts").unwrap();
        assert_eq!(entry.opts(), Some("ab:"));
        assert_eq!(entry.body(), "body %1");
    }

    #[test]
    fn define_does_not_expand_but_global_does() {
        let mut mc = MacroContext::new();
        mc.define("base", None, "one", 0);
        expand(&mut mc, "%define lazy %{base}\n%global eager %{base}\n");
        mc.undefine("base");
        mc.define("base", None, "two", 0);
        assert_eq!(expand(&mut mc, "%lazy %eager"), "two one");
        assert_eq!(mc.get("eager").map(|e| e.level()), Some(MacroLevel::GLOBAL));
        assert!(matches!(
            mc.expand("%global broken %{oops"),
            Err(MacroError::ExpandFailed { .. })
        ));
    }

    #[test]
    fn defines_inside_parameterized_macros_are_local() {
        let mut mc = MacroContext::new();
        mc.define("scope", Some(""), "%define inner %1\n%inner", 0);
        assert_eq!(expand(&mut mc, "%scope value"), "value");
        assert!(!mc.is_defined("inner"));
    }

    #[test]
    fn undefine_builtin() {
        let mut mc = MacroContext::new();
        mc.define("gone", None, "1", 0);
        mc.define("gone", None, "2", 0);
        assert_eq!(expand(&mut mc, "%undefine gone\n%gone"), "1");
        assert_eq!(expand(&mut mc, "%undefine gone\n%gone"), "%gone");
        assert_eq!(expand(&mut mc, "%undefine never\n"), "");
    }

    #[test]
    fn stray_percent_and_unknown_macros() {
        let mut mc = MacroContext::new();
        assert_eq!(expand(&mut mc, "50% off"), "50% off");
        assert_eq!(expand(&mut mc, "end%"), "end%");
        assert_eq!(expand(&mut mc, "%{}x"), "%x");
        mc.define("known", None, "K", 0);
        assert_eq!(expand(&mut mc, "%{unknown:%known}"), "%{unknown:K}");
    }

    #[test]
    fn unterminated_forms() {
        let mut mc = MacroContext::new();
        assert!(matches!(
            mc.expand("%{foo"),
            Err(MacroError::Unterminated { delim: '{', .. })
        ));
        assert!(matches!(
            mc.expand("%(echo"),
            Err(MacroError::Unterminated { delim: '(', .. })
        ));
    }

    #[test]
    fn shell_escape_trims_one_newline() {
        let mut mc = MacroContext::new();
        mc.define("word", None, "hello", 0);
        assert_eq!(expand(&mut mc, "[%(echo %word)]"), "[hello]");
        assert_eq!(expand(&mut mc, "[%(printf 'a\\n\\n')]"), "[a\n]");
    }

    #[test]
    fn shell_output_is_bounded_by_capacity() {
        let mut mc = MacroContext::new();
        let small = MacroConfig::default().with_capacity(8);
        assert!(matches!(
            mc.expand_with("%(printf 0123456789abcdef)", &small),
            Err(MacroError::BufferOverflow)
        ));

        let exact = MacroConfig::default().with_capacity(17);
        assert_eq!(
            mc.expand_with("%(printf 0123456789abcdef)", &exact).unwrap(),
            "0123456789abcdef"
        );
        assert_eq!(
            mc.expand_with("%(printf '0123456789abcdef\\n')", &exact).unwrap(),
            "0123456789abcdef"
        );
    }

    #[test]
    fn endless_shell_output_overflows() {
        let mut mc = MacroContext::new();
        let config = MacroConfig::default().with_capacity(32);
        assert!(matches!(
            mc.expand_with("%(yes)", &config),
            Err(MacroError::BufferOverflow)
        ));
    }

    #[test]
    fn directives_consume_a_single_newline() {
        let mut mc = MacroContext::new();
        let (config, _log) = recording();
        assert_eq!(mc.expand_with("%define foo bar\n\nX", &config).unwrap(), "\nX");
        assert_eq!(mc.expand_with("%undefine foo\n\nY", &config).unwrap(), "\nY");
        assert_eq!(mc.expand_with("%dump\n\nZ", &config).unwrap(), "\nZ");
    }

    #[test]
    fn braced_arguments_accept_tabs() {
        let mut mc = MacroContext::new();
        mc.define("args", Some(""), "[%*]", 0);
        assert_eq!(expand(&mut mc, "%{args\tx y}"), "[x y]");
    }

    #[test]
    fn echo_warn_error() {
        let mut mc = MacroContext::new();
        mc.define("who", None, "world", 0);
        let (config, log) = recording();
        assert_eq!(mc.expand_with("a%{echo:hi %who}b", &config).unwrap(), "ab");
        mc.expand_with("%{warn:careful}", &config).unwrap();
        assert_eq!(
            log.borrow().as_slice(),
            &[
                (MessageKind::Echo, "hi world".to_string()),
                (MessageKind::Warning, "careful".to_string())
            ]
        );
        let err = mc.expand_with("%{error:stop %who}", &config).unwrap_err();
        assert!(matches!(err, MacroError::User(ref m) if m == "stop world"));
    }

    #[test]
    fn dump_builtin() {
        let mut mc = MacroContext::new();
        mc.define("one", None, "1", 0);
        let (config, log) = recording();
        assert_eq!(mc.expand_with("%dump\nafter", &config).unwrap(), "after");
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, MessageKind::Dump);
        assert!(log[0].1.contains("  0: one\t1\n"));
    }

    #[test]
    fn trace_builtin_is_sticky_at_top_level() {
        let mut mc = MacroContext::new();
        mc.define("foo", None, "bar", 0);
        let (config, log) = recording();
        assert_eq!(mc.expand_with("%trace%foo", &config).unwrap(), "bar");
        assert!(mc.trace);
        assert!(log.borrow().iter().all(|(k, _)| *k == MessageKind::Trace));
        assert!(log.borrow().iter().any(|(_, l)| l.contains("%foo^")));
        log.borrow_mut().clear();
        mc.expand_with("%foo", &config).unwrap();
        assert!(!log.borrow().is_empty());
        mc.expand_with("%{!trace}", &config).unwrap();
        assert!(!mc.trace);
    }

    #[test]
    fn verbose_builtin() {
        let mut mc = MacroContext::new();
        let quiet = MacroConfig::default();
        let loud = MacroConfig::default().with_verbose(true);
        assert_eq!(mc.expand_with("%{verbose:v}%{!verbose:q}", &quiet).unwrap(), "q");
        assert_eq!(mc.expand_with("%{verbose:v}%{!verbose:q}", &loud).unwrap(), "v");
    }

    #[test]
    fn uncompress_builtin() {
        use std::io::Write;
        let mut gz = tempfile::NamedTempFile::new().unwrap();
        gz.write_all(&[0o037, 0o213, 8, 0, 0]).unwrap();
        gz.flush().unwrap();
        let path = gz.path().display().to_string();

        let mut mc = MacroContext::new();
        mc.define("_gzip", None, "/bin/gzip", 0);
        let out = expand(&mut mc, &format!("%{{uncompress:{path}}}"));
        assert_eq!(out, format!("/bin/gzip -dc {path}"));
    }

    #[test]
    fn used_counter() {
        let mut mc = MacroContext::new();
        mc.define("hit", None, "x", 0);
        mc.define("miss", None, "y", 0);
        expand(&mut mc, "%hit %hit");
        assert_eq!(mc.get("hit").map(|e| e.used()), Some(2));
        assert_eq!(mc.get("miss").map(|e| e.used()), Some(0));
    }

    #[test]
    fn parse_define_reports_consumed() {
        let (def, consumed) = parse_define(b" name(x:) body text\n\nrest").unwrap();
        assert_eq!(def.name, "name");
        assert_eq!(def.opts.as_deref(), Some("x:"));
        assert_eq!(def.body, "body text");
        assert_eq!(consumed, 20);
    }
}
