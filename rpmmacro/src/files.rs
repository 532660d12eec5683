//! Macro definition files.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use crate::context::MacroContext;
use crate::macro_def::MacroLevel;
use crate::scan::is_blank;

/// Reader of logical lines: a line ending in `\` continues on the next one
///
/// With `escapes` set the backslash is kept in front of the embedded
/// newline; otherwise the backslash is replaced by it.
pub struct LogicalLines<R> {
    reader: R,
    escapes: bool,
}

impl<R: BufRead> LogicalLines<R> {
    /// Wrap `reader`
    pub fn new(reader: R, escapes: bool) -> Self {
        Self { reader, escapes }
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let mut raw = String::new();
        loop {
            raw.clear();
            if self.reader.read_line(&mut raw)? == 0 {
                return Ok((!line.is_empty()).then_some(line));
            }
            let text = raw.strip_suffix('\n').unwrap_or(&raw);
            match text.strip_suffix('\\') {
                Some(head) => {
                    line.push_str(head);
                    if self.escapes {
                        line.push('\\');
                    }
                    line.push('\n');
                }
                None => {
                    line.push_str(text);
                    return Ok(Some(line));
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for LogicalLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_line().transpose()
    }
}

/// Split a colon separated path list; the colon of `://` does not separate
fn split_path_list(list: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, _) in list.match_indices(':') {
        if list[i..].starts_with("://") {
            continue;
        }
        out.push(&list[start..i]);
        start = i + 1;
    }
    out.push(&list[start..]);
    out.retain(|p| !p.is_empty());
    out
}

fn home_relative(file: &str) -> PathBuf {
    match (file.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(file),
    }
}

/// Define every `%name body` line of `reader` at `level`
///
/// Definitions that fail to parse are logged and skipped. Returns the number
/// of macros defined.
///
/// # Errors
/// Returns any I/O error from the reader.
pub fn load_macros<R: BufRead>(mc: &mut MacroContext, reader: R, level: i32) -> io::Result<usize> {
    let mut defined = 0;
    for line in LogicalLines::new(reader, true) {
        let line = line?;
        let text = line.trim_start_matches(|c: char| c.is_ascii() && is_blank(c as u8));
        let Some(directive) = text.strip_prefix('%') else {
            continue;
        };
        match crate::define_macro(mc, directive, level) {
            Ok(()) => defined += 1,
            Err(e) => tracing::warn!(error = %e, "skipping bad macro definition"),
        }
    }
    Ok(defined)
}

/// Load the macro files named in `pathlist` into `mc`
///
/// `pathlist` is colon separated and a leading `~/` refers to `$HOME`.
/// Unreadable files are skipped. Definitions are made at
/// [`MacroLevel::MACROFILES`]; afterwards the visible definitions of `cli`,
/// if given, are re-applied at [`MacroLevel::CMDLINE`] so they take
/// precedence. Returns the number of files read.
pub fn init_macros(mc: &mut MacroContext, pathlist: &str, cli: Option<&MacroContext>) -> usize {
    let mut loaded = 0;
    for entry in split_path_list(pathlist) {
        let path = home_relative(entry);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "macro file not readable");
                continue;
            }
        };
        match load_macros(mc, BufReader::new(file), MacroLevel::MACROFILES) {
            Ok(n) => {
                tracing::debug!(path = %path.display(), defined = n, "loaded macro file");
                loaded += 1;
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "error reading macro file"),
        }
    }
    if let Some(cli) = cli {
        cli.load_into(mc, MacroLevel::CMDLINE);
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Write};

    fn lines(text: &str, escapes: bool) -> Vec<String> {
        LogicalLines::new(Cursor::new(text), escapes)
            .collect::<io::Result<_>>()
            .unwrap()
    }

    #[test]
    fn continuation_lines() {
        assert_eq!(lines("a\\\nb\nc\n", true), vec!["a\\\nb", "c"]);
        assert_eq!(lines("a\\\nb\nc", false), vec!["a\nb", "c"]);
        assert_eq!(lines("", true), Vec::<String>::new());
        assert_eq!(lines("\n\n", true), vec!["", ""]);
    }

    #[test]
    fn path_list_splitting() {
        assert_eq!(split_path_list("/a:/b::~/c"), vec!["/a", "/b", "~/c"]);
        assert_eq!(split_path_list("http://h/m:/x"), vec!["http://h/m", "/x"]);
    }

    #[test]
    fn load_skips_comments_and_bad_lines() {
        let text = "# comment\n%_topdir /usr/src\n  %_multi one \\\n  two\n%x bad\nplain\n";
        let mut mc = MacroContext::new();
        let n = load_macros(&mut mc, Cursor::new(text), MacroLevel::MACROFILES).unwrap();
        assert_eq!(n, 2);
        assert_eq!(mc.get_body("_topdir"), Some("/usr/src"));
        assert_eq!(mc.get_body("_multi"), Some("one \n  two"));
        assert_eq!(mc.get("_topdir").map(|e| e.level()), Some(MacroLevel::MACROFILES));
        assert!(!mc.is_defined("x"));
    }

    #[test]
    fn init_reads_files_and_reapplies_cli() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        writeln!(first, "%_arch x86_64\n%_vendor redhat").unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        writeln!(second, "%_vendor suse").unwrap();
        let list = format!(
            "{}:/nonexistent/macros:{}",
            first.path().display(),
            second.path().display()
        );

        let mut cli = MacroContext::new();
        cli.define("_arch", None, "noarch", MacroLevel::CMDLINE);

        let mut mc = MacroContext::new();
        assert_eq!(init_macros(&mut mc, &list, Some(&cli)), 2);
        assert_eq!(mc.get_body("_vendor"), Some("suse"));
        assert_eq!(mc.find("_vendor").map(|s| s.depth()), Some(2));
        let arch = mc.get("_arch").unwrap();
        assert_eq!(arch.body(), "noarch");
        assert_eq!(arch.level(), MacroLevel::CMDLINE);
    }
}
