use std::path::Path;

use crate::compress::detect_compression;
use crate::scan::is_blank;

/// Macros implemented by the engine itself
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Builtin {
    Global,
    Define,
    Undefine,
    Echo,
    Warn,
    Error,
    Trace,
    Dump,
    Basename,
    Suffix,
    Expand,
    Verbose,
    Uncompress,
    Url2Path,
    Source,
    Patch,
    File,
}

/// Checked in order, before the macro table
const BUILTINS: &[(&str, Builtin)] = &[
    ("global", Builtin::Global),
    ("define", Builtin::Define),
    ("undefine", Builtin::Undefine),
    ("echo", Builtin::Echo),
    ("warn", Builtin::Warn),
    ("error", Builtin::Error),
    ("trace", Builtin::Trace),
    ("dump", Builtin::Dump),
    ("basename", Builtin::Basename),
    ("suffix", Builtin::Suffix),
    ("expand", Builtin::Expand),
    ("verbose", Builtin::Verbose),
    ("uncompress", Builtin::Uncompress),
    ("url2path", Builtin::Url2Path),
    ("u2p", Builtin::Url2Path),
    ("S", Builtin::Source),
    ("P", Builtin::Patch),
    ("F", Builtin::File),
];

impl Builtin {
    pub(crate) fn lookup(name: &[u8]) -> Option<Builtin> {
        BUILTINS
            .iter()
            .find(|(n, _)| n.as_bytes() == name)
            .map(|&(_, b)| b)
    }

    /// Whether this builtin rewrites its payload and re-expands the result
    pub(crate) fn is_transform(self) -> bool {
        matches!(
            self,
            Builtin::Basename
                | Builtin::Suffix
                | Builtin::Expand
                | Builtin::Verbose
                | Builtin::Uncompress
                | Builtin::Url2Path
                | Builtin::Source
                | Builtin::Patch
                | Builtin::File
        )
    }
}

/// The path component of a `scheme://host/path` URL; other text is returned as is
pub fn url_path(url: &str) -> &str {
    match url.find("://") {
        Some(i) => {
            let rest = &url[i + 3..];
            rest.find('/').map_or("", |j| &rest[j..])
        }
        None => url,
    }
}

fn numbered(buf: &str, prefix: &str) -> String {
    if buf.bytes().all(|c| c.is_ascii_digit()) {
        format!("%{prefix}{buf}")
    } else {
        buf.to_string()
    }
}

/// Rewrite an already expanded payload; `None` produces no output
pub(crate) fn transform(builtin: Builtin, negate: bool, verbose: bool, buf: &str) -> Option<String> {
    match builtin {
        Builtin::Basename => Some(buf.rsplit('/').next().unwrap_or(buf).to_string()),
        Builtin::Suffix => buf.rfind('.').map(|i| buf[i + 1..].to_string()),
        Builtin::Expand => Some(buf.to_string()),
        Builtin::Verbose => (verbose != negate).then(|| buf.to_string()),
        Builtin::Uncompress => {
            let file = buf
                .trim_start_matches(|c: char| c.is_ascii() && is_blank(c as u8))
                .split(|c: char| c.is_ascii() && is_blank(c as u8))
                .next()
                .unwrap_or("");
            Some(detect_compression(Path::new(file)).command(file))
        }
        Builtin::Url2Path => {
            let path = url_path(buf);
            Some(if path.is_empty() { "/" } else { path }.to_string())
        }
        Builtin::Source => Some(numbered(buf, "SOURCE")),
        Builtin::Patch => Some(numbered(buf, "PATCH")),
        Builtin::File => Some(format!("file{buf}.file")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lookup_is_exact() {
        assert_eq!(Builtin::lookup(b"define"), Some(Builtin::Define));
        assert_eq!(Builtin::lookup(b"u2p"), Some(Builtin::Url2Path));
        assert_eq!(Builtin::lookup(b"defined"), None);
        assert_eq!(Builtin::lookup(b"s"), None);
        assert!(Builtin::Suffix.is_transform());
        assert!(!Builtin::Dump.is_transform());
    }

    #[test]
    fn path_transforms() {
        let t = |b, s| transform(b, false, false, s);
        assert_eq!(t(Builtin::Basename, "/a/b/c.txt").as_deref(), Some("c.txt"));
        assert_eq!(t(Builtin::Basename, "plain").as_deref(), Some("plain"));
        assert_eq!(t(Builtin::Suffix, "/a/b/c.txt").as_deref(), Some("txt"));
        assert_eq!(t(Builtin::Suffix, "noext"), None);
    }

    #[test]
    fn numbered_references() {
        let t = |b, s| transform(b, false, false, s);
        assert_eq!(t(Builtin::Source, "1").as_deref(), Some("%SOURCE1"));
        assert_eq!(t(Builtin::Patch, "12").as_deref(), Some("%PATCH12"));
        assert_eq!(t(Builtin::Source, "x1").as_deref(), Some("x1"));
        assert_eq!(t(Builtin::File, "3").as_deref(), Some("file3.file"));
    }

    #[test]
    fn verbose_and_negation() {
        assert_eq!(transform(Builtin::Verbose, false, true, "v").as_deref(), Some("v"));
        assert_eq!(transform(Builtin::Verbose, false, false, "v"), None);
        assert_eq!(transform(Builtin::Verbose, true, false, "q").as_deref(), Some("q"));
    }

    #[test]
    fn urls() {
        assert_eq!(url_path("ftp://host.example/pub/x.tar"), "/pub/x.tar");
        assert_eq!(url_path("http://host"), "");
        assert_eq!(url_path("/usr/src"), "/usr/src");
        assert_eq!(
            transform(Builtin::Url2Path, false, false, "http://host").as_deref(),
            Some("/")
        );
    }
}
