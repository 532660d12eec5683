//! Path helpers built on top of expansion.

use crate::builtins::url_path;
use crate::context::MacroContext;
use crate::error::MacroError;

/// Canonicalize a path textually
///
/// Runs of `/` collapse to one, embedded `./` and trailing `/.` are dropped,
/// `dir/../` is resolved and a trailing `/` is trimmed. The `://` of a URL
/// and a leading `..` are kept.
#[must_use]
pub fn clean_path(path: &str) -> String {
    let s = path.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(s.len());
    // start of the last complete directory component in `out`
    let mut parent = 0usize;
    let mut i = 0;

    while i < s.len() {
        match s[i] {
            b':' if s.get(i + 1) == Some(&b'/') && s.get(i + 2) == Some(&b'/') => {
                out.extend_from_slice(b"://");
                i += 3;
                continue;
            }
            b'/' => {
                let mut se = parent + 1;
                while se < out.len() && out[se] != b'/' {
                    se += 1;
                }
                if se < out.len() {
                    parent = se;
                }
                while s.get(i + 1) == Some(&b'/') {
                    i += 1;
                }
                while out.last() == Some(&b'/') {
                    out.pop();
                }
            }
            b'.' => {
                let next = s.get(i + 1).copied();
                if out.is_empty() && next == Some(b'.') {
                    out.push(b'.');
                    i += 1;
                } else if out.is_empty() && next.is_none() {
                    // a lone "." is left alone
                } else if out.last() == Some(&b'/') && matches!(next, None | Some(b'/')) {
                    i += 1;
                    continue;
                } else if out.last() == Some(&b'/')
                    && next == Some(b'.')
                    && matches!(s.get(i + 2), None | Some(b'/'))
                {
                    out.truncate(parent);
                    if parent > 0 {
                        parent -= 1;
                        while parent > 0 && out[parent] != b'/' {
                            parent -= 1;
                        }
                    }
                    i += 2;
                    continue;
                }
            }
            _ => {}
        }
        out.push(s[i]);
        i += 1;
    }

    if out.len() > 1 && out.last() == Some(&b'/') {
        out.pop();
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Concatenate `parts`, expand the result and canonicalize it
///
/// # Errors
/// Returns the expansion error, if any.
pub fn expand_path(mc: &mut MacroContext, parts: &[&str]) -> Result<String, MacroError> {
    let expanded = mc.expand(&parts.concat())?;
    Ok(clean_path(&expanded))
}

/// Split `scheme://host` from the path of an expanded component
fn split_url(text: &str) -> (&str, &str) {
    let path = url_path(text);
    if path.len() == text.len() {
        ("", text)
    } else {
        text.split_at(text.len() - path.len())
    }
}

/// Join a root, a directory and a file, any of which may be a URL
///
/// The first URL prefix found (in root, directory, file order) is kept in
/// front of the joined path; an empty root or directory counts as `/`.
///
/// # Errors
/// Returns the expansion error of any component.
pub fn gen_path(mc: &mut MacroContext, root: &str, mdir: &str, file: &str) -> Result<String, MacroError> {
    let xroot = expand_path(mc, &[root])?;
    let xmdir = expand_path(mc, &[mdir])?;
    let xfile = expand_path(mc, &[file])?;

    let (root_url, root) = split_url(&xroot);
    let (mdir_url, mdir) = split_url(&xmdir);
    let (file_url, file) = split_url(&xfile);
    let url = [root_url, mdir_url, file_url]
        .into_iter()
        .find(|u| !u.is_empty())
        .unwrap_or("");
    let root = if root.is_empty() { "/" } else { root };
    let mdir = if mdir.is_empty() { "/" } else { mdir };

    expand_path(mc, &[url, root, "/", mdir, "/", file])
}
