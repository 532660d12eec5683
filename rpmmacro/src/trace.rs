//! Formatting of `%trace` output.

use crate::scan::is_eol;

fn chop_len(depth: usize) -> usize {
    61usize.saturating_sub(2 * depth)
}

fn indent(depth: usize) -> usize {
    2 * depth + 1
}

/// Line printed before a macro is expanded: the reference, a caret at its
/// end, then the rest of the source line
pub(crate) fn macro_line(depth: usize, src: &[u8], start: usize, end: usize) -> String {
    if start >= end {
        return format!("{depth:3}>{:w$}(empty)\n", "", w = indent(depth));
    }
    let mut line_end = end;
    while line_end < src.len() && !is_eol(src[line_end]) {
        line_end += 1;
    }
    let mut ellipsis = "";
    if line_end - start > chop_len(depth) {
        line_end = (start + chop_len(depth)).max(end);
        ellipsis = "...";
    }
    format!(
        "{depth:3}>{:w$}%{}^{}{ellipsis}\n",
        "",
        String::from_utf8_lossy(&src[start..end]),
        String::from_utf8_lossy(&src[end..line_end]),
        w = indent(depth)
    )
}

/// Line printed after an expansion completes
pub(crate) fn expansion_line(depth: usize, out: &[u8]) -> String {
    let mut text = out;
    while let Some((&last, rest)) = text.split_last() {
        if !is_eol(last) {
            break;
        }
        text = rest;
    }
    if text.is_empty() {
        return format!("{depth:3}<{:w$}(empty)\n", "", w = indent(depth));
    }
    let mut ellipsis = "";
    if depth > 0 {
        if let Some(nl) = text.iter().rposition(|&c| c == b'\n') {
            text = &text[nl + 1..];
        }
        if text.len() > chop_len(depth) {
            text = &text[..chop_len(depth)];
            ellipsis = "...";
        }
    }
    format!(
        "{depth:3}<{:w$}{}{ellipsis}\n",
        "",
        String::from_utf8_lossy(text),
        w = indent(depth)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pre_expansion() {
        let src = b"%{name} tail\nnext";
        assert_eq!(macro_line(1, src, 1, 7), "  1>   %{name}^ tail\n");
        assert_eq!(macro_line(2, src, 3, 3), "  2>     (empty)\n");
    }

    #[test]
    fn post_expansion_keeps_last_line() {
        assert_eq!(expansion_line(1, b"first\nsecond\n"), "  1<   second\n");
        assert_eq!(expansion_line(0, b"a\nb"), "  0< a\nb\n");
        assert_eq!(expansion_line(3, b""), "  3<       (empty)\n");
    }

    #[test]
    fn long_lines_are_chopped() {
        let long = vec![b'x'; 100];
        let line = expansion_line(10, &long);
        assert!(line.ends_with("...\n"));
        assert_eq!(line.trim_end().len(), 4 + 21 + 41 + 3);
    }
}
