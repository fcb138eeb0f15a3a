//! Locating embedded blocks in HCL-style text.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HEREDOC_START: Regex =
        Regex::new(r"<<(?P<indent>-?)(?P<tag>[A-Za-z_][A-Za-z0-9_]*)[ \t]*\r?\n").unwrap();
}

/// A brace-delimited block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    /// Byte offset of the opening brace.
    pub start: usize,
    /// Text between the braces.
    pub body: &'a str,
}

/// Find the block whose opening brace is at `open`.
///
/// Quoted strings, `#`/`//` line comments and heredocs are skipped while
/// counting braces. Returns `None` when the block is not terminated.
pub fn matching_block(text: &str, open: usize) -> Option<Block<'_>> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = skip_string(bytes, i),
            b'#' => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line(bytes, i),
            b'<' if bytes.get(i + 1) == Some(&b'<') => match heredoc_at(text, i) {
                Some(h) => i = h.end,
                None => i += 2,
            },
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(Block {
                        start: open,
                        body: &text[open + 1..i],
                    });
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Index just past the closing quote of a string starting at `start`.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            b'\n' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| start + p)
        .unwrap_or(bytes.len())
}

/// A heredoc string (`<<EOF ... EOF` or `<<-EOF ... EOF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heredoc<'a> {
    /// Byte offset of the `<<` marker.
    pub start: usize,
    /// Byte offset just past the closing tag.
    pub end: usize,
    /// Byte offset where the body begins.
    pub body_start: usize,
    pub tag: &'a str,
    pub body: &'a str,
    /// Whether the closing tag was found.
    pub terminated: bool,
}

/// Heredoc starting exactly at `pos`, if any.
fn heredoc_at(text: &str, pos: usize) -> Option<Heredoc<'_>> {
    let caps = HEREDOC_START.captures_at(text, pos)?;
    let whole = caps.get(0)?;
    if whole.start() != pos {
        return None;
    }
    let tag = caps.name("tag")?.as_str();
    let body_start = whole.end();

    let mut offset = body_start;
    for line in text[body_start..].split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed == tag {
            return Some(Heredoc {
                start: pos,
                end: offset + line.len(),
                body_start,
                tag,
                body: &text[body_start..offset],
                terminated: true,
            });
        }
        offset += line.len();
    }
    Some(Heredoc {
        start: pos,
        end: text.len(),
        body_start,
        tag,
        body: &text[body_start..],
        terminated: false,
    })
}

/// All heredocs in the text, in order.
pub fn heredocs(text: &str) -> Vec<Heredoc<'_>> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(m) = HEREDOC_START.find_at(text, pos) {
        match heredoc_at(text, m.start()) {
            Some(h) => {
                pos = h.end;
                found.push(h);
            }
            None => pos = m.end(),
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_block_nested() {
        let text = "variable \"x\" {\n  default = { a = 1 }\n}\nrest";
        let open = text.find('{').unwrap();
        let block = matching_block(text, open).unwrap();
        assert_eq!(block.body, "\n  default = { a = 1 }\n");
    }

    #[test]
    fn test_braces_in_strings_and_comments_are_ignored() {
        let text = "x {\n  description = \"use } carefully\" # not }\n}\n";
        let block = matching_block(text, 2).unwrap();
        assert!(block.body.contains("use } carefully"));
        assert!(text[block.start..].starts_with('{'));
    }

    #[test]
    fn test_unterminated_block() {
        assert!(matching_block("x {\n  a = 1\n", 2).is_none());
        assert!(matching_block("x", 0).is_none());
    }

    #[test]
    fn test_heredocs() {
        let text = "policy = <<EOF\n{\"a\": 1}\nEOF\nother = <<-POLICY\n  {}\n  POLICY\n";
        let found = heredocs(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].tag, "EOF");
        assert_eq!(found[0].body, "{\"a\": 1}\n");
        assert!(found[0].terminated);
        assert_eq!(found[1].tag, "POLICY");
        assert_eq!(found[1].body.trim(), "{}");
    }

    #[test]
    fn test_unterminated_heredoc() {
        let found = heredocs("policy = <<EOF\n{\"a\": 1}\n");
        assert_eq!(found.len(), 1);
        assert!(!found[0].terminated);
    }

    #[test]
    fn test_heredoc_braces_do_not_count() {
        let text = "resource \"r\" \"p\" {\n  policy = <<EOF\n{ \"Statement\": [\nEOF\n}\n";
        let open = text.find('{').unwrap();
        let block = matching_block(text, open).unwrap();
        assert!(block.body.contains("Statement"));
    }
}
