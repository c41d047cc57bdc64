//! Byte-level scanning helpers that understand string literals and
//! parenthesis nesting, so clause keywords are only matched in query code.

pub(crate) fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Per-byte lexical context of a query string.
pub(crate) struct Scanned<'a> {
    pub(crate) text: &'a str,
    in_literal: Vec<bool>,
    depth: Vec<u32>,
}

impl<'a> Scanned<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        let bytes = text.as_bytes();
        let mut in_literal = vec![false; bytes.len()];
        let mut depth = vec![0_u32; bytes.len()];
        let mut quote: Option<u8> = None;
        let mut escaped = false;
        let mut level = 0_u32;

        for (index, &byte) in bytes.iter().enumerate() {
            match quote {
                Some(open) => {
                    in_literal[index] = true;
                    if escaped {
                        escaped = false;
                    } else if byte == b'\\' {
                        escaped = true;
                    } else if byte == open {
                        quote = None;
                    }
                }
                None => match byte {
                    b'\'' | b'"' => {
                        in_literal[index] = true;
                        quote = Some(byte);
                    }
                    b'(' => level += 1,
                    b')' => level = level.saturating_sub(1),
                    _ => {}
                },
            }
            depth[index] = level;
        }

        Self { text, in_literal, depth }
    }

    pub(crate) fn bytes(&self) -> &'a [u8] {
        self.text.as_bytes()
    }

    pub(crate) fn is_code(&self, index: usize) -> bool {
        !self.in_literal[index]
    }

    pub(crate) fn contains_code_byte(&self, needle: u8) -> bool {
        self.bytes().iter().enumerate().any(|(index, &byte)| byte == needle && self.is_code(index))
    }

    pub(crate) fn depth_at(&self, index: usize) -> u32 {
        self.depth[index]
    }

    /// Position of the first occurrence of `needle` that starts in code at
    /// or after `from`.
    pub(crate) fn find_code(&self, needle: &str, from: usize) -> Option<usize> {
        let bytes = self.bytes();
        let needle = needle.as_bytes();
        if needle.is_empty() || bytes.len() < needle.len() {
            return None;
        }

        (from..=bytes.len() - needle.len())
            .find(|&start| self.is_code(start) && bytes[start..start + needle.len()] == *needle)
    }

    /// Finds a whole-word keyword outside literals and parentheses, starting
    /// the search at `from`.
    pub(crate) fn find_keyword(&self, keyword: &str, from: usize) -> Option<usize> {
        self.find_keyword_within(keyword, from, self.bytes().len(), 0)
    }

    /// Finds a whole-word keyword in code at exactly `depth` that starts in
    /// `from..to`.
    pub(crate) fn find_keyword_within(
        &self,
        keyword: &str,
        from: usize,
        to: usize,
        depth: u32,
    ) -> Option<usize> {
        let bytes = self.bytes();
        let needle = keyword.as_bytes();
        if needle.is_empty() || bytes.len() < needle.len() {
            return None;
        }
        let last_start = (bytes.len() - needle.len()).min(to.saturating_sub(1));
        if from > last_start {
            return None;
        }

        (from..=last_start).find(|&start| {
            let end = start + needle.len();
            self.is_code(start)
                && self.depth[start] == depth
                && bytes[start..end].eq_ignore_ascii_case(needle)
                && (start == 0 || !(is_ident_byte(bytes[start - 1]) || bytes[start - 1] == b'.'))
                && (end == bytes.len() || !is_ident_byte(bytes[end]))
        })
    }

    /// Earliest of the given keywords found at or after `from`.
    pub(crate) fn find_first_keyword(&self, keywords: &[&str], from: usize) -> Option<usize> {
        keywords.iter().filter_map(|keyword| self.find_keyword(keyword, from)).min()
    }

    /// Reads an identifier starting at or after `from`, skipping whitespace.
    pub(crate) fn next_ident(&self, from: usize) -> Option<(usize, usize)> {
        let bytes = self.bytes();
        let start = skip_whitespace(bytes, from);
        let end = (start..bytes.len()).find(|&index| !is_ident_byte(bytes[index])).unwrap_or(bytes.len());
        (end > start).then_some((start, end))
    }
}

pub(crate) fn skip_whitespace(bytes: &[u8], from: usize) -> usize {
    (from..bytes.len()).find(|&index| !bytes[index].is_ascii_whitespace()).unwrap_or(bytes.len())
}

/// Reads a quoted literal starting exactly at `start` and returns its
/// unescaped content and the index just past the closing quote.
pub(crate) fn read_string_literal(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let open = *bytes.get(start)?;
    if open != b'\'' && open != b'"' {
        return None;
    }

    let mut content = Vec::new();
    let mut index = start + 1;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' if index + 1 < bytes.len() => {
                content.push(bytes[index + 1]);
                index += 2;
            }
            byte if byte == open => {
                return Some((String::from_utf8_lossy(&content).into_owned(), index + 1));
            }
            byte => {
                content.push(byte);
                index += 1;
            }
        }
    }

    None
}
