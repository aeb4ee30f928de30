//! Edit-list string buffer.
//!
//! All rewriting in this crate is expressed as edits against byte offsets of
//! an *original* string: overwrite a range, remove a range, insert after a
//! position, plus prepend/append for wrappers. Edits never shift each other,
//! so several passes can record edits against the same offsets and the text
//! between edits survives byte-for-byte.

/// One recorded edit. `start == end` is a pure insertion.
#[derive(Debug, Clone)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

#[derive(Debug, Clone)]
pub struct Splice<'a> {
    source: &'a str,
    edits: Vec<Edit>,
    intro: String,
    outro: String,
}

impl<'a> Splice<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            edits: Vec::new(),
            intro: String::new(),
            outro: String::new(),
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Replace `source[start..end]` with `text`. Ranges of distinct edits
    /// must not overlap; that is a caller bug and trips the render assert.
    pub fn overwrite(&mut self, start: usize, end: usize, text: impl Into<String>) {
        assert!(start <= end, "reversed overwrite range {}..{}", start, end);
        assert!(end <= self.source.len(), "overwrite past end of source");
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
        });
    }

    pub fn remove(&mut self, start: usize, end: usize) {
        self.overwrite(start, end, "");
    }

    /// Insert `text` immediately after byte `pos`. Multiple insertions at
    /// the same position keep their call order.
    pub fn insert_after(&mut self, pos: usize, text: impl Into<String>) {
        self.overwrite(pos, pos, text);
    }

    /// Add `text` before everything added with `prepend` so far.
    pub fn prepend(&mut self, text: &str) {
        self.intro.insert_str(0, text);
    }

    pub fn append(&mut self, text: &str) {
        self.outro.push_str(text);
    }

    /// Serialize: intro, then the source with all edits applied in original
    /// position order, then outro.
    pub fn render(&self) -> String {
        let mut ordered: Vec<&Edit> = self.edits.iter().collect();
        // Stable sort: equal starts keep recording order.
        ordered.sort_by_key(|e| e.start);

        let mut out = String::with_capacity(self.source.len() + self.intro.len() + self.outro.len());
        out.push_str(&self.intro);
        let mut cursor = 0usize;
        for edit in ordered {
            assert!(
                edit.start >= cursor || edit.start == edit.end,
                "overlapping edits at {}..{}",
                edit.start,
                edit.end
            );
            if edit.start > cursor {
                out.push_str(&self.source[cursor..edit.start]);
            }
            out.push_str(&edit.text);
            cursor = cursor.max(edit.end);
        }
        if cursor < self.source.len() {
            out.push_str(&self.source[cursor..]);
        }
        out.push_str(&self.outro);
        out
    }
}

impl std::fmt::Display for Splice<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
