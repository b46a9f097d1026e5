//! Source position tracking.
//!
//! Tokens and compile diagnostics never own the text they describe — they
//! carry a `Span` back into the original source buffer instead. The buffer
//! must outlive every `Span` derived from it; this is enforced at the type
//! level wherever a `Span` is paired with borrowed source bytes (see
//! `ember_lex::Token`).

/// A byte range within a source buffer, plus the 1-based line it starts on.
///
/// `Span` is `Copy` and carries no lifetime of its own — resolving it back
/// to text requires the original `&[u8]` buffer, obtained separately via
/// [`Span::text`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: u32,
    pub len: u32,
    pub line: u32,
}

impl Span {
    pub const fn new(start: u32, len: u32, line: u32) -> Self {
        Self { start, len, line }
    }

    /// A span over no text, used for synthetic "at end of input" diagnostics.
    pub const fn empty(line: u32) -> Self {
        Self { start: 0, len: 0, line }
    }

    /// Resolves this span against `source`, returning the referenced bytes.
    ///
    /// Panics if the span does not fall within `source` — a span is only
    /// ever constructed from the same buffer it will be resolved against,
    /// so an out-of-bounds span indicates a caller bug, not bad input.
    pub fn text<'a>(&self, source: &'a [u8]) -> &'a [u8] {
        let start = self.start as usize;
        let end = start + self.len as usize;
        &source[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_recovers_the_original_slice() {
        let src = b"var greeting = \"hi\";";
        let span = Span::new(4, 8, 1);
        assert_eq!(span.text(src), b"greeting");
    }

    #[test]
    fn empty_span_yields_empty_slice() {
        let src = b"print 1;";
        assert_eq!(Span::empty(1).text(src), b"");
    }
}
