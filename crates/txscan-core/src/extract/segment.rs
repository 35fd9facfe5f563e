//! Bounded line windows ("segments") located by start and end patterns.

use crate::error::RuleError;

use super::pattern::LinePattern;

/// A segment of document lines, both ends inclusive and zero based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The segment's lines within the document.
    pub fn lines<'a>(&self, lines: &'a [String]) -> &'a [String] {
        &lines[self.start..=self.end]
    }
}

/// How to find one kind of segment.
///
/// A segment opens on a line matching `start` and closes on the first line
/// matching `end`, or after `max_size` lines, whichever comes first. Without
/// an end pattern it closes before the next start line.
#[derive(Debug, Clone)]
pub struct SegmentRule {
    start: LinePattern,
    end: Option<LinePattern>,
    max_size: Option<usize>,
    reset_keys: Vec<String>,
}

impl SegmentRule {
    pub fn new(start: &str) -> Result<Self, RuleError> {
        Ok(Self {
            start: LinePattern::new(start)?,
            end: None,
            max_size: None,
            reset_keys: Vec::new(),
        })
    }

    pub fn with_end(mut self, end: &str) -> Result<Self, RuleError> {
        self.end = Some(LinePattern::new(end)?);
        Ok(self)
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size.max(1));
        self
    }

    /// Document context keys removed before each occurrence.
    pub fn with_reset(mut self, key: impl Into<String>) -> Self {
        self.reset_keys.push(key.into());
        self
    }

    pub fn start_pattern(&self) -> &LinePattern {
        &self.start
    }

    pub fn reset_keys(&self) -> &[String] {
        &self.reset_keys
    }

    /// Scan `lines` for occurrences of this segment.
    pub fn segments<'a>(&'a self, lines: &'a [String]) -> LineWindowScanner<'a> {
        LineWindowScanner {
            rule: self,
            lines,
            position: 0,
        }
    }

    fn find_end(&self, lines: &[String], start: usize) -> usize {
        let last = lines.len() - 1;
        let limit = match self.max_size {
            Some(max) => last.min(start + max - 1),
            None => last,
        };

        match &self.end {
            Some(end) => (start..=limit)
                .find(|&i| end.is_match(&lines[i]))
                .unwrap_or(limit),
            None => (start + 1..=limit)
                .find(|&i| self.start.is_match(&lines[i]))
                .map(|i| i - 1)
                .unwrap_or(limit),
        }
    }
}

/// Iterator over the non-overlapping segments of a document, in order.
pub struct LineWindowScanner<'a> {
    rule: &'a SegmentRule,
    lines: &'a [String],
    position: usize,
}

impl Iterator for LineWindowScanner<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let start = (self.position..self.lines.len())
            .find(|&i| self.rule.start.is_match(&self.lines[i]))?;
        let end = self.rule.find_end(self.lines, start);
        self.position = end + 1;
        Some(Segment { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    fn spans(rule: &SegmentRule, doc: &[String]) -> Vec<(usize, usize)> {
        rule.segments(doc).map(|s| (s.start, s.end)).collect()
    }

    #[test]
    fn test_start_and_end() {
        let doc = lines(&["x", "Kauf", "a", "Ende", "y", "Kauf", "b", "Ende"]);
        let rule = SegmentRule::new("Kauf").unwrap().with_end("Ende").unwrap();
        assert_eq!(spans(&rule, &doc), vec![(1, 3), (5, 7)]);
    }

    #[test]
    fn test_unmatched_end_extends_to_document_end() {
        let doc = lines(&["Kauf", "a", "b"]);
        let rule = SegmentRule::new("Kauf").unwrap().with_end("Ende").unwrap();
        assert_eq!(spans(&rule, &doc), vec![(0, 2)]);
    }

    #[test]
    fn test_max_size_closes_first() {
        let doc = lines(&["Kauf", "a", "b", "Ende", "Kauf", "Ende"]);
        let rule = SegmentRule::new("Kauf")
            .unwrap()
            .with_end("Ende")
            .unwrap()
            .with_max_size(2);
        assert_eq!(spans(&rule, &doc), vec![(0, 1), (4, 5)]);
    }

    #[test]
    fn test_no_end_closes_before_next_start() {
        let doc = lines(&["Kopf", "Ertrag", "a", "Ertrag", "b", "c"]);
        let rule = SegmentRule::new("Ertrag").unwrap();
        assert_eq!(spans(&rule, &doc), vec![(1, 2), (3, 5)]);
    }

    #[test]
    fn test_start_inside_open_segment_is_absorbed() {
        let doc = lines(&["Kauf", "Kauf", "Ende", "Kauf"]);
        let rule = SegmentRule::new("Kauf").unwrap().with_end("Ende").unwrap();
        assert_eq!(spans(&rule, &doc), vec![(0, 2), (3, 3)]);
    }

    #[test]
    fn test_segments_never_overlap() {
        let doc = lines(&[
            "S", "S", "E", "x", "S", "S", "S", "E", "E", "S", "x", "x", "x", "x",
        ]);
        for max in [None, Some(1), Some(2), Some(3)] {
            let mut rule = SegmentRule::new("S").unwrap().with_end("E").unwrap();
            if let Some(max) = max {
                rule = rule.with_max_size(max);
            }
            let segments: Vec<Segment> = rule.segments(&doc).collect();
            for pair in segments.windows(2) {
                assert!(pair[0].end < pair[1].start, "{:?} with max {:?}", pair, max);
            }
            assert!(segments.iter().all(|s| s.start <= s.end));
        }
    }

    #[test]
    fn test_no_occurrence() {
        let doc = lines(&["a", "b"]);
        let rule = SegmentRule::new("Kauf").unwrap();
        assert!(rule.segments(&doc).next().is_none());
        assert!(rule.segments(&[]).next().is_none());
    }
}
