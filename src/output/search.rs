//! Linear search over rendered output lines

use serde::Serialize;

/// Which way `find` moves from the current highlight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub case_sensitive: bool,
}

/// A match position; `line` is absolute (counts evicted lines), `column` in chars
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MatchLocation {
    pub line: u64,
    pub column: usize,
    pub length: usize,
}

/// Per-session highlight state
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    query: String,
    highlight: Option<MatchLocation>,
}

impl SearchState {
    pub fn highlight(&self) -> Option<MatchLocation> {
        self.highlight
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.highlight = None;
    }

    /// Move the highlight to the next or previous match, wrapping at the ends
    ///
    /// `first_line` is the absolute index of `lines[0]`. An empty query clears the
    /// highlight without scanning.
    pub fn find(
        &mut self,
        lines: &[String],
        first_line: u64,
        query: &str,
        direction: SearchDirection,
        options: SearchOptions,
    ) -> Option<MatchLocation> {
        if query.is_empty() {
            self.clear();
            return None;
        }

        if self.query != query {
            self.query = query.to_string();
            self.highlight = None;
        }
        // A highlight on an evicted line no longer anchors anything.
        if matches!(self.highlight, Some(h) if h.line < first_line) {
            self.highlight = None;
        }

        let matches = scan(lines, first_line, query, options);
        let found = match (direction, self.highlight) {
            (_, _) if matches.is_empty() => None,
            (SearchDirection::Next, None) => matches.first().copied(),
            (SearchDirection::Previous, None) => matches.last().copied(),
            (SearchDirection::Next, Some(current)) => matches
                .iter()
                .find(|m| anchor(m) > anchor(&current))
                .or_else(|| matches.first())
                .copied(),
            (SearchDirection::Previous, Some(current)) => matches
                .iter()
                .rev()
                .find(|m| anchor(m) < anchor(&current))
                .or_else(|| matches.last())
                .copied(),
        };

        self.highlight = found;
        found
    }
}

fn anchor(location: &MatchLocation) -> (u64, usize) {
    (location.line, location.column)
}

/// Every occurrence of `query` in document order
pub fn scan(
    lines: &[String],
    first_line: u64,
    query: &str,
    options: SearchOptions,
) -> Vec<MatchLocation> {
    if query.is_empty() {
        return Vec::new();
    }

    let needle = if options.case_sensitive {
        query.to_string()
    } else {
        query.to_lowercase()
    };
    let length = needle.chars().count();

    let mut found = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let haystack = if options.case_sensitive {
            line.clone()
        } else {
            line.to_lowercase()
        };
        let mut start = 0;
        while let Some(offset) = haystack[start..].find(&needle) {
            let byte_pos = start + offset;
            found.push(MatchLocation {
                line: first_line + idx as u64,
                column: haystack[..byte_pos].chars().count(),
                length,
            });
            // Step one char so overlapping matches are reported too.
            let step = haystack[byte_pos..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(1);
            start = byte_pos + step;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn next_wraps_to_first_match() {
        let text = lines(&["error: a", "ok", "error: b"]);
        let mut state = SearchState::default();
        let opts = SearchOptions::default();

        let first = state.find(&text, 0, "error", SearchDirection::Next, opts).unwrap();
        assert_eq!((first.line, first.column), (0, 0));
        let second = state.find(&text, 0, "error", SearchDirection::Next, opts).unwrap();
        assert_eq!(second.line, 2);
        let wrapped = state.find(&text, 0, "error", SearchDirection::Next, opts).unwrap();
        assert_eq!(wrapped.line, 0);
    }

    #[test]
    fn previous_starts_from_the_bottom_and_wraps() {
        let text = lines(&["x1", "x2", "x3"]);
        let mut state = SearchState::default();
        let opts = SearchOptions::default();

        let last = state.find(&text, 10, "x", SearchDirection::Previous, opts).unwrap();
        assert_eq!(last.line, 12);
        state.find(&text, 10, "x", SearchDirection::Previous, opts);
        state.find(&text, 10, "x", SearchDirection::Previous, opts);
        let wrapped = state.find(&text, 10, "x", SearchDirection::Previous, opts).unwrap();
        assert_eq!(wrapped.line, 12);
    }

    #[test]
    fn empty_query_clears_highlight() {
        let text = lines(&["abc"]);
        let mut state = SearchState::default();
        let opts = SearchOptions::default();

        assert!(state.find(&text, 0, "b", SearchDirection::Next, opts).is_some());
        assert!(state.find(&text, 0, "", SearchDirection::Next, opts).is_none());
        assert_eq!(state.highlight(), None);
        assert_eq!(state.query(), "");
    }

    #[test]
    fn case_sensitivity_is_optional() {
        let text = lines(&["Warning", "warning"]);
        let insensitive = scan(&text, 0, "WARN", SearchOptions::default());
        assert_eq!(insensitive.len(), 2);

        let sensitive = scan(&text, 0, "warn", SearchOptions { case_sensitive: true });
        assert_eq!(sensitive.len(), 1);
        assert_eq!(sensitive[0].line, 1);
    }

    #[test]
    fn columns_count_chars_not_bytes() {
        let text = lines(&["héllo wörld"]);
        let found = scan(&text, 0, "wörld", SearchOptions::default());
        assert_eq!(found[0].column, 6);
        assert_eq!(found[0].length, 5);
    }
}
