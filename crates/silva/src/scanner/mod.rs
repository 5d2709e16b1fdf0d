//! # Scanner Module
//!
//! Scannerless token recognition. There is no separate lexer phase: at each
//! input position the drivers ask this module to try, for every terminal that
//! is legal in the current parser state(s), its recognizer, and to select the
//! winning token(s).
//!
//! ## Selection policy
//!
//! Among simultaneously matching terminals:
//!
//! 0. only candidates of maximal terminal priority are kept, and a matching
//!    `finish` terminal short-circuits the scan;
//! 1. a unique `prefer` candidate at maximal match length wins;
//! 2. the longest match wins;
//! 3. string-literal recognizers beat regex recognizers of equal length
//!    (keywords over identifiers);
//! 4. remaining ties are returned together: the GLR driver forks on each, the
//!    LR driver reports a lexical ambiguity error.

use crate::grammar::{Grammar, TermId};
use smallvec::SmallVec;
use std::sync::Arc;

/// A recognizer callable: match a terminal at a position.
///
/// Recognizers must be pure and position-anchored; they never consume beyond
/// the returned length.
pub trait Recognize: Send + Sync {
    /// Returns the match length at `pos`, or `None` for no match.
    fn recognize(&self, input: &str, pos: usize) -> Option<usize>;
}

impl<F> Recognize for F
where
    F: Fn(&str, usize) -> Option<usize> + Send + Sync,
{
    fn recognize(&self, input: &str, pos: usize) -> Option<usize> {
        self(input, pos)
    }
}

/// A compiled regular-expression recognizer, anchored at the match position.
#[derive(Debug, Clone)]
pub struct CompiledRegex {
    pattern: compact_str::CompactString,
    regex: regex::Regex,
}

impl CompiledRegex {
    /// The original pattern text, as written in the grammar.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// The closed set of recognizer shapes.
#[derive(Clone)]
pub enum Recognizer {
    /// Exact string match.
    Literal(compact_str::CompactString),
    /// Longest regex match anchored at the position.
    Regex(Box<CompiledRegex>),
    /// Matches length 0 iff the position is at end of input.
    Eof,
    /// Matches length 0 unconditionally.
    Empty,
    /// A user-supplied recognizer registered by terminal name.
    External(Arc<dyn Recognize>),
}

impl std::fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.pattern).finish(),
            Self::Eof => f.write_str("Eof"),
            Self::Empty => f.write_str("Empty"),
            Self::External(_) => f.write_str("External"),
        }
    }
}

impl Recognizer {
    #[must_use]
    pub fn literal(value: impl Into<compact_str::CompactString>) -> Self {
        Self::Literal(value.into())
    }

    /// Compile a regex recognizer.
    ///
    /// The pattern is anchored at the match position; `^` is prepended when
    /// compiling so the pattern itself is written unanchored, exactly as in
    /// the textual grammar form.
    ///
    /// # Errors
    ///
    /// Returns the `regex` crate's error message when the pattern is invalid.
    pub fn regex(pattern: &str) -> Result<Self, String> {
        let regex =
            regex::Regex::new(&format!("^(?:{pattern})")).map_err(|e| e.to_string())?;
        Ok(Self::Regex(Box::new(CompiledRegex {
            pattern: pattern.into(),
            regex,
        })))
    }

    #[must_use]
    pub fn external(recognizer: Arc<dyn Recognize>) -> Self {
        Self::External(recognizer)
    }

    /// Try this recognizer at `pos`.
    #[must_use]
    pub fn recognize(&self, input: &str, pos: usize) -> Option<usize> {
        match self {
            Self::Literal(value) => input[pos..].starts_with(value.as_str()).then(|| value.len()),
            Self::Regex(re) => re.regex.find(&input[pos..]).map(|m| m.end()),
            Self::Eof => (pos == input.len()).then_some(0),
            Self::Empty => Some(0),
            Self::External(rec) => rec.recognize(input, pos),
        }
    }

    /// A zero-length match from this recognizer is meaningful (rather than a
    /// degenerate regex match that would stall the drivers).
    pub(crate) const fn zero_length_ok(&self) -> bool {
        matches!(self, Self::Eof | Self::Empty)
    }

    pub(crate) const fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    pub(crate) const fn is_regex(&self) -> bool {
        matches!(self, Self::Regex(_))
    }
}

/// A recognized token: terminal id and input span. The token's value is the
/// input slice `input[start..end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub term: TermId,
    pub start: usize,
    pub end: usize,
}

impl Token {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The matched input slice.
    #[must_use]
    pub fn value<'a>(&self, input: &'a str) -> &'a str {
        &input[self.start..self.end]
    }
}

/// Try every legal terminal at `pos` and apply the selection policy.
///
/// Returns zero tokens (no viable token), one token (the common case), or
/// several equal-length tokens (a tie the caller forks on or reports).
pub(crate) fn scan(
    grammar: &Grammar,
    legal: &[TermId],
    input: &str,
    pos: usize,
) -> SmallVec<[Token; 1]> {
    let mut matches: SmallVec<[Token; 4]> = SmallVec::new();

    for &term_id in legal {
        if term_id == Grammar::EMPTY {
            continue;
        }
        let terminal = grammar.terminal(term_id);
        let Some(recognizer) = &terminal.recognizer else {
            continue;
        };
        let Some(len) = recognizer.recognize(input, pos) else {
            continue;
        };
        if len == 0 && !recognizer.zero_length_ok() {
            continue;
        }
        let token = Token {
            term: term_id,
            start: pos,
            end: pos + len,
        };
        if terminal.finish && len > 0 {
            return smallvec::smallvec![token];
        }
        matches.push(token);
    }

    select(grammar, matches)
}

fn select(grammar: &Grammar, mut matches: SmallVec<[Token; 4]>) -> SmallVec<[Token; 1]> {
    if matches.len() <= 1 {
        return matches.into_iter().collect();
    }

    // Step 0: keep only maximal-priority candidates.
    let max_prior = matches
        .iter()
        .map(|t| grammar.terminal(t.term).priority)
        .max()
        .unwrap_or_default();
    matches.retain(|t| grammar.terminal(t.term).priority == max_prior);

    let max_len = matches.iter().map(Token::len).max().unwrap_or_default();

    // Step 1: a unique `prefer` candidate at maximal length wins.
    let mut preferred = matches
        .iter()
        .filter(|t| t.len() == max_len && grammar.terminal(t.term).prefer);
    if let (Some(first), None) = (preferred.next(), preferred.next()) {
        return smallvec::smallvec![*first];
    }

    // Step 2: longest match wins.
    matches.retain(|t| t.len() == max_len);
    if matches.len() == 1 {
        return matches.into_iter().collect();
    }

    // Step 3: string literals beat regexes of equal length.
    let literal_beats_regex = |t: &Token| {
        grammar
            .terminal(t.term)
            .recognizer
            .as_ref()
            .is_some_and(Recognizer::is_literal)
    };
    let has_literal = matches.iter().any(literal_beats_regex);
    let has_regex = matches.iter().any(|t| {
        grammar
            .terminal(t.term)
            .recognizer
            .as_ref()
            .is_some_and(Recognizer::is_regex)
    });
    if has_literal && has_regex {
        matches.retain(|t| literal_beats_regex(t));
    }

    // Step 4: remaining ties go back to the caller.
    matches.into_iter().collect()
}

/// Skip characters of the whitespace set starting at `pos`.
pub(crate) fn skip_whitespace(input: &str, pos: usize, ws: &str) -> usize {
    let mut cursor = pos;
    for ch in input[pos..].chars() {
        if !ws.contains(ch) {
            break;
        }
        cursor += ch.len_utf8();
    }
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{GrammarBuilder, SymbolId, TerminalOptions};

    fn keyword_ident_grammar() -> Grammar {
        // IF is a literal, ID a regex; both can match at the same position.
        let mut builder = GrammarBuilder::new();
        let kw = builder.terminal("IF", Recognizer::literal("if"));
        let id = builder.terminal("ID", Recognizer::regex("[a-z]+").unwrap());
        let s = builder.nonterminal("S");
        builder.production(s, [kw.into(), crate::grammar::SymbolRef::from(id)]);
        builder.set_start(s);
        builder.build().unwrap()
    }

    #[test]
    fn literal_wins_over_regex_at_equal_length() {
        let grammar = keyword_ident_grammar();
        let kw = grammar.symbol("IF").and_then(SymbolId::as_term).unwrap();
        let id = grammar.symbol("ID").and_then(SymbolId::as_term).unwrap();

        let tokens = scan(&grammar, &[kw, id], "if x", 0);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].term, kw);
        assert_eq!(tokens[0].len(), 2);
    }

    #[test]
    fn longest_match_wins() {
        let grammar = keyword_ident_grammar();
        let kw = grammar.symbol("IF").and_then(SymbolId::as_term).unwrap();
        let id = grammar.symbol("ID").and_then(SymbolId::as_term).unwrap();

        // "ifx" matches IF for 2 and ID for 3; ID wins on length.
        let tokens = scan(&grammar, &[kw, id], "ifx", 0);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].term, id);
        assert_eq!(tokens[0].len(), 3);
    }

    #[test]
    fn prefer_breaks_equal_length_ties() {
        let mut builder = GrammarBuilder::new();
        let a = builder.terminal_opts(
            "A",
            Recognizer::regex("[a-z]+").unwrap(),
            TerminalOptions {
                prefer: true,
                ..TerminalOptions::default()
            },
        );
        let b = builder.terminal("B", Recognizer::regex("[a-z]+").unwrap());
        let s = builder.nonterminal("S");
        builder.production(s, [crate::grammar::SymbolRef::from(a)]);
        builder.production(s, [crate::grammar::SymbolRef::from(b)]);
        builder.set_start(s);
        let grammar = builder.build().unwrap();

        let tokens = scan(&grammar, &[a, b], "abc", 0);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].term, a);
    }

    #[test]
    fn equal_regexes_tie() {
        let mut builder = GrammarBuilder::new();
        let a = builder.terminal("A", Recognizer::regex("[a-z]+").unwrap());
        let b = builder.terminal("B", Recognizer::regex("[a-z]+").unwrap());
        let s = builder.nonterminal("S");
        builder.production(s, [crate::grammar::SymbolRef::from(a)]);
        builder.production(s, [crate::grammar::SymbolRef::from(b)]);
        builder.set_start(s);
        let grammar = builder.build().unwrap();

        let tokens = scan(&grammar, &[a, b], "abc", 0);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn priority_filters_first() {
        let mut builder = GrammarBuilder::new();
        let low = builder.terminal("low", Recognizer::regex("[a-z]+").unwrap());
        let high = builder.terminal_opts(
            "high",
            Recognizer::literal("a"),
            TerminalOptions {
                priority: 15,
                ..TerminalOptions::default()
            },
        );
        let s = builder.nonterminal("S");
        builder.production(s, [crate::grammar::SymbolRef::from(low)]);
        builder.production(s, [crate::grammar::SymbolRef::from(high)]);
        builder.set_start(s);
        let grammar = builder.build().unwrap();

        // "low" would win on length, but "high" has a greater priority.
        let tokens = scan(&grammar, &[low, high], "abc", 0);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].term, high);
    }

    #[test]
    fn eof_matches_only_at_end() {
        let grammar = Grammar::from_string("S: 'a' S | 'a';").unwrap();
        let eof = Grammar::EOF;
        assert!(scan(&grammar, &[eof], "a", 0).is_empty());
        let tokens = scan(&grammar, &[eof], "a", 1);
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_empty());
    }

    #[test]
    fn whitespace_skipping() {
        assert_eq!(skip_whitespace(" \t\nx", 0, "\t\n "), 3);
        assert_eq!(skip_whitespace("x", 0, "\t\n "), 0);
        assert_eq!(skip_whitespace("  ", 0, "\t\n "), 2);
    }
}
