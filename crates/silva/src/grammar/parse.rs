//! The textual grammar front-end.
//!
//! Parses the surface form into a staged [`GrammarBuilder`]:
//!
//! ```text
//! E: E '+' E {left, 1} | E '*' E {left, 2} | number;
//! number: /\d+/;
//! ```
//!
//! Rules use `:` or `=`; alternatives are `|`-separated sequences of symbol
//! references (names, inline `'literals'`, inline `/regexes/`); each
//! alternative may end in a `{...}` group of disambiguation flags. A name
//! whose single body is one recognizer is a terminal rule; defining it more
//! than once turns it into a non-terminal with alternative expansions.
//! Symbols take the repetition operators `*`, `+` and `?`, optionally with a
//! separator (`item+[comma]`), which synthesize helper non-terminals. `//`
//! line and `/* */` block comments (nesting allowed) are layout.

use crate::error::GrammarError;
use crate::grammar::builder::{GrammarBuilder, SymbolRef, TerminalOptions};
use crate::grammar::{Associativity, NonTermId};
use crate::scanner::Recognizer;
use compact_str::CompactString;
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
enum RawSymKind {
    Name(CompactString),
    Literal(CompactString),
    Regex(CompactString),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepKind {
    ZeroOrMore,
    OneOrMore,
    Optional,
}

#[derive(Debug, Clone)]
struct RawSym {
    kind: RawSymKind,
    rep: Option<(RepKind, Option<CompactString>)>,
}

#[derive(Debug, Clone, Default)]
struct RawFlags {
    priority: Option<u32>,
    assoc: Associativity,
    prefer: bool,
    dynamic: bool,
    nops: bool,
    nopse: bool,
    finish: Option<bool>,
}

#[derive(Debug, Clone)]
struct RawAlt {
    symbols: Vec<RawSym>,
    flags: RawFlags,
}

#[derive(Debug, Clone)]
struct RawRule {
    name: CompactString,
    alternatives: Vec<RawAlt>,
}

impl GrammarBuilder {
    /// Stage a builder from the textual grammar form. Recognizer overrides
    /// for externally recognized terminals can be added before `build`.
    ///
    /// # Errors
    ///
    /// [`GrammarError::Syntax`] for malformed grammar text.
    pub fn from_string(source: &str) -> Result<Self, GrammarError> {
        let rules = Cursor::new(source).parse_rules()?;
        assemble(rules)
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> GrammarError {
        let (line, column) = crate::error::line_col(self.src, self.pos);
        GrammarError::Syntax {
            position: self.pos,
            line,
            column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), GrammarError> {
        if self.eat(ch) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{ch}'")))
        }
    }

    /// Skip whitespace, `//` line comments and (nesting) `/* */` blocks.
    fn skip_trivia(&mut self) -> Result<(), GrammarError> {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.src[self.pos..].starts_with("//") => {
                    while let Some(ch) = self.bump() {
                        if ch == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.src[self.pos..].starts_with("/*") => {
                    self.pos += 2;
                    let mut depth = 1usize;
                    while depth > 0 {
                        if self.src[self.pos..].starts_with("/*") {
                            self.pos += 2;
                            depth += 1;
                        } else if self.src[self.pos..].starts_with("*/") {
                            self.pos += 2;
                            depth -= 1;
                        } else if self.bump().is_none() {
                            return Err(self.error("unterminated block comment"));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn is_name_char(ch: char) -> bool {
        ch.is_ascii_alphanumeric() || ch == '_'
    }

    fn name(&mut self) -> Result<CompactString, GrammarError> {
        let start = self.pos;
        while self.peek().is_some_and(Self::is_name_char) {
            self.bump();
        }
        if start == self.pos {
            return Err(self.error("expected a name"));
        }
        Ok(self.src[start..self.pos].into())
    }

    fn integer(&mut self) -> Result<u32, GrammarError> {
        let start = self.pos;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.bump();
        }
        self.src[start..self.pos]
            .parse()
            .map_err(|_| self.error("expected an integer"))
    }

    /// A `'...'` or `"..."` literal with the usual escapes.
    fn string_literal(&mut self, quote: char) -> Result<CompactString, GrammarError> {
        self.expect(quote)?;
        let mut value = CompactString::default();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('\\') => value.push('\\'),
                    Some(ch) if ch == quote => value.push(quote),
                    Some(ch) => {
                        value.push('\\');
                        value.push(ch);
                    }
                    None => return Err(self.error("unterminated escape")),
                },
                Some(ch) if ch == quote => return Ok(value),
                Some(ch) => value.push(ch),
            }
        }
    }

    /// A `/regex/` body; `\/` escapes the delimiter.
    fn regex_literal(&mut self) -> Result<CompactString, GrammarError> {
        self.expect('/')?;
        let mut pattern = CompactString::default();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated regex")),
                Some('\\') => match self.bump() {
                    Some('/') => pattern.push('/'),
                    Some(ch) => {
                        pattern.push('\\');
                        pattern.push(ch);
                    }
                    None => return Err(self.error("unterminated regex escape")),
                },
                Some('/') => return Ok(pattern),
                Some(ch) => pattern.push(ch),
            }
        }
    }

    fn parse_rules(&mut self) -> Result<Vec<RawRule>, GrammarError> {
        let mut rules = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.peek().is_none() {
                break;
            }
            rules.push(self.parse_rule()?);
        }
        if rules.is_empty() {
            return Err(self.error("empty grammar"));
        }
        Ok(rules)
    }

    fn parse_rule(&mut self) -> Result<RawRule, GrammarError> {
        let name = self.name()?;
        self.skip_trivia()?;
        if !self.eat(':') && !self.eat('=') {
            return Err(self.error("expected ':' or '=' after rule name"));
        }
        let mut alternatives = vec![self.parse_alternative()?];
        loop {
            self.skip_trivia()?;
            if self.eat('|') {
                alternatives.push(self.parse_alternative()?);
            } else {
                self.expect(';')?;
                break;
            }
        }
        Ok(RawRule { name, alternatives })
    }

    fn parse_alternative(&mut self) -> Result<RawAlt, GrammarError> {
        let mut symbols = Vec::new();
        let mut flags = RawFlags::default();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some('\'') => {
                    let value = self.string_literal('\'')?;
                    symbols.push(self.with_repetition(RawSymKind::Literal(value))?);
                }
                Some('"') => {
                    let value = self.string_literal('"')?;
                    symbols.push(self.with_repetition(RawSymKind::Literal(value))?);
                }
                Some('/') => {
                    let pattern = self.regex_literal()?;
                    symbols.push(self.with_repetition(RawSymKind::Regex(pattern))?);
                }
                Some('{') => {
                    flags = self.parse_flags()?;
                    break;
                }
                Some(ch) if Self::is_name_char(ch) => {
                    let name = self.name()?;
                    symbols.push(self.with_repetition(RawSymKind::Name(name))?);
                }
                _ => break,
            }
        }
        Ok(RawAlt { symbols, flags })
    }

    fn with_repetition(&mut self, kind: RawSymKind) -> Result<RawSym, GrammarError> {
        let rep_kind = match self.peek() {
            Some('*') => Some(RepKind::ZeroOrMore),
            Some('+') => Some(RepKind::OneOrMore),
            Some('?') => Some(RepKind::Optional),
            _ => None,
        };
        let Some(rep_kind) = rep_kind else {
            return Ok(RawSym { kind, rep: None });
        };
        self.bump();
        let separator = if self.eat('[') {
            self.skip_trivia()?;
            let sep = self.name()?;
            self.skip_trivia()?;
            self.expect(']')?;
            Some(sep)
        } else {
            None
        };
        Ok(RawSym {
            kind,
            rep: Some((rep_kind, separator)),
        })
    }

    fn parse_flags(&mut self) -> Result<RawFlags, GrammarError> {
        self.expect('{')?;
        let mut flags = RawFlags::default();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(ch) if ch.is_ascii_digit() => {
                    flags.priority = Some(self.integer()?);
                }
                Some(ch) if Self::is_name_char(ch) => {
                    let word = self.name()?;
                    match word.as_str() {
                        "left" => flags.assoc = Associativity::Left,
                        "right" => flags.assoc = Associativity::Right,
                        "prefer" => flags.prefer = true,
                        "dynamic" => flags.dynamic = true,
                        "nops" => flags.nops = true,
                        "nopse" => flags.nopse = true,
                        "finish" => flags.finish = Some(true),
                        "nofinish" => flags.finish = Some(false),
                        other => {
                            return Err(self.error(format!("unknown flag '{other}'")));
                        }
                    }
                }
                _ => return Err(self.error("expected a flag")),
            }
            self.skip_trivia()?;
            if self.eat(',') {
                continue;
            }
            self.expect('}')?;
            return Ok(flags);
        }
    }
}

/// A name is a terminal rule iff its whole definition is one alternative
/// holding exactly one unrepeated recognizer.
fn is_terminal_rule(alternatives: &[RawAlt]) -> bool {
    match alternatives {
        [alt] => match alt.symbols.as_slice() {
            [sym] => {
                sym.rep.is_none()
                    && matches!(sym.kind, RawSymKind::Literal(_) | RawSymKind::Regex(_))
            }
            [] => true,
            _ => false,
        },
        _ => false,
    }
}

fn terminal_options(flags: &RawFlags) -> TerminalOptions {
    TerminalOptions {
        priority: flags.priority.unwrap_or(crate::grammar::DEFAULT_PRIORITY),
        prefer: flags.prefer,
        finish: flags.finish.unwrap_or(false),
        dynamic: flags.dynamic,
    }
}

struct Assembler {
    builder: GrammarBuilder,
    synthesized: HashSet<CompactString, ahash::RandomState>,
}

fn assemble(rules: Vec<RawRule>) -> Result<GrammarBuilder, GrammarError> {
    // Group alternatives per name, keeping first-definition order.
    let mut order: Vec<CompactString> = Vec::new();
    let mut grouped: HashMap<CompactString, Vec<RawAlt>, ahash::RandomState> =
        HashMap::with_hasher(ahash::RandomState::new());
    for rule in rules {
        if !grouped.contains_key(&rule.name) {
            order.push(rule.name.clone());
        }
        grouped
            .entry(rule.name)
            .or_default()
            .extend(rule.alternatives);
    }

    let mut assembler = Assembler {
        builder: GrammarBuilder::new(),
        synthesized: HashSet::with_hasher(ahash::RandomState::new()),
    };
    let mut start: Option<NonTermId> = None;

    // Terminal rules first, so non-terminal bodies can reference them.
    for name in &order {
        let alternatives = &grouped[name];
        if !is_terminal_rule(alternatives) {
            continue;
        }
        let alt = &alternatives[0];
        let options = terminal_options(&alt.flags);
        match alt.symbols.first().map(|sym| &sym.kind) {
            Some(RawSymKind::Literal(value)) => {
                assembler
                    .builder
                    .terminal_opts(name.clone(), Recognizer::literal(value.clone()), options);
            }
            Some(RawSymKind::Regex(pattern)) => {
                let recognizer =
                    Recognizer::regex(pattern).map_err(|message| GrammarError::InvalidRegex {
                        name: name.clone(),
                        message,
                    })?;
                assembler
                    .builder
                    .terminal_opts(name.clone(), recognizer, options);
            }
            _ => {
                // `NAME: ;` declares a terminal recognized externally.
                assembler.builder.external_terminal(name.clone(), options);
            }
        }
    }

    // Declare every non-terminal, then add productions.
    for name in &order {
        if !is_terminal_rule(&grouped[name]) {
            let id = assembler.builder.nonterminal(name.clone());
            start.get_or_insert(id);
        }
    }
    for name in &order {
        let alternatives = &grouped[name];
        if is_terminal_rule(alternatives) {
            continue;
        }
        let lhs = assembler.builder.nonterminal(name.clone());
        for alt in alternatives {
            let mut refs: Vec<SymbolRef> = Vec::with_capacity(alt.symbols.len());
            for sym in &alt.symbols {
                refs.push(assembler.symbol_ref(sym)?);
            }
            let mut prod = assembler.builder.production(lhs, refs);
            if let Some(priority) = alt.flags.priority {
                prod = prod.priority(priority);
            }
            prod = prod.assoc(alt.flags.assoc);
            if alt.flags.prefer {
                prod = prod.prefer();
            }
            if alt.flags.dynamic {
                prod = prod.dynamic();
            }
            if alt.flags.nops {
                prod = prod.nops();
            }
            if alt.flags.nopse {
                let _ = prod.nopse();
            }
        }
    }

    let start = start.ok_or(GrammarError::NoStartSymbol)?;
    assembler.builder.set_start(start);
    Ok(assembler.builder)
}

impl Assembler {
    fn symbol_ref(&mut self, sym: &RawSym) -> Result<SymbolRef, GrammarError> {
        let base = match &sym.kind {
            RawSymKind::Name(name) => SymbolRef::Name(name.clone()),
            RawSymKind::Literal(value) => SymbolRef::Literal(value.clone()),
            RawSymKind::Regex(pattern) => SymbolRef::Regex(pattern.clone()),
        };
        let Some((rep, separator)) = &sym.rep else {
            return Ok(base);
        };
        let base_name: CompactString = match &sym.kind {
            RawSymKind::Name(name) => name.clone(),
            RawSymKind::Literal(value) | RawSymKind::Regex(value) => value.clone(),
        };
        let helper = match rep {
            RepKind::OneOrMore => self.one_or_more(&base_name, base, separator.as_ref()),
            RepKind::ZeroOrMore => self.zero_or_more(&base_name, base, separator.as_ref()),
            RepKind::Optional => {
                if separator.is_some() {
                    return Err(GrammarError::SeparatorOnOptional {
                        symbol: base_name,
                    });
                }
                self.optional(&base_name, base)
            }
        };
        Ok(SymbolRef::Sym(helper.into()))
    }

    /// `x+` (and `x+[sep]`): left-recursive collection.
    fn one_or_more(
        &mut self,
        base_name: &str,
        base: SymbolRef,
        separator: Option<&CompactString>,
    ) -> NonTermId {
        let name = match separator {
            Some(sep) => CompactString::from(format!("{base_name}_1_{sep}")),
            None => CompactString::from(format!("{base_name}_1")),
        };
        let id = self.builder.nonterminal(name.clone());
        if self.synthesized.insert(name) {
            let mut recursive: Vec<SymbolRef> = vec![SymbolRef::Sym(id.into())];
            if let Some(sep) = separator {
                recursive.push(SymbolRef::Name(sep.clone()));
            }
            recursive.push(base.clone());
            self.builder.production(id, recursive);
            self.builder.production(id, vec![base]);
        }
        id
    }

    /// `x*` (and `x*[sep]`): one-or-more, or nothing.
    fn zero_or_more(
        &mut self,
        base_name: &str,
        base: SymbolRef,
        separator: Option<&CompactString>,
    ) -> NonTermId {
        let name = match separator {
            Some(sep) => CompactString::from(format!("{base_name}_0_{sep}")),
            None => CompactString::from(format!("{base_name}_0")),
        };
        let id = self.builder.nonterminal(name.clone());
        if self.synthesized.insert(name) {
            let inner = self.one_or_more(base_name, base, separator);
            self.builder.production(id, vec![SymbolRef::Sym(inner.into())]);
            self.builder
                .production(id, vec![SymbolRef::Name("EMPTY".into())]);
        }
        id
    }

    /// `x?`: the symbol or nothing.
    fn optional(&mut self, base_name: &str, base: SymbolRef) -> NonTermId {
        let name = CompactString::from(format!("{base_name}_opt"));
        let id = self.builder.nonterminal(name.clone());
        if self.synthesized.insert(name) {
            self.builder.production(id, vec![base]);
            self.builder
                .production(id, vec![SymbolRef::Name("EMPTY".into())]);
        }
        id
    }
}
