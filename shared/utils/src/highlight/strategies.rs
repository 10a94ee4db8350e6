//! The matching cascade.
//!
//! Each strategy turns a phrase into a pattern and asks the [`Haystack`] for
//! the first occurrence that does not overlap a span claimed by an earlier
//! (longer) phrase. Strategies run in [`CASCADE`] order and the first one that
//! returns a span wins.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::digits::{has_eastern_digits, is_any_digit, to_eastern, to_western};
use super::NEWLINE_SENTINEL;

/// Whitespace as seen by the strategies: regular whitespace plus the line
/// break sentinel.
const WS: &str = r"[\s\x{1E}]";

/// Byte range of a located phrase in the page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    CaseInsensitive,
    FlexibleWhitespace,
    DomainToken,
    FuzzyWord,
    DigitScript,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::CaseInsensitive => "case_insensitive",
            Self::FlexibleWhitespace => "flexible_whitespace",
            Self::DomainToken => "domain_token",
            Self::FuzzyWord => "fuzzy_word",
            Self::DigitScript => "digit_script",
        }
    }

    pub fn locate(&self, phrase: &str, haystack: &Haystack<'_>) -> Result<Option<Span>, regex::Error> {
        let strategy = CASCADE
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, strategy)| *strategy)
            .unwrap_or(exact);
        strategy(phrase, haystack)
    }
}

pub type StrategyFn = fn(&str, &Haystack<'_>) -> Result<Option<Span>, regex::Error>;

/// Strategies in priority order, from strictest to most permissive.
pub const CASCADE: [(MatchStrategy, StrategyFn); 6] = [
    (MatchStrategy::Exact, exact),
    (MatchStrategy::CaseInsensitive, case_insensitive),
    (MatchStrategy::FlexibleWhitespace, flexible_whitespace),
    (MatchStrategy::DomainToken, domain_token),
    (MatchStrategy::FuzzyWord, fuzzy_word),
    (MatchStrategy::DigitScript, digit_script),
];

/// Page text being annotated plus the spans already claimed on it.
pub struct Haystack<'a> {
    text: &'a str,
    claimed: &'a [Span],
    fuzzy_min_chars: usize,
    size_limit: usize,
}

impl<'a> Haystack<'a> {
    pub fn new(text: &'a str, claimed: &'a [Span], fuzzy_min_chars: usize, size_limit: usize) -> Self {
        Self {
            text,
            claimed,
            fuzzy_min_chars,
            size_limit,
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    fn compile(&self, pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
        RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .size_limit(self.size_limit)
            .dfa_size_limit(self.size_limit)
            .build()
    }

    fn first_free(&self, regex: &Regex) -> Option<Span> {
        self.first_free_where(regex, |_| true)
    }

    /// First match of `regex` that avoids every claimed span and passes
    /// `accept`. Skipped candidates resume the search right after their start
    /// (or after the blocking span) so a later occurrence is still found.
    fn first_free_where(&self, regex: &Regex, accept: impl Fn(&str) -> bool) -> Option<Span> {
        let mut position = 0;
        while position <= self.text.len() {
            let found = regex.find_at(self.text, position)?;
            let span = Span {
                start: found.start(),
                end: found.end(),
            };
            let next_char = span.start
                + self.text[span.start..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8);

            if span.start == span.end {
                position = next_char;
                continue;
            }
            if let Some(blocker) = self.claimed.iter().find(|claimed| claimed.overlaps(&span)) {
                position = blocker.end.max(next_char);
                continue;
            }
            if !accept(found.as_str()) {
                position = next_char;
                continue;
            }
            return Some(span);
        }
        None
    }
}

fn is_gap(c: char) -> bool {
    c.is_whitespace() || c == NEWLINE_SENTINEL
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Number of whitespace runs inside a matched string.
fn whitespace_gaps(matched: &str) -> usize {
    let mut gaps = 0;
    let mut in_gap = false;
    for c in matched.chars() {
        if is_gap(c) {
            if !in_gap {
                gaps += 1;
            }
            in_gap = true;
        } else {
            in_gap = false;
        }
    }
    gaps
}

pub fn exact(phrase: &str, haystack: &Haystack<'_>) -> Result<Option<Span>, regex::Error> {
    let regex = haystack.compile(&regex::escape(phrase), false)?;
    Ok(haystack.first_free(&regex))
}

pub fn case_insensitive(phrase: &str, haystack: &Haystack<'_>) -> Result<Option<Span>, regex::Error> {
    let regex = haystack.compile(&regex::escape(phrase), true)?;
    Ok(haystack.first_free(&regex))
}

/// Words of a multi-word phrase joined by "one or more whitespace", which
/// absorbs the irregular spacing and line breaks OCR puts between words.
pub fn flexible_whitespace(phrase: &str, haystack: &Haystack<'_>) -> Result<Option<Span>, regex::Error> {
    let words: Vec<String> = phrase
        .split(is_gap)
        .filter(|word| !word.is_empty())
        .map(regex::escape)
        .collect();
    if words.len() < 2 {
        return Ok(None);
    }
    let pattern = words.join(&format!("{}+", WS));
    let regex = haystack.compile(&pattern, true)?;
    Ok(haystack.first_free(&regex))
}

/// True when the phrase holds shorthand like `B12`, `5mg` or `3/6`.
fn has_domain_token(phrase: &str) -> bool {
    let chars: Vec<char> = phrase.chars().filter(|c| !is_gap(*c)).collect();
    chars.windows(2).any(|pair| {
        (pair[0].is_alphabetic() && is_any_digit(pair[1]))
            || (is_any_digit(pair[0]) && pair[1].is_alphabetic())
    }) || chars
        .windows(3)
        .any(|w| is_any_digit(w[0]) && w[1] == '/' && is_any_digit(w[2]))
}

/// Letter/digit boundaries and slashes may carry optional whitespace, so
/// `B12` matches `B 12` and `3/6` matches `3 / 6`.
pub fn domain_token(phrase: &str, haystack: &Haystack<'_>) -> Result<Option<Span>, regex::Error> {
    if !has_domain_token(phrase) {
        return Ok(None);
    }

    let optional_gap = format!("{}*", WS);
    let mut pattern = String::new();
    let mut previous: Option<char> = None;
    let mut pending_gap = false;

    for c in phrase.chars() {
        if is_gap(c) {
            pending_gap = previous.is_some();
            continue;
        }
        if c == '/' {
            pattern.push_str(&optional_gap);
            pattern.push('/');
            pattern.push_str(&optional_gap);
            previous = Some(c);
            pending_gap = false;
            continue;
        }
        if pending_gap {
            pattern.push_str(&format!("{}+", WS));
        } else if let Some(prev) = previous {
            let boundary = (prev.is_alphabetic() && is_any_digit(c))
                || (is_any_digit(prev) && c.is_alphabetic());
            if boundary {
                pattern.push_str(&optional_gap);
            }
        }
        pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
        previous = Some(c);
        pending_gap = false;
    }

    let regex = haystack.compile(&pattern, true)?;
    Ok(haystack.first_free(&regex))
}

/// A single word with optional whitespace between every character, for OCR
/// output that splits words apart (`gra vity`). Bounded by word edges, only
/// for words of at least `fuzzy_min_chars` characters, and a match may hold
/// at most `max(1, chars / 3)` whitespace gaps.
pub fn fuzzy_word(phrase: &str, haystack: &Haystack<'_>) -> Result<Option<Span>, regex::Error> {
    let chars: Vec<char> = phrase.chars().collect();
    if chars.iter().any(|c| is_gap(*c)) || chars.len() < haystack.fuzzy_min_chars.max(1) {
        return Ok(None);
    }

    let mut pattern = String::new();
    if chars.first().copied().is_some_and(is_word_char) {
        pattern.push_str(r"\b");
    }
    let body: Vec<String> = chars
        .iter()
        .map(|c| regex::escape(c.encode_utf8(&mut [0; 4])))
        .collect();
    pattern.push_str(&body.join(&format!("{}*", WS)));
    if chars.last().copied().is_some_and(is_word_char) {
        pattern.push_str(r"\b");
    }

    let max_gaps = (chars.len() / 3).max(1);
    let regex = haystack.compile(&pattern, true)?;
    Ok(haystack.first_free_where(&regex, |matched| whitespace_gaps(matched) <= max_gaps))
}

/// The phrase with its digits rewritten in the other script, matched
/// literally, so `3/6` finds `۳/۶` and the other way round.
pub fn digit_script(phrase: &str, haystack: &Haystack<'_>) -> Result<Option<Span>, regex::Error> {
    let mut variants = Vec::with_capacity(2);
    if phrase.chars().any(|c| c.is_ascii_digit()) {
        variants.push(to_eastern(phrase));
    }
    if has_eastern_digits(phrase) {
        variants.push(to_western(phrase));
    }

    for variant in variants.iter().filter(|variant| variant.as_str() != phrase) {
        if let Some(span) = exact(variant, haystack)? {
            return Ok(Some(span));
        }
    }
    Ok(None)
}
