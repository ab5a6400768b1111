//! Search query language.
//!
//! Parses user-typed query strings into an immutable [`Query`] tree.
//!
//! # Supported syntax
//!
//! - `word`: term in the default field
//! - `field:word`: term in a named field (`from:alice`, `subject:budget`)
//! - `field:(a b)`: every unfielded term inside uses `field`
//! - `"exact phrase"` / `field:"exact phrase"`: adjacent terms in order
//! - `~label`: documents carrying a label
//! - `-term`: NOT (exclude)
//! - `a b`: implicit AND
//! - `a OR b`: OR (binds tighter than AND)
//! - `( ... )`: grouping
//!
//! Words are split into index terms the same way indexed text is, so a word
//! such as `alice@example.com` becomes the phrase `"alice example com"`.

use std::fmt;

use crate::error::{Result, StoreError};
use crate::search::text::tokenize;

/// A parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// A single index term in a field.
    Term { field: String, word: String },
    /// Consecutive index terms in a field.
    Phrase { field: String, words: Vec<String> },
    /// Documents carrying a label.
    Label(String),
    /// Documents not matching the inner query.
    Not(Box<Query>),
    /// Documents matching every sub-query.
    And(Vec<Query>),
    /// Documents matching at least one sub-query.
    Or(Vec<Query>),
}

impl Query {
    /// Parse `text`. Unfielded terms go to `default_field`.
    pub fn parse(default_field: &str, text: &str) -> Result<Self> {
        let fail = |reason: &str| StoreError::QueryParse {
            query: text.to_string(),
            reason: reason.to_string(),
        };

        let tokens = lex(text).map_err(|reason| fail(&reason))?;
        let mut parser = Parser {
            tokens,
            pos: 0,
        };
        let query = parser
            .parse_conjunction(default_field)
            .map_err(|reason| fail(&reason))?;
        if parser.pos < parser.tokens.len() {
            return Err(fail("unbalanced ')'"));
        }
        query.ok_or_else(|| fail("query has no searchable terms"))
    }

    /// Term query on an already tokenized word.
    pub fn term(field: &str, word: &str) -> Self {
        Self::Term {
            field: field.to_string(),
            word: word.to_string(),
        }
    }

    /// Label query (`~label`).
    pub fn label(label: &str) -> Self {
        Self::Label(label.to_lowercase())
    }

    /// Negation of `query`.
    pub fn negate(query: Query) -> Self {
        Self::Not(Box::new(query))
    }

    /// Conjunction of `self` and `other`, flattening nested ANDs.
    pub fn and(self, other: Query) -> Self {
        let mut parts = Vec::new();
        for q in [self, other] {
            match q {
                Self::And(inner) => parts.extend(inner),
                q => parts.push(q),
            }
        }
        Self::And(parts)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term { field, word } => write!(f, "{field}:\"{word}\""),
            Self::Phrase { field, words } => write!(f, "{field}:\"{}\"", words.join(" ")),
            Self::Label(label) => write!(f, "~{label}"),
            Self::Not(inner) => write!(f, "-{inner}"),
            Self::And(parts) | Self::Or(parts) => {
                let op = if matches!(self, Self::And(_)) { "AND" } else { "OR" };
                write!(f, "({op}")?;
                for part in parts {
                    write!(f, " {part}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Not,
    Or,
    Label(String),
    Field(String),
    Word(String),
    Phrase(String),
}

fn is_word_break(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"')
}

fn lex(text: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    // True right after `field:`, where a value must follow directly.
    let mut expect_value = false;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            if expect_value {
                return Err("missing value after field".to_string());
            }
            i += 1;
            continue;
        }

        let at_term_start = !expect_value;
        expect_value = false;
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '"')
                    .map(|p| i + 1 + p)
                    .ok_or_else(|| "unterminated phrase".to_string())?;
                tokens.push(Token::Phrase(chars[i + 1..end].iter().collect()));
                i = end + 1;
            }
            '-' if at_term_start
                && chars.get(i + 1).is_some_and(|&n| !n.is_whitespace()) =>
            {
                tokens.push(Token::Not);
                i += 1;
            }
            '~' if at_term_start => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && !is_word_break(chars[end]) {
                    end += 1;
                }
                if end == start {
                    return Err("missing label after '~'".to_string());
                }
                tokens.push(Token::Label(chars[start..end].iter().collect()));
                i = end;
            }
            _ => {
                let start = i;
                let mut end = start;
                while end < chars.len() && !is_word_break(chars[end]) {
                    end += 1;
                }
                let word: String = chars[start..end].iter().collect();
                i = end;

                if at_term_start && word == "OR" {
                    tokens.push(Token::Or);
                    continue;
                }

                if at_term_start {
                    if let Some((field, rest)) = word.split_once(':') {
                        let valid_field = !field.is_empty()
                            && field.chars().all(|c| c.is_alphanumeric() || c == '_');
                        if valid_field {
                            tokens.push(Token::Field(field.to_lowercase()));
                            if rest.is_empty() {
                                if i >= chars.len() {
                                    return Err("missing value after field".to_string());
                                }
                                expect_value = true;
                            } else {
                                tokens.push(Token::Word(rest.to_string()));
                            }
                            continue;
                        }
                    }
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    if expect_value {
        return Err("missing value after field".to_string());
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult = std::result::Result<Option<Query>, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    /// Implicit AND of OR-groups up to `)` or the end.
    fn parse_conjunction(&mut self, field: &str) -> ParseResult {
        let mut parts = Vec::new();
        while let Some(token) = self.peek() {
            if *token == Token::RParen {
                break;
            }
            if let Some(q) = self.parse_disjunction(field)? {
                parts.push(q);
            }
        }
        Ok(combine(parts, Query::And))
    }

    fn parse_disjunction(&mut self, field: &str) -> ParseResult {
        let mut parts = Vec::new();
        parts.extend(self.parse_unary(field)?);
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            if self.peek().is_none() || self.peek() == Some(&Token::RParen) {
                return Err("missing term after OR".to_string());
            }
            parts.extend(self.parse_unary(field)?);
        }
        Ok(combine(parts, Query::Or))
    }

    fn parse_unary(&mut self, field: &str) -> ParseResult {
        match self.advance() {
            Some(Token::Not) => Ok(self.parse_unary(field)?.map(Query::negate)),
            Some(Token::Label(label)) => Ok(Some(Query::label(&label))),
            Some(Token::Field(name)) => self.parse_field_value(&name),
            Some(Token::Word(word)) => Ok(words_query(field, &word)),
            Some(Token::Phrase(text)) => Ok(words_query(field, &text)),
            Some(Token::LParen) => self.parse_group(field),
            Some(Token::Or) => Err("OR without a left-hand term".to_string()),
            Some(Token::RParen) => Err("unbalanced ')'".to_string()),
            None => Err("unexpected end of query".to_string()),
        }
    }

    fn parse_field_value(&mut self, field: &str) -> ParseResult {
        match self.advance() {
            Some(Token::Word(word)) => Ok(words_query(field, &word)),
            Some(Token::Phrase(text)) => Ok(words_query(field, &text)),
            Some(Token::LParen) => self.parse_group(field),
            _ => Err(format!("invalid value for field '{field}'")),
        }
    }

    fn parse_group(&mut self, field: &str) -> ParseResult {
        let inner = self.parse_conjunction(field)?;
        match self.advance() {
            Some(Token::RParen) => Ok(inner),
            _ => Err("unbalanced '('".to_string()),
        }
    }
}

fn combine(mut parts: Vec<Query>, wrap: fn(Vec<Query>) -> Query) -> Option<Query> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(wrap(parts)),
    }
}

/// A word or phrase becomes a term, a phrase of terms, or nothing at all
/// when it holds no letters or digits.
fn words_query(field: &str, text: &str) -> Option<Query> {
    let mut words = tokenize(text);
    match words.len() {
        0 => None,
        1 => words.pop().map(|word| Query::Term {
            field: field.to_string(),
            word,
        }),
        _ => Some(Query::Phrase {
            field: field.to_string(),
            words,
        }),
    }
}
