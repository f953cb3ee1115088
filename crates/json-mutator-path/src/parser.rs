//! Path expression parser.
//!
//! Grammar, informally:
//!
//! ```text
//! path     := (head tail*)?
//! head     := name | '*' | bracket
//! tail     := '.' name | '.' '*' | bracket
//! bracket  := '[' selector (',' selector)* ']'
//! selector := '*' | quoted | int | int? ':' int? | '_key' '==' quoted
//! ```

use thiserror::Error;

use crate::types::{Path, PathSegment};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("Unexpected end of input")]
    UnexpectedEnd,
    #[error("Invalid escape sequence")]
    InvalidEscape,
    #[error("Invalid number")]
    InvalidNumber,
    #[error("Unclosed string")]
    UnclosedString,
    #[error("Empty bracket selector")]
    EmptySelector,
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),
    #[error("Invalid path segment: {0}")]
    InvalidSegment(String),
}

/// Path expression parser.
pub struct PathParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> PathParser<'a> {
    /// Parse a path expression. The empty string is the root path.
    pub fn parse(input: &'a str) -> Result<Path, ParseError> {
        let mut parser = Self { input, pos: 0 };
        parser.parse_path()
    }

    fn parse_path(&mut self) -> Result<Path, ParseError> {
        let mut segments = Vec::new();
        self.skip_whitespace();
        if self.is_at_end() {
            return Ok(Path::root());
        }

        match self.peek() {
            Some('[') => segments.push(self.parse_bracket()?),
            Some('*') => {
                self.advance();
                segments.push(PathSegment::Wildcard);
            }
            _ => segments.push(PathSegment::Key(self.parse_identifier()?)),
        }

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some('.') => {
                    self.advance();
                    if self.peek() == Some('*') {
                        self.advance();
                        segments.push(PathSegment::Wildcard);
                    } else {
                        segments.push(PathSegment::Key(self.parse_identifier()?));
                    }
                }
                Some('[') => segments.push(self.parse_bracket()?),
                Some(c) => return Err(ParseError::UnexpectedChar(c, self.pos)),
            }
        }

        Ok(Path::new(segments))
    }

    fn parse_bracket(&mut self) -> Result<PathSegment, ParseError> {
        self.expect('[')?;
        let mut selectors = Vec::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some(']') {
                if selectors.is_empty() {
                    return Err(ParseError::EmptySelector);
                }
                return Err(ParseError::UnexpectedChar(']', self.pos));
            }
            selectors.push(self.parse_selector()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.advance(),
                Some(']') => {
                    self.advance();
                    break;
                }
                Some(c) => return Err(ParseError::UnexpectedChar(c, self.pos)),
                None => return Err(ParseError::UnexpectedEnd),
            }
        }

        if selectors.len() == 1 {
            Ok(selectors.remove(0))
        } else {
            Ok(PathSegment::Union(selectors))
        }
    }

    fn parse_selector(&mut self) -> Result<PathSegment, ParseError> {
        match self.peek() {
            Some('*') => {
                self.advance();
                Ok(PathSegment::Wildcard)
            }
            Some('\'') | Some('"') => Ok(PathSegment::Key(self.parse_string()?)),
            Some('?') => {
                let rest = self.input[self.pos..].split(']').next().unwrap_or_default();
                Err(ParseError::UnsupportedFilter(rest.to_string()))
            }
            Some('-') | Some('0'..='9') | Some(':') => self.parse_index_or_range(),
            Some(_) if self.peek_str("_key") => self.parse_key_filter(),
            Some(c) => Err(ParseError::UnexpectedChar(c, self.pos)),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn parse_index_or_range(&mut self) -> Result<PathSegment, ParseError> {
        let from = if self.peek() == Some(':') {
            None
        } else {
            Some(self.parse_int()?)
        };
        self.skip_whitespace();
        if self.peek() != Some(':') {
            return from.map(PathSegment::Index).ok_or(ParseError::InvalidNumber);
        }
        self.advance();
        self.skip_whitespace();
        let to = match self.peek() {
            Some('-') | Some('0'..='9') => Some(self.parse_int()?),
            _ => None,
        };
        Ok(PathSegment::Range(from, to))
    }

    fn parse_key_filter(&mut self) -> Result<PathSegment, ParseError> {
        let start = self.pos;
        self.advance_by(4);
        self.skip_whitespace();
        if !self.peek_str("==") {
            let rest = self.input[start..].split(']').next().unwrap_or_default();
            return Err(ParseError::UnsupportedFilter(rest.to_string()));
        }
        self.advance_by(2);
        self.skip_whitespace();
        match self.peek() {
            Some('\'') | Some('"') => Ok(PathSegment::Keyed(self.parse_string()?)),
            Some(c) => Err(ParseError::UnexpectedChar(c, self.pos)),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' || c == '$' => self.advance(),
            Some(c) => return Err(ParseError::UnexpectedChar(c, self.pos)),
            None => return Err(ParseError::UnexpectedEnd),
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_int(&mut self) -> Result<isize, ParseError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        if !matches!(self.peek(), Some('0'..='9')) {
            return Err(ParseError::InvalidNumber);
        }
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }
        self.input[start..self.pos]
            .parse::<isize>()
            .map_err(|_| ParseError::InvalidNumber)
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            Some(c) => return Err(ParseError::UnexpectedChar(c, self.pos)),
            None => return Err(ParseError::UnexpectedEnd),
        };
        self.advance();

        let mut result = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::UnclosedString),
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('b') => result.push('\u{0008}'),
                        Some('f') => result.push('\u{000C}'),
                        Some('/') => result.push('/'),
                        Some('\\') => result.push('\\'),
                        Some('\'') => result.push('\''),
                        Some('"') => result.push('"'),
                        Some('u') => {
                            self.advance();
                            result.push(self.parse_unicode_escape()?);
                            continue;
                        }
                        _ => return Err(ParseError::InvalidEscape),
                    }
                    self.advance();
                }
                Some(c) => {
                    result.push(c);
                    self.advance();
                }
            }
        }
        Ok(result)
    }

    fn parse_unicode_escape(&mut self) -> Result<char, ParseError> {
        let end = self.pos + 4;
        let hex = self.input.get(self.pos..end).ok_or(ParseError::InvalidEscape)?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| ParseError::InvalidEscape)?;
        self.pos = end;
        char::from_u32(code).ok_or(ParseError::InvalidEscape)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.advance();
                Ok(())
            }
            Some(c) => Err(ParseError::UnexpectedChar(c, self.pos)),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(input: &str) -> Vec<PathSegment> {
        PathParser::parse(input).unwrap().segments
    }

    #[test]
    fn empty_input_is_root() {
        assert!(segments("").is_empty());
        assert!(segments("   ").is_empty());
    }

    #[test]
    fn dotted_names() {
        assert_eq!(
            segments("a.b.c"),
            vec![
                PathSegment::Key("a".into()),
                PathSegment::Key("b".into()),
                PathSegment::Key("c".into())
            ]
        );
    }

    #[test]
    fn key_filter_with_either_quote() {
        assert_eq!(segments(r#"[_key=="x"]"#), vec![PathSegment::Keyed("x".into())]);
        assert_eq!(segments("[_key == 'x']"), vec![PathSegment::Keyed("x".into())]);
    }

    #[test]
    fn ranges_with_open_ends() {
        assert_eq!(segments("a[1:3]")[1], PathSegment::Range(Some(1), Some(3)));
        assert_eq!(segments("a[:3]")[1], PathSegment::Range(None, Some(3)));
        assert_eq!(segments("a[2:]")[1], PathSegment::Range(Some(2), None));
        assert_eq!(segments("a[-2:]")[1], PathSegment::Range(Some(-2), None));
    }

    #[test]
    fn errors_carry_position() {
        assert_eq!(
            PathParser::parse("a.b#"),
            Err(ParseError::UnexpectedChar('#', 3))
        );
        assert_eq!(PathParser::parse("a["), Err(ParseError::UnexpectedEnd));
        assert_eq!(PathParser::parse("a[]"), Err(ParseError::EmptySelector));
        assert_eq!(PathParser::parse("a['x"), Err(ParseError::UnclosedString));
        assert!(matches!(
            PathParser::parse("a[?(@.x > 1)]"),
            Err(ParseError::UnsupportedFilter(_))
        ));
        assert!(matches!(
            PathParser::parse("a[_key != 'x']"),
            Err(ParseError::UnsupportedFilter(_))
        ));
    }
}
