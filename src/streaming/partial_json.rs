//! Best-effort decoding of truncated JSON.
//!
//! A model streaming `{"queries":[{"query":"rust asy` has not produced valid
//! JSON yet, but everything up to the cut is usable. [`parse_partial_json`]
//! closes open strings, arrays and objects, completes partial literals and
//! drops keys whose value has not started.

use serde_json::{Map, Number, Value};

/// How a value was obtained from the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// The text held a complete JSON value.
    Complete,
    /// The text was a truncated prefix and had to be closed off.
    Repaired,
}

/// Decode `input` as a possibly-truncated JSON value.
///
/// Returns `None` when nothing usable can be recovered or the text is not a
/// JSON prefix at all.
pub fn parse_partial_json(input: &str) -> Option<(Value, ParseState)> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some((value, ParseState::Complete));
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut parser = Parser {
        chars: &chars,
        pos: 0,
    };
    let parsed = parser.value().ok()?;
    let value = parsed.value?;
    let state = if parsed.complete {
        ParseState::Complete
    } else {
        ParseState::Repaired
    };
    Some((value, state))
}

/// Strip a surrounding markdown code fence (```` ```json ````) from model
/// output, tolerating a fence that has not been closed yet.
///
/// Bare JSON is returned as-is: backticks inside its string values are
/// content. Inside a fence, only a line starting with ```` ``` ```` closes
/// it, and a raw newline cannot occur inside a JSON string.
pub fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed.trim_end();
    }
    if let Some(rest) = trimmed.strip_prefix("json") {
        return rest.trim();
    }
    let Some(idx) = trimmed.find("```") else {
        return trimmed.trim_end();
    };

    let after = &trimmed[idx + 3..];
    let body = match after.find('\n') {
        Some(nl) => &after[nl + 1..],
        None => return "",
    };
    let body = if body.trim_start().starts_with("```") {
        ""
    } else {
        match body.find("\n```") {
            Some(end) => &body[..end],
            None => body,
        }
    };
    body.trim()
}

struct Parsed {
    value: Option<Value>,
    complete: bool,
}

impl Parsed {
    fn complete(value: Value) -> Self {
        Self {
            value: Some(value),
            complete: true,
        }
    }

    fn truncated(value: Option<Value>) -> Self {
        Self {
            value,
            complete: false,
        }
    }
}

#[derive(Debug)]
struct Invalid;

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Parsed, Invalid> {
        self.skip_ws();
        match self.peek() {
            None => Ok(Parsed::truncated(None)),
            Some('{') => self.object(),
            Some('[') => self.array(),
            Some('"') => self.string().map(|(s, complete)| Parsed {
                value: Some(Value::String(s)),
                complete,
            }),
            Some('t') => self.literal("true", Value::Bool(true)),
            Some('f') => self.literal("false", Value::Bool(false)),
            Some('n') => self.literal("null", Value::Null),
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(self.number()),
            Some(_) => Err(Invalid),
        }
    }

    fn object(&mut self) -> Result<Parsed, Invalid> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Parsed::truncated(Some(Value::Object(map)))),
                Some('}') => {
                    self.bump();
                    return Ok(Parsed::complete(Value::Object(map)));
                }
                Some('"') => {}
                Some(_) => return Err(Invalid),
            }

            let (key, key_complete) = self.string()?;
            if !key_complete {
                return Ok(Parsed::truncated(Some(Value::Object(map))));
            }

            self.skip_ws();
            match self.bump() {
                None => return Ok(Parsed::truncated(Some(Value::Object(map)))),
                Some(':') => {}
                Some(_) => return Err(Invalid),
            }

            let member = self.value()?;
            if let Some(value) = member.value {
                map.insert(key, value);
            }
            if !member.complete {
                return Ok(Parsed::truncated(Some(Value::Object(map))));
            }

            self.skip_ws();
            match self.bump() {
                None => return Ok(Parsed::truncated(Some(Value::Object(map)))),
                Some(',') => continue,
                Some('}') => return Ok(Parsed::complete(Value::Object(map))),
                Some(_) => return Err(Invalid),
            }
        }
    }

    fn array(&mut self) -> Result<Parsed, Invalid> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Parsed::truncated(Some(Value::Array(items)))),
                Some(']') => {
                    self.bump();
                    return Ok(Parsed::complete(Value::Array(items)));
                }
                Some(_) => {}
            }

            let item = self.value()?;
            if let Some(value) = item.value {
                items.push(value);
            }
            if !item.complete {
                return Ok(Parsed::truncated(Some(Value::Array(items))));
            }

            self.skip_ws();
            match self.bump() {
                None => return Ok(Parsed::truncated(Some(Value::Array(items)))),
                Some(',') => continue,
                Some(']') => return Ok(Parsed::complete(Value::Array(items))),
                Some(_) => return Err(Invalid),
            }
        }
    }

    /// Returns the decoded text and whether the closing quote was seen.
    fn string(&mut self) -> Result<(String, bool), Invalid> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Ok((out, false)),
                Some('"') => return Ok((out, true)),
                Some('\\') => match self.bump() {
                    None => return Ok((out, false)),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('u') => match self.unicode_escape()? {
                        Some(c) => out.push(c),
                        None => return Ok((out, false)),
                    },
                    Some(_) => return Err(Invalid),
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Decode the hex digits after `\u`. `None` means the escape was cut off.
    fn unicode_escape(&mut self) -> Result<Option<char>, Invalid> {
        let Some(high) = self.hex4()? else {
            return Ok(None);
        };
        if !(0xD800..0xDC00).contains(&high) {
            return Ok(Some(char::from_u32(high).unwrap_or('\u{FFFD}')));
        }

        // High surrogate: expect a `\uXXXX` low surrogate.
        match (self.peek(), self.chars.get(self.pos + 1).copied()) {
            (None, _) | (Some('\\'), None) => return Ok(None),
            (Some('\\'), Some('u')) => {}
            _ => return Ok(Some('\u{FFFD}')),
        }
        self.pos += 2;
        let Some(low) = self.hex4()? else {
            return Ok(None);
        };
        let combined = 0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
        Ok(Some(char::from_u32(combined).unwrap_or('\u{FFFD}')))
    }

    fn hex4(&mut self) -> Result<Option<u32>, Invalid> {
        let mut code = 0u32;
        for _ in 0..4 {
            match self.bump() {
                None => return Ok(None),
                Some(c) => {
                    let digit = c.to_digit(16).ok_or(Invalid)?;
                    code = code * 16 + digit;
                }
            }
        }
        Ok(Some(code))
    }

    fn literal(&mut self, word: &str, value: Value) -> Result<Parsed, Invalid> {
        for expected in word.chars() {
            match self.peek() {
                None => return Ok(Parsed::truncated(Some(value))),
                Some(c) if c == expected => self.pos += 1,
                Some(_) => return Err(Invalid),
            }
        }
        Ok(Parsed::complete(value))
    }

    fn number(&mut self) -> Parsed {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')
        ) {
            self.pos += 1;
        }
        let at_end = self.peek().is_none();
        let text: String = self.chars[start..self.pos].iter().collect();
        let trimmed = text.trim_end_matches(&['.', 'e', 'E', '+', '-'][..]);

        let value = parse_number(trimmed).map(Value::Number);
        Parsed {
            complete: !at_end && value.is_some() && trimmed.len() == text.len(),
            value,
        }
    }
}

fn parse_number(text: &str) -> Option<Number> {
    if text.is_empty() {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}
