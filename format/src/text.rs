//! Parser for the literal text format of values.
//!
//! Parsing is always driven by an expected type. Where a literal appears with
//! no expected type (inside `<...>` or at the head of an unannotated array) its
//! type is inferred: integers are `i`, floats `d`, strings `s`, booleans `b`.

use crate::{
    error::VariantError,
    types::{parse_one, VariantType},
    value::Value,
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NUMBER:      Regex = Regex::new(r"^[+-]?(?:0[xX][0-9a-fA-F]+|inf|nan|(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)").unwrap();
    static ref WORD:        Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").unwrap();
    static ref OBJECT_PATH: Regex = Regex::new(r"^(?:/|(?:/[A-Za-z0-9_]+)+)$").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Punct(char),
    Annotation(VariantType),
    Str(String),
    Bytes(Vec<u8>),
    Number(String),
    Word(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Punct(c) => format!("'{}'", c),
            Token::Annotation(ty) => format!("'@{}'", ty),
            Token::Str(_) => "a string".to_owned(),
            Token::Bytes(_) => "a bytestring".to_owned(),
            Token::Number(text) => format!("number {}", text),
            Token::Word(word) => format!("'{}'", word),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = vec![];
    let mut rest = text;

    loop {
        rest = rest.trim_start();
        let offset = text.len() - rest.len();
        let Some(first) = rest.chars().next() else {
            break;
        };

        match first {
            '[' | ']' | '(' | ')' | '{' | '}' | '<' | '>' | ',' | ':' => {
                tokens.push(Token::Punct(first));
                rest = &rest[1..];
            }
            '@' => {
                let bytes = rest.as_bytes();
                let mut index = 1;
                let ty = parse_one(bytes, &mut index)
                    .ok_or_else(|| format!("invalid type annotation at offset {}", offset))?;
                tokens.push(Token::Annotation(ty));
                rest = &rest[index..];
            }
            '\'' | '"' => {
                let (value, used) = read_quoted(rest)
                    .ok_or_else(|| format!("unterminated string at offset {}", offset))?;
                tokens.push(Token::Str(value));
                rest = &rest[used..];
            }
            'b' if rest[1..].starts_with(|c: char| c == '\'' || c == '"') => {
                let (value, used) = read_quoted(&rest[1..])
                    .ok_or_else(|| format!("unterminated bytestring at offset {}", offset))?;
                tokens.push(Token::Bytes(value.into_bytes()));
                rest = &rest[1 + used..];
            }
            c if c.is_ascii_digit() || c == '+' || c == '-' || c == '.' => {
                let m = NUMBER
                    .find(rest)
                    .ok_or_else(|| format!("invalid number at offset {}", offset))?;
                tokens.push(Token::Number(m.as_str().to_owned()));
                rest = &rest[m.end()..];
            }
            _ => {
                let m = WORD
                    .find(rest)
                    .ok_or_else(|| format!("unexpected character '{}' at offset {}", first, offset))?;
                tokens.push(Token::Word(m.as_str().to_owned()));
                rest = &rest[m.end()..];
            }
        }
    }

    Ok(tokens)
}

/// Reads a quoted string starting at the opening quote. Returns the unescaped
/// text and the number of bytes consumed including both quotes.
fn read_quoted(input: &str) -> Option<(String, usize)> {
    let mut chars = input.char_indices();
    let (_, quote) = chars.next()?;
    let mut out = String::new();

    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Some((out, i + c.len_utf8()));
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        let (_, escaped) = chars.next()?;
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            'a' => out.push('\u{7}'),
            'u' | 'U' => {
                let len = if escaped == 'u' { 4 } else { 8 };
                let mut code = 0u32;
                for _ in 0..len {
                    let (_, digit) = chars.next()?;
                    code = code * 16 + digit.to_digit(16)?;
                }
                out.push(char::from_u32(code)?);
            }
            other => out.push(other),
        }
    }
    None
}

fn keyword_type(word: &str) -> Option<VariantType> {
    Some(match word {
        "boolean" => VariantType::Boolean,
        "byte" => VariantType::Byte,
        "int16" => VariantType::Int16,
        "uint16" => VariantType::UInt16,
        "int32" => VariantType::Int32,
        "uint32" => VariantType::UInt32,
        "int64" => VariantType::Int64,
        "uint64" => VariantType::UInt64,
        "handle" => VariantType::Handle,
        "double" => VariantType::Double,
        "string" => VariantType::String,
        "objectpath" => VariantType::ObjectPath,
        "signature" => VariantType::Signature,
        _ => return None,
    })
}

fn is_float_literal(text: &str) -> bool {
    let digits = text.trim_start_matches(&['+', '-'][..]);
    if digits.starts_with("0x") || digits.starts_with("0X") {
        return false;
    }
    digits.contains(&['.', 'e', 'E'][..]) || digits == "inf" || digits == "nan"
}

fn parse_integer(text: &str) -> Option<i128> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i128>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn number_value(text: &str, ty: &VariantType) -> Result<Value, String> {
    if *ty == VariantType::Double {
        if !is_float_literal(text) {
            let n = parse_integer(text).ok_or_else(|| format!("invalid number {}", text))?;
            return Ok(Value::Double(n as f64));
        }
        return text
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| format!("invalid number {}", text));
    }

    if !ty.is_integer() {
        return Err(format!("found number {} where a value of type {} was expected", text, ty));
    }
    if is_float_literal(text) {
        return Err(format!("floating point literal {} is not a valid {}", text, ty));
    }

    let n = parse_integer(text).ok_or_else(|| format!("invalid number {}", text))?;
    let out_of_range = || format!("{} is out of range for type {}", text, ty);
    Ok(match ty {
        VariantType::Byte => Value::Byte(u8::try_from(n).map_err(|_| out_of_range())?),
        VariantType::Int16 => Value::Int16(i16::try_from(n).map_err(|_| out_of_range())?),
        VariantType::UInt16 => Value::UInt16(u16::try_from(n).map_err(|_| out_of_range())?),
        VariantType::Int32 => Value::Int32(i32::try_from(n).map_err(|_| out_of_range())?),
        VariantType::UInt32 => Value::UInt32(u32::try_from(n).map_err(|_| out_of_range())?),
        VariantType::Int64 => Value::Int64(i64::try_from(n).map_err(|_| out_of_range())?),
        VariantType::UInt64 => Value::UInt64(u64::try_from(n).map_err(|_| out_of_range())?),
        VariantType::Handle => Value::Handle(i32::try_from(n).map_err(|_| out_of_range())?),
        _ => unreachable!("checked by is_integer"),
    })
}

fn string_value(text: String, ty: &VariantType) -> Result<Value, String> {
    match ty {
        VariantType::String => Ok(Value::String(text)),
        VariantType::ObjectPath if OBJECT_PATH.is_match(&text) => Ok(Value::ObjectPath(text)),
        VariantType::ObjectPath => Err(format!("'{}' is not a valid object path", text)),
        VariantType::Signature if VariantType::parse_sequence(&text).is_ok() => {
            Ok(Value::Signature(text))
        }
        VariantType::Signature => Err(format!("'{}' is not a valid signature", text)),
        _ => Err(format!("found a string where a value of type {} was expected", ty)),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos:    usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, String> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| "unexpected end of input".to_owned())?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        if self.eat(c) {
            return Ok(());
        }
        match self.peek() {
            Some(token) => Err(format!("expected '{}' but found {}", c, token.describe())),
            None => Err(format!("expected '{}' but found end of input", c)),
        }
    }

    /// Parses one value. `expected` is `None` when the type must be inferred.
    fn value(&mut self, expected: Option<&VariantType>) -> Result<Value, String> {
        let token = self.peek().cloned().ok_or_else(|| "unexpected end of input".to_owned())?;

        // Annotations and typed keywords fix the type of what follows.
        let annotated = match &token {
            Token::Annotation(ty) => Some(ty.clone()),
            Token::Word(word) => keyword_type(word),
            _ => None,
        };
        if let Some(ty) = annotated {
            self.pos += 1;
            if !ty.is_definite() {
                return Err(format!("type annotation {} is not definite", ty));
            }
            if let Some(expected) = expected {
                if ty != *expected {
                    return Err(format!("annotated type {} does not match {}", ty, expected));
                }
            }
            return self.value(Some(&ty));
        }

        // A maybe may be written without `just`.
        if let Some(VariantType::Maybe(inner)) = expected {
            return match token {
                Token::Word(ref word) if word == "nothing" => {
                    self.pos += 1;
                    Ok(Value::Maybe((**inner).clone(), None))
                }
                Token::Word(ref word) if word == "just" => {
                    self.pos += 1;
                    let value = self.value(Some(inner))?;
                    Ok(Value::Maybe((**inner).clone(), Some(Box::new(value))))
                }
                _ => {
                    let value = self.value(Some(inner))?;
                    Ok(Value::Maybe((**inner).clone(), Some(Box::new(value))))
                }
            };
        }

        match token {
            Token::Word(word) => self.word(&word, expected),
            Token::Number(text) => {
                self.pos += 1;
                let ty = match expected {
                    Some(ty) => ty.clone(),
                    None if is_float_literal(&text) => VariantType::Double,
                    None => VariantType::Int32,
                };
                number_value(&text, &ty)
            }
            Token::Str(text) => {
                self.pos += 1;
                string_value(text, expected.unwrap_or(&VariantType::String))
            }
            Token::Bytes(bytes) => {
                self.pos += 1;
                match expected {
                    Some(ty) if !is_byte_array(ty) => {
                        Err(format!("found a bytestring where a value of type {} was expected", ty))
                    }
                    _ => Ok(Value::Array(
                        VariantType::Byte,
                        bytes.into_iter().map(Value::Byte).collect(),
                    )),
                }
            }
            Token::Punct('[') => self.array(expected),
            Token::Punct('(') => self.tuple(expected),
            Token::Punct('{') => self.braces(expected),
            Token::Punct('<') => {
                if let Some(ty) = expected {
                    if *ty != VariantType::Variant {
                        return Err(format!("found a variant where a value of type {} was expected", ty));
                    }
                }
                self.pos += 1;
                let inner = self.value(None)?;
                self.expect('>')?;
                Ok(Value::Variant(Box::new(inner)))
            }
            other => Err(format!("unexpected {}", other.describe())),
        }
    }

    fn word(&mut self, word: &str, expected: Option<&VariantType>) -> Result<Value, String> {
        self.pos += 1;
        match (word, expected) {
            ("true" | "false", None | Some(VariantType::Boolean)) => Ok(Value::Boolean(word == "true")),
            ("true" | "false", Some(ty)) => {
                Err(format!("found boolean where a value of type {} was expected", ty))
            }
            ("inf" | "nan", _) => number_value(word, expected.unwrap_or(&VariantType::Double)),
            ("nothing", None) => Err("unable to infer the type of 'nothing'".to_owned()),
            ("just", None) => {
                let inner = self.value(None)?;
                Ok(Value::Maybe(inner.value_type(), Some(Box::new(inner))))
            }
            ("nothing" | "just", Some(ty)) => {
                Err(format!("found '{}' where a value of type {} was expected", word, ty))
            }
            _ => Err(format!("unknown keyword '{}'", word)),
        }
    }

    fn array(&mut self, expected: Option<&VariantType>) -> Result<Value, String> {
        let mut element = match expected {
            Some(VariantType::Array(element)) => Some((**element).clone()),
            Some(ty) => return Err(format!("found an array where a value of type {} was expected", ty)),
            None => None,
        };
        self.expect('[')?;
        let mut items = vec![];
        while !self.eat(']') {
            if !items.is_empty() {
                self.expect(',')?;
                // trailing comma
                if self.eat(']') {
                    break;
                }
            }
            let item = self.value(element.as_ref())?;
            if element.is_none() {
                element = Some(item.value_type());
            }
            items.push(item);
        }
        let element = element.ok_or_else(|| "unable to infer the type of an empty array".to_owned())?;
        Ok(Value::Array(element, items))
    }

    fn tuple(&mut self, expected: Option<&VariantType>) -> Result<Value, String> {
        self.expect('(')?;
        match expected {
            Some(VariantType::Tuple(types)) => {
                let mut items = vec![];
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        self.expect(',')?;
                    }
                    items.push(self.value(Some(ty))?);
                }
                if types.len() == 1 {
                    self.expect(',')
                        .map_err(|_| "a 1-tuple needs a trailing comma".to_owned())?;
                } else if !types.is_empty() {
                    self.eat(',');
                }
                self.expect(')')
                    .map_err(|_| format!("tuple does not have exactly {} elements", types.len()))?;
                Ok(Value::Tuple(items))
            }
            Some(ty) => {
                // parenthesized expression
                let value = self.value(Some(ty))?;
                self.expect(')')?;
                Ok(value)
            }
            None => {
                let mut items = vec![];
                let mut trailing_comma = false;
                while !self.eat(')') {
                    if !items.is_empty() {
                        self.expect(',')?;
                        trailing_comma = true;
                        if self.eat(')') {
                            break;
                        }
                    }
                    items.push(self.value(None)?);
                    trailing_comma = false;
                }
                if items.len() == 1 && !trailing_comma {
                    return Ok(items.remove(0));
                }
                Ok(Value::Tuple(items))
            }
        }
    }

    /// `{k: v, ...}` dictionaries and `{k, v}` dict entries.
    fn braces(&mut self, expected: Option<&VariantType>) -> Result<Value, String> {
        let (entry, is_dict) = match expected {
            None => (None, None),
            Some(VariantType::Array(element)) if matches!(**element, VariantType::DictEntry(..)) => {
                (Some(&**element), Some(true))
            }
            Some(entry @ VariantType::DictEntry(..)) => (Some(entry), Some(false)),
            Some(ty) => {
                return Err(format!("found a dictionary where a value of type {} was expected", ty))
            }
        };
        let (key_ty, value_ty) = match entry {
            Some(VariantType::DictEntry(k, v)) => (Some((**k).clone()), Some((**v).clone())),
            _ => (None, None),
        };
        self.expect('{')?;

        if is_dict != Some(false) && self.eat('}') {
            return match (key_ty, value_ty) {
                (Some(k), Some(v)) => Ok(Value::Array(
                    VariantType::DictEntry(Box::new(k), Box::new(v)),
                    vec![],
                )),
                _ => Err("unable to infer the type of an empty dictionary".to_owned()),
            };
        }

        let key = self.value(key_ty.as_ref())?;
        if !key.value_type().is_basic() {
            return Err(format!("dictionary keys must be basic, found {}", key.value_type()));
        }
        let is_dict = match is_dict {
            Some(is_dict) => is_dict,
            None => self.peek() == Some(&Token::Punct(':')),
        };

        if !is_dict {
            self.expect(',')?;
            let value = self.value(value_ty.as_ref())?;
            self.expect('}')?;
            return Ok(Value::DictEntry(Box::new(key), Box::new(value)));
        }

        self.expect(':')?;
        let value = self.value(value_ty.as_ref())?;
        let key_ty = key.value_type();
        let value_ty = value.value_type();
        let mut entries = vec![Value::DictEntry(Box::new(key), Box::new(value))];
        while !self.eat('}') {
            self.expect(',')?;
            if self.eat('}') {
                break;
            }
            let key = self.value(Some(&key_ty))?;
            self.expect(':')?;
            let value = self.value(Some(&value_ty))?;
            entries.push(Value::DictEntry(Box::new(key), Box::new(value)));
        }
        Ok(Value::Array(
            VariantType::DictEntry(Box::new(key_ty), Box::new(value_ty)),
            entries,
        ))
    }
}

fn is_byte_array(ty: &VariantType) -> bool {
    matches!(ty, VariantType::Array(element) if **element == VariantType::Byte)
}

/// Parses `text` as exactly one value of type `ty`.
pub fn parse_value(ty: &VariantType, text: &str) -> Result<Value, VariantError> {
    if !ty.is_definite() {
        return Err(VariantError::IndefiniteType(ty.to_string()));
    }
    let mismatch = |reason: String| VariantError::Mismatch {
        text:     text.to_owned(),
        expected: ty.to_string(),
        reason,
    };

    let tokens = tokenize(text).map_err(mismatch)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.value(Some(ty)).map_err(mismatch)?;
    if let Some(token) = parser.peek() {
        return Err(mismatch(format!("unexpected {} after the value", token.describe())));
    }
    debug_assert_eq!(value.value_type(), *ty);
    Ok(value)
}
