use crate::{
    bb::{ByteBuffer, ByteBufferMut},
    error::VariantError,
    text,
    types::VariantType,
};

use std::cmp::Ordering;
use std::fmt;
use std::ops::Index;

/// This type holds a typed configuration value.
///
/// Containers carry their element type so that empty arrays and `nothing`
/// maybes still know exactly what they are; `value_type` is therefore total
/// and always returns a definite type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Handle(i32),
    Double(f64),
    String(String),
    ObjectPath(String),
    Signature(String),
    Variant(Box<Value>),
    Maybe(VariantType, Option<Box<Value>>),
    Array(VariantType, Vec<Value>),
    Tuple(Vec<Value>),
    DictEntry(Box<Value>, Box<Value>),
}

impl Value {
    /// Parses `text` as a value of exactly type `ty`.
    ///
    /// ```
    /// use gschema_format::{Value, VariantType};
    /// let ty = VariantType::parse("(is)").unwrap();
    /// let value = Value::parse(&ty, "(5, 'five')").unwrap();
    /// assert_eq!(value.to_string(), "(5, 'five')");
    /// assert!(Value::parse(&ty, "('five', 5)").is_err());
    /// ```
    pub fn parse(ty: &VariantType, text: &str) -> Result<Value, VariantError> {
        text::parse_value(ty, text)
    }

    /// The definite type of this value.
    pub fn value_type(&self) -> VariantType {
        match self {
            Value::Boolean(_) => VariantType::Boolean,
            Value::Byte(_) => VariantType::Byte,
            Value::Int16(_) => VariantType::Int16,
            Value::UInt16(_) => VariantType::UInt16,
            Value::Int32(_) => VariantType::Int32,
            Value::UInt32(_) => VariantType::UInt32,
            Value::Int64(_) => VariantType::Int64,
            Value::UInt64(_) => VariantType::UInt64,
            Value::Handle(_) => VariantType::Handle,
            Value::Double(_) => VariantType::Double,
            Value::String(_) => VariantType::String,
            Value::ObjectPath(_) => VariantType::ObjectPath,
            Value::Signature(_) => VariantType::Signature,
            Value::Variant(_) => VariantType::Variant,
            Value::Maybe(element, _) => VariantType::Maybe(Box::new(element.clone())),
            Value::Array(element, _) => VariantType::Array(Box::new(element.clone())),
            Value::Tuple(items) => VariantType::Tuple(items.iter().map(Value::value_type).collect()),
            Value::DictEntry(key, value) => {
                VariantType::DictEntry(Box::new(key.value_type()), Box::new(value.value_type()))
            }
        }
    }

    /// A convenience method to extract a [Boolean](#variant.Boolean).
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Boolean(value) => Some(value),
            _ => None,
        }
    }

    /// Extracts any integer kind that fits in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Byte(value) => Some(value as i64),
            Value::Int16(value) => Some(value as i64),
            Value::UInt16(value) => Some(value as i64),
            Value::Int32(value) | Value::Handle(value) => Some(value as i64),
            Value::UInt32(value) => Some(value as i64),
            Value::Int64(value) => Some(value),
            Value::UInt64(value) => i64::try_from(value).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Double(value) => Some(value),
            _ => None,
        }
    }

    /// Extracts the text of a string, object path or signature.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) | Value::ObjectPath(value) | Value::Signature(value) => {
                Some(value.as_str())
            }
            _ => None,
        }
    }

    /// The children of an array or tuple. Empty for other kinds.
    pub fn as_slice(&self) -> &[Value] {
        match self {
            Value::Array(_, values) | Value::Tuple(values) => values.as_slice(),
            _ => &[],
        }
    }

    /// Number of children of an array or tuple, `0` for other kinds.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks a key up in a dictionary (an array of dict entries).
    pub fn lookup(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Array(_, entries) => entries.iter().find_map(|entry| match entry {
                Value::DictEntry(k, v) if **k == *key => Some(&**v),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Orders two scalar values of the same type; `None` for mismatched kinds
    /// and for containers.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::UInt64(a), Value::UInt64(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (a, b) if a.value_type() == b.value_type() => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => match (a.as_str(), b.as_str()) {
                    (Some(x), Some(y)) => Some(x.cmp(y)),
                    _ => None,
                },
            },
            _ => None,
        }
    }

    /// Every string contained in this value, depth first.
    pub fn strings(&self) -> Vec<&str> {
        let mut out = vec![];
        self.collect_strings(&mut out);
        out
    }

    fn collect_strings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Value::String(value) => out.push(value),
            Value::Variant(inner) => inner.collect_strings(out),
            Value::Maybe(_, Some(inner)) => inner.collect_strings(out),
            Value::Array(_, items) | Value::Tuple(items) => {
                for item in items {
                    item.collect_strings(out);
                }
            }
            Value::DictEntry(key, value) => {
                key.collect_strings(out);
                value.collect_strings(out);
            }
            _ => {}
        }
    }

    /// Encodes the payload of this value to the end of `bb`. The type is not
    /// written; see [encode_variant](#method.encode_variant).
    pub fn encode_bb(&self, bb: &mut ByteBufferMut) {
        match self {
            Value::Boolean(value) => bb.write_bool(*value),
            Value::Byte(value) => bb.write_byte(*value),
            Value::Int16(value) => bb.write_i16(*value),
            Value::UInt16(value) => bb.write_u16(*value),
            Value::Int32(value) | Value::Handle(value) => bb.write_i32(*value),
            Value::UInt32(value) => bb.write_u32(*value),
            Value::Int64(value) => bb.write_i64(*value),
            Value::UInt64(value) => bb.write_u64(*value),
            Value::Double(value) => bb.write_f64(*value),
            Value::String(value) | Value::ObjectPath(value) | Value::Signature(value) => {
                bb.write_string(value)
            }
            Value::Variant(inner) => inner.encode_variant(bb),
            Value::Maybe(_, None) => bb.write_byte(0),
            Value::Maybe(_, Some(inner)) => {
                bb.write_byte(1);
                inner.encode_bb(bb);
            }
            Value::Array(_, items) => {
                bb.write_u32(items.len() as u32);
                for item in items {
                    item.encode_bb(bb);
                }
            }
            // The unit tuple still takes a byte so that no value is zero-sized.
            Value::Tuple(items) if items.is_empty() => bb.write_byte(0),
            Value::Tuple(items) => {
                for item in items {
                    item.encode_bb(bb);
                }
            }
            Value::DictEntry(key, value) => {
                key.encode_bb(bb);
                value.encode_bb(bb);
            }
        }
    }

    /// Encodes the type signature followed by the payload.
    pub fn encode_variant(&self, bb: &mut ByteBufferMut) {
        bb.write_string(&self.value_type().to_string());
        self.encode_bb(bb);
    }

    /// Decodes a payload of type `ty` from `bb` starting at the current index.
    pub fn decode_bb(ty: &VariantType, bb: &mut ByteBuffer) -> Result<Value, ()> {
        Ok(match ty {
            VariantType::Boolean => Value::Boolean(bb.read_bool()?),
            VariantType::Byte => Value::Byte(bb.read_byte()?),
            VariantType::Int16 => Value::Int16(bb.read_i16()?),
            VariantType::UInt16 => Value::UInt16(bb.read_u16()?),
            VariantType::Int32 => Value::Int32(bb.read_i32()?),
            VariantType::UInt32 => Value::UInt32(bb.read_u32()?),
            VariantType::Int64 => Value::Int64(bb.read_i64()?),
            VariantType::UInt64 => Value::UInt64(bb.read_u64()?),
            VariantType::Handle => Value::Handle(bb.read_i32()?),
            VariantType::Double => Value::Double(bb.read_f64()?),
            VariantType::String => Value::String(bb.read_string()?.to_owned()),
            VariantType::ObjectPath => Value::ObjectPath(bb.read_string()?.to_owned()),
            VariantType::Signature => Value::Signature(bb.read_string()?.to_owned()),
            VariantType::Variant => Value::Variant(Box::new(Value::decode_variant(bb)?)),
            VariantType::Maybe(element) => match bb.read_byte()? {
                0 => Value::Maybe((**element).clone(), None),
                1 => Value::Maybe(
                    (**element).clone(),
                    Some(Box::new(Value::decode_bb(element, bb)?)),
                ),
                _ => return Err(()),
            },
            VariantType::Array(element) => {
                let len = bb.read_u32()? as usize;
                // Every element takes at least one byte.
                if len > bb.data().len() - bb.index() {
                    return Err(());
                }
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(Value::decode_bb(element, bb)?);
                }
                Value::Array((**element).clone(), items)
            }
            VariantType::Tuple(types) if types.is_empty() => match bb.read_byte()? {
                0 => Value::Tuple(vec![]),
                _ => return Err(()),
            },
            VariantType::Tuple(types) => {
                let mut items = Vec::with_capacity(types.len());
                for item in types {
                    items.push(Value::decode_bb(item, bb)?);
                }
                Value::Tuple(items)
            }
            VariantType::DictEntry(key, value) => Value::DictEntry(
                Box::new(Value::decode_bb(key, bb)?),
                Box::new(Value::decode_bb(value, bb)?),
            ),
            VariantType::Any | VariantType::Basic | VariantType::AnyTuple => return Err(()),
        })
    }

    /// Decodes a value written by [encode_variant](#method.encode_variant).
    pub fn decode_variant(bb: &mut ByteBuffer) -> Result<Value, ()> {
        let signature = bb.read_string()?;
        let ty = VariantType::parse(signature).map_err(|_| ())?;
        if !ty.is_definite() {
            return Err(());
        }
        Value::decode_bb(&ty, bb)
    }
}

impl Index<usize> for Value {
    type Output = Value;

    /// A convenience method that adds support for `self[index]` expressions on
    /// arrays and tuples. It will panic for other kinds or if the index is out
    /// of bounds.
    fn index(&self, index: usize) -> &Value {
        match self {
            Value::Array(_, values) | Value::Tuple(values) => &values[index],
            _ => panic!("value is not a container"),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter, text: &str) -> fmt::Result {
    write!(f, "'")?;
    for c in text.chars() {
        match c {
            '\'' => write!(f, "\\'")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c if (c as u32) < 0x20 || c as u32 == 0x7f => write!(f, "\\u{:04x}", c as u32)?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "'")
}

fn write_double(f: &mut fmt::Formatter, value: f64) -> fmt::Result {
    if value.is_nan() {
        write!(f, "nan")
    } else if value.is_infinite() {
        write!(f, "{}", if value > 0.0 { "inf" } else { "-inf" })
    } else if value.fract() == 0.0 {
        write!(f, "{:.1}", value)
    } else {
        write!(f, "{}", value)
    }
}

/// Prints the literal text format understood by [Value::parse].
///
/// Values boxed inside a variant are annotated with their type unless the
/// literal alone already implies it.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Boolean(value) => write!(f, "{}", value),
            Value::Byte(value) => write!(f, "0x{:02x}", value),
            Value::Int16(value) => write!(f, "{}", value),
            Value::UInt16(value) => write!(f, "{}", value),
            Value::Int32(value) | Value::Handle(value) => write!(f, "{}", value),
            Value::UInt32(value) => write!(f, "{}", value),
            Value::Int64(value) => write!(f, "{}", value),
            Value::UInt64(value) => write!(f, "{}", value),
            Value::Double(value) => write_double(f, *value),
            Value::String(value) | Value::ObjectPath(value) | Value::Signature(value) => {
                write_quoted(f, value)
            }
            Value::Variant(inner) => match inner.value_type() {
                VariantType::Boolean | VariantType::Int32 | VariantType::Double | VariantType::String => {
                    write!(f, "<{}>", inner)
                }
                ty => write!(f, "<@{} {}>", ty, inner),
            },
            Value::Maybe(_, None) => write!(f, "nothing"),
            Value::Maybe(_, Some(inner)) => match **inner {
                Value::Maybe(..) => write!(f, "just {}", inner),
                _ => write!(f, "{}", inner),
            },
            Value::Array(VariantType::DictEntry(..), entries) => {
                write!(f, "{{")?;
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match entry {
                        Value::DictEntry(key, value) => write!(f, "{}: {}", key, value)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                write!(f, "}}")
            }
            Value::Array(_, items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::DictEntry(key, value) => write!(f, "{{{}, {}}}", key, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bb::ByteOrder;

    fn parse(sig: &str, text: &str) -> Value {
        Value::parse(&VariantType::parse(sig).unwrap(), text).unwrap()
    }

    #[test]
    fn value_types_are_definite() {
        let value = parse("a{sv}", "{'a': <1>, 'b': <@as []>}");
        assert_eq!(value.value_type().to_string(), "a{sv}");
        assert_eq!(parse("ms", "nothing").value_type().to_string(), "ms");
        assert_eq!(parse("ai", "[]").value_type().to_string(), "ai");
    }

    #[test]
    fn value_accessors() {
        let value = parse("(ibsd)", "(-4, true, 'x', 1.5)");
        assert_eq!(value.len(), 4);
        assert_eq!(value[0].as_i64(), Some(-4));
        assert_eq!(value[1].as_bool(), Some(true));
        assert_eq!(value[2].as_str(), Some("x"));
        assert_eq!(value[3].as_f64(), Some(1.5));
        assert_eq!(value[3].as_i64(), None);

        let dict = parse("a{si}", "{'one': 1, 'two': 2}");
        assert_eq!(dict.lookup(&Value::String("two".into())), Some(&Value::Int32(2)));
        assert_eq!(dict.lookup(&Value::String("three".into())), None);
    }

    #[test]
    fn value_compare() {
        assert_eq!(Value::Int32(1).compare(&Value::Int32(2)), Some(Ordering::Less));
        assert_eq!(Value::UInt64(u64::MAX).compare(&Value::UInt64(0)), Some(Ordering::Greater));
        assert_eq!(Value::Double(0.5).compare(&Value::Double(0.5)), Some(Ordering::Equal));
        assert_eq!(
            Value::String("a".into()).compare(&Value::String("b".into())),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Int32(1).compare(&Value::Int64(1)), None);
    }

    #[test]
    fn value_strings() {
        let value = parse("(sas<s>ms)", "('a', ['b', 'c'], <'d'>, nothing)");
        assert_eq!(value.strings(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn value_display() {
        assert_eq!(parse("y", "7").to_string(), "0x07");
        assert_eq!(parse("d", "50").to_string(), "50.0");
        assert_eq!(parse("s", r#""it's""#).to_string(), r"'it\'s'");
        assert_eq!(parse("(i)", "(1,)").to_string(), "(1,)");
        assert_eq!(parse("mmi", "just nothing").to_string(), "just nothing");
        assert_eq!(parse("mi", "5").to_string(), "5");
        assert_eq!(parse("v", "<@n 5>").to_string(), "<@n 5>");
        assert_eq!(parse("v", "<'x'>").to_string(), "<'x'>");
        assert_eq!(parse("a{sb}", "{}").to_string(), "{}");
        assert_eq!(parse("{sb}", "{'k', false}").to_string(), "{'k', false}");
    }

    #[test]
    fn value_display_reparses() {
        let cases = [
            ("a{sv}", "{'x': <(1, 'y')>, 'z': <@ay [0x01]>}"),
            ("(dddd)", "(1e300, -0.25, inf, -inf)"),
            ("mmas", "just nothing"),
            ("s", "'tab\\there \\u0001'"),
            ("(oqtxnh)", "('/org/x', 1, 2, -3, -4, 5)"),
            ("av", "[<@mi nothing>, <@mi 4>, <()>]"),
        ];
        for (sig, text) in cases {
            let ty = VariantType::parse(sig).unwrap();
            let value = Value::parse(&ty, text).unwrap();
            let printed = value.to_string();
            assert_eq!(Value::parse(&ty, &printed).unwrap(), value, "{} printed as {}", text, printed);
        }
    }

    #[test]
    fn value_encode_and_decode() {
        let values = [
            parse("(ybnqiuxthd)", "(1, true, -2, 3, -4, 5, -6, 7, 8, 9.5)"),
            parse("a{sv}", "{'a': <['x', 'y']>, 'b': <just 3>}"),
            parse("mas", "nothing"),
            parse("(sog)", "('', '/', 'a{sv}')"),
        ];
        for order in [ByteOrder::Little, ByteOrder::Big] {
            for value in &values {
                let mut out = ByteBufferMut::new(order);
                value.encode_variant(&mut out);
                let data = out.data();
                let mut bb = ByteBuffer::new(&data, order);
                assert_eq!(Value::decode_variant(&mut bb).as_ref(), Ok(value));
                assert_eq!(bb.index(), data.len());
            }
        }
    }

    #[test]
    fn value_encoding_respects_byte_order() {
        let mut little = ByteBufferMut::new(ByteOrder::Little);
        Value::Int32(1).encode_bb(&mut little);
        let mut big = ByteBufferMut::new(ByteOrder::Big);
        Value::Int32(1).encode_bb(&mut big);
        assert_eq!(little.data(), [1, 0, 0, 0]);
        assert_eq!(big.data(), [0, 0, 0, 1]);
    }

    #[test]
    fn value_decode_rejects_garbage() {
        let mut bb = ByteBuffer::new(&[1, 0, 0, 0, b'*'], ByteOrder::Little);
        assert_eq!(Value::decode_variant(&mut bb), Err(()));

        let ty = VariantType::parse("as").unwrap();
        let mut bb = ByteBuffer::new(&[255, 255, 255, 255], ByteOrder::Little);
        assert_eq!(Value::decode_bb(&ty, &mut bb), Err(()));

        let ty = VariantType::parse("mi").unwrap();
        let mut bb = ByteBuffer::new(&[2], ByteOrder::Little);
        assert_eq!(Value::decode_bb(&ty, &mut bb), Err(()));
    }
}
