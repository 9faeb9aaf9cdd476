use crate::error::VariantError;
use std::fmt;

/// A parsed value-type signature.
///
/// The grammar is a small recursive language: single-character basic codes,
/// `v` for a boxed value of any type, `a` and `m` prefixes for arrays and
/// maybes, `(...)` for tuples and `{KV}` for dictionary entries whose key is a
/// basic type. `*`, `?` and `r` are indefinite types that match any type, any
/// basic type and any tuple respectively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariantType {
    Boolean,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Handle,
    Double,
    String,
    ObjectPath,
    Signature,
    Variant,
    Any,
    Basic,
    AnyTuple,
    Maybe(Box<VariantType>),
    Array(Box<VariantType>),
    Tuple(Vec<VariantType>),
    DictEntry(Box<VariantType>, Box<VariantType>),
}

impl VariantType {
    /// Parses a complete signature. Trailing characters are an error.
    pub fn parse(signature: &str) -> Result<VariantType, VariantError> {
        let bytes = signature.as_bytes();
        let mut index = 0;
        let ty = parse_one(bytes, &mut index)
            .ok_or_else(|| VariantError::InvalidSignature(signature.to_owned()))?;
        if index != bytes.len() {
            return Err(VariantError::InvalidSignature(signature.to_owned()));
        }
        Ok(ty)
    }

    /// Parses a concatenation of zero or more complete types, as used by
    /// signature values.
    pub fn parse_sequence(signature: &str) -> Result<Vec<VariantType>, VariantError> {
        let bytes = signature.as_bytes();
        let mut index = 0;
        let mut types = vec![];
        while index < bytes.len() {
            let ty = parse_one(bytes, &mut index)
                .ok_or_else(|| VariantError::InvalidSignature(signature.to_owned()))?;
            types.push(ty);
        }
        Ok(types)
    }

    /// A definite type has no `*`, `?` or `r` anywhere inside it.
    pub fn is_definite(&self) -> bool {
        match self {
            VariantType::Any | VariantType::Basic | VariantType::AnyTuple => false,
            VariantType::Maybe(inner) | VariantType::Array(inner) => inner.is_definite(),
            VariantType::Tuple(items) => items.iter().all(VariantType::is_definite),
            VariantType::DictEntry(key, value) => key.is_definite() && value.is_definite(),
            _ => true,
        }
    }

    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            VariantType::Boolean
                | VariantType::Byte
                | VariantType::Int16
                | VariantType::UInt16
                | VariantType::Int32
                | VariantType::UInt32
                | VariantType::Int64
                | VariantType::UInt64
                | VariantType::Handle
                | VariantType::Double
                | VariantType::String
                | VariantType::ObjectPath
                | VariantType::Signature
                | VariantType::Basic
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            VariantType::Byte
                | VariantType::Int16
                | VariantType::UInt16
                | VariantType::Int32
                | VariantType::UInt32
                | VariantType::Int64
                | VariantType::UInt64
                | VariantType::Handle
        )
    }

    fn code(&self) -> Option<char> {
        Some(match self {
            VariantType::Boolean => 'b',
            VariantType::Byte => 'y',
            VariantType::Int16 => 'n',
            VariantType::UInt16 => 'q',
            VariantType::Int32 => 'i',
            VariantType::UInt32 => 'u',
            VariantType::Int64 => 'x',
            VariantType::UInt64 => 't',
            VariantType::Handle => 'h',
            VariantType::Double => 'd',
            VariantType::String => 's',
            VariantType::ObjectPath => 'o',
            VariantType::Signature => 'g',
            VariantType::Variant => 'v',
            VariantType::Any => '*',
            VariantType::Basic => '?',
            VariantType::AnyTuple => 'r',
            _ => return None,
        })
    }
}

fn basic_from_code(code: u8) -> Option<VariantType> {
    Some(match code {
        b'b' => VariantType::Boolean,
        b'y' => VariantType::Byte,
        b'n' => VariantType::Int16,
        b'q' => VariantType::UInt16,
        b'i' => VariantType::Int32,
        b'u' => VariantType::UInt32,
        b'x' => VariantType::Int64,
        b't' => VariantType::UInt64,
        b'h' => VariantType::Handle,
        b'd' => VariantType::Double,
        b's' => VariantType::String,
        b'o' => VariantType::ObjectPath,
        b'g' => VariantType::Signature,
        b'?' => VariantType::Basic,
        _ => return None,
    })
}

pub(crate) fn parse_one(bytes: &[u8], index: &mut usize) -> Option<VariantType> {
    let code = *bytes.get(*index)?;
    *index += 1;

    if let Some(basic) = basic_from_code(code) {
        return Some(basic);
    }

    match code {
        b'v' => Some(VariantType::Variant),
        b'*' => Some(VariantType::Any),
        b'r' => Some(VariantType::AnyTuple),
        b'a' => Some(VariantType::Array(Box::new(parse_one(bytes, index)?))),
        b'm' => Some(VariantType::Maybe(Box::new(parse_one(bytes, index)?))),
        b'(' => {
            let mut items = vec![];
            loop {
                if *bytes.get(*index)? == b')' {
                    *index += 1;
                    return Some(VariantType::Tuple(items));
                }
                items.push(parse_one(bytes, index)?);
            }
        }
        b'{' => {
            let key = parse_one(bytes, index)?;
            if !key.is_basic() {
                return None;
            }
            let value = parse_one(bytes, index)?;
            if *bytes.get(*index)? != b'}' {
                return None;
            }
            *index += 1;
            Some(VariantType::DictEntry(Box::new(key), Box::new(value)))
        }
        _ => None,
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        if let Some(code) = self.code() {
            return write!(f, "{}", code);
        }
        match self {
            VariantType::Maybe(inner) => write!(f, "m{}", inner),
            VariantType::Array(inner) => write!(f, "a{}", inner),
            VariantType::Tuple(items) => {
                write!(f, "(")?;
                for item in items {
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            VariantType::DictEntry(key, value) => write!(f, "{{{}{}}}", key, value),
            _ => unreachable!("basic types are handled by their code"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_codes() {
        for code in ["b", "y", "n", "q", "i", "u", "x", "t", "h", "d", "s", "o", "g", "v"] {
            let ty = VariantType::parse(code).unwrap();
            assert_eq!(ty.to_string(), code);
            assert!(ty.is_definite());
        }
    }

    #[test]
    fn parses_containers() {
        let ty = VariantType::parse("a{sv}").unwrap();
        assert_eq!(
            ty,
            VariantType::Array(Box::new(VariantType::DictEntry(
                Box::new(VariantType::String),
                Box::new(VariantType::Variant)
            )))
        );
        assert_eq!(ty.to_string(), "a{sv}");

        let ty = VariantType::parse("(ia(sd)mmb)").unwrap();
        assert_eq!(ty.to_string(), "(ia(sd)mmb)");
        assert_eq!(VariantType::parse("()").unwrap(), VariantType::Tuple(vec![]));
    }

    #[test]
    fn rejects_malformed_signatures() {
        for bad in ["", "z", "ii", "a", "m", "(i", "i)", "{ss", "{vs}", "{(i)s}", "{s}", "{sss}", "a{sv}x"] {
            assert!(
                matches!(VariantType::parse(bad), Err(VariantError::InvalidSignature(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn indefinite_types() {
        assert!(!VariantType::parse("*").unwrap().is_definite());
        assert!(!VariantType::parse("a?").unwrap().is_definite());
        assert!(!VariantType::parse("(ir)").unwrap().is_definite());
        assert!(VariantType::parse("{?*}").is_ok());
        assert!(VariantType::parse("a{sv}").unwrap().is_definite());
    }

    #[test]
    fn signature_sequences() {
        assert_eq!(VariantType::parse_sequence("").unwrap(), vec![]);
        assert_eq!(VariantType::parse_sequence("sa{sv}i").unwrap().len(), 3);
        assert!(VariantType::parse_sequence("sa").is_err());
    }
}
