use thiserror::Error;

use crate::utils::quote;

pub const MAX_NAME_LENGTH: usize = 32;

/// What a name is going to be used for. Both classes follow the same rules,
/// the class only changes the wording of the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameClass {
    Key,
    Child,
}

impl NameClass {
    fn noun(self) -> &'static str {
        match self {
            NameClass::Key => "key name",
            NameClass::Child => "child name",
        }
    }
}

/// The first rule a rejected name breaks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("empty names are not permitted")]
    Empty,

    #[error("invalid name {name}: names must begin with a lowercase letter")]
    BadStart { name: String },

    #[error("invalid name {name}: invalid character {character}; only lowercase letters, numbers and dash ('-') are permitted")]
    BadCharacter { name: String, character: String },

    #[error("invalid name {name}: two successive dashes ('--') are not permitted")]
    DoubleDash { name: String },

    #[error("invalid name {name}: the last character may not be a dash ('-')")]
    TrailingDash { name: String },

    #[error("invalid {class} {name}: maximum length is {}", MAX_NAME_LENGTH)]
    TooLong { name: String, class: &'static str },
}

/// Checks a key or child name. Returns the first violated rule.
pub fn verify_name(name: &str, class: NameClass) -> Result<(), NameError> {
    let mut chars = name.chars();
    let first = match chars.next() {
        Some(first) => first,
        None => return Err(NameError::Empty),
    };

    if !first.is_ascii_lowercase() {
        return Err(NameError::BadStart { name: quote(name) });
    }

    let mut previous = first;
    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return Err(NameError::BadCharacter {
                name:      quote(name),
                character: quote(&c.to_string()),
            });
        }
        if c == '-' && previous == '-' {
            return Err(NameError::DoubleDash { name: quote(name) });
        }
        previous = c;
    }

    if previous == '-' {
        return Err(NameError::TrailingDash { name: quote(name) });
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(NameError::TooLong {
            name:  quote(name),
            class: class.noun(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_names() {
        for name in ["a", "volume", "font-size", "x11-display", "a1-b2-c3"] {
            assert_eq!(verify_name(name, NameClass::Key), Ok(()), "{}", name);
        }
        let longest = "a".repeat(MAX_NAME_LENGTH);
        assert_eq!(verify_name(&longest, NameClass::Child), Ok(()));
    }

    #[test]
    fn test_rules_in_order() {
        assert_eq!(verify_name("", NameClass::Key), Err(NameError::Empty));
        assert!(matches!(verify_name("Volume", NameClass::Key), Err(NameError::BadStart { .. })));
        assert!(matches!(verify_name("1st", NameClass::Key), Err(NameError::BadStart { .. })));
        assert!(matches!(verify_name("-a", NameClass::Key), Err(NameError::BadStart { .. })));
        assert!(matches!(
            verify_name("font_size", NameClass::Key),
            Err(NameError::BadCharacter { .. })
        ));
        assert!(matches!(verify_name("fontSize", NameClass::Key), Err(NameError::BadCharacter { .. })));
        assert!(matches!(verify_name("a--b", NameClass::Key), Err(NameError::DoubleDash { .. })));
        assert!(matches!(verify_name("ab-", NameClass::Key), Err(NameError::TrailingDash { .. })));
        // the first offending character decides
        assert!(matches!(verify_name("a--B", NameClass::Key), Err(NameError::DoubleDash { .. })));
        assert!(matches!(verify_name("a-B--", NameClass::Key), Err(NameError::BadCharacter { .. })));
    }

    #[test]
    fn test_length_limit() {
        let name = "a".repeat(MAX_NAME_LENGTH + 1);
        let err = verify_name(&name, NameClass::Child).unwrap_err();
        assert!(matches!(err, NameError::TooLong { class: "child name", .. }));
        assert!(err.to_string().contains("maximum length is 32"));
    }

    #[test]
    fn test_idempotent() {
        for name in ["ok-name", "Bad", "a--b", ""] {
            assert_eq!(verify_name(name, NameClass::Key), verify_name(name, NameClass::Key));
        }
    }
}
