use regex::Regex;
use lazy_static::lazy_static;
use crate::utils::{quote, error_at};
use crate::error::SchemaError;

const NAME: &str = r"[A-Za-z_:][A-Za-z0-9_.:-]*";

lazy_static! {
    static ref COMMENT:     Regex = Regex::new(r"^<!--(?s:.*?)-->").unwrap();
    static ref INSTRUCTION: Regex = Regex::new(r"^<\?(?s:.*?)\?>").unwrap();
    static ref DOCTYPE:     Regex = Regex::new(r"^<!DOCTYPE[^>]*>").unwrap();
    static ref CDATA:       Regex = Regex::new(r"^<!\[CDATA\[((?s:.*?))\]\]>").unwrap();
    static ref START_TAG:   Regex = Regex::new(&format!(
        r#"^<({NAME})((?:\s+{NAME}\s*=\s*(?:"[^"<]*"|'[^'<]*'))*)\s*(/?)>"#
    )).unwrap();
    static ref ATTRIBUTE:   Regex = Regex::new(&format!(
        r#"({NAME})\s*=\s*(?:"([^"<]*)"|'([^'<]*)')"#
    )).unwrap();
    static ref END_TAG:     Regex = Regex::new(&format!(r"^</({NAME})\s*>")).unwrap();
    static ref TEXT:        Regex = Regex::new(r"^[^<]+").unwrap();
    static ref ENTITY:      Regex = Regex::new(r"&(?:#x([0-9A-Fa-f]+)|#([0-9]+)|([A-Za-z]+));").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start {
        name:       String,
        attributes: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub event:  Event,
    pub line:   usize,
    pub column: usize,
}

/// Splits a markup document into start, end and text events.
///
/// Element nesting is checked here, so every `Start` has a matching `End` and
/// there is exactly one root element.
pub fn tokenize_markup(text: &str) -> Result<Vec<Token>, SchemaError> {
    let mut tokens = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut seen_root = false;
    let mut line = 1;
    let mut column = 1;
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];

        let consumed = if let Some(m) = COMMENT.find(rest) {
            m.end()
        } else if let Some(m) = INSTRUCTION.find(rest) {
            m.end()
        } else if let Some(m) = DOCTYPE.find(rest) {
            if seen_root {
                return Err(syntax("DOCTYPE may only appear before the root element", line, column));
            }
            m.end()
        } else if let Some(caps) = CDATA.captures(rest) {
            if open.is_empty() {
                return Err(syntax("CDATA may only appear inside an element", line, column));
            }
            tokens.push(Token {
                event: Event::Text { text: caps[1].to_string() },
                line,
                column,
            });
            caps[0].len()
        } else if let Some(caps) = START_TAG.captures(rest) {
            let name = caps[1].to_string();
            if open.is_empty() && seen_root {
                return Err(syntax(
                    &format!("unexpected element {} after the root element", quote(&name)),
                    line,
                    column,
                ));
            }
            seen_root = true;

            let mut attributes: Vec<(String, String)> = Vec::new();
            for attr in ATTRIBUTE.captures_iter(&caps[2]) {
                let attr_name = attr[1].to_string();
                if attributes.iter().any(|(n, _)| *n == attr_name) {
                    return Err(syntax(
                        &format!("attribute {} given twice on element {}", quote(&attr_name), quote(&name)),
                        line,
                        column,
                    ));
                }
                let raw = attr.get(2).or_else(|| attr.get(3)).map_or("", |m| m.as_str());
                let value = decode_entities(raw).map_err(|e| error_at(e, line, column))?;
                attributes.push((attr_name, value));
            }

            let self_closing = &caps[3] == "/";
            tokens.push(Token {
                event: Event::Start { name: name.clone(), attributes },
                line,
                column,
            });
            if self_closing {
                tokens.push(Token {
                    event: Event::End { name },
                    line,
                    column,
                });
            } else {
                open.push(name);
            }
            caps[0].len()
        } else if let Some(caps) = END_TAG.captures(rest) {
            let name = &caps[1];
            match open.pop() {
                Some(expected) if expected == name => {}
                Some(expected) => {
                    return Err(syntax(
                        &format!("element {} was closed, but the currently open element is {}", quote(name), quote(&expected)),
                        line,
                        column,
                    ))
                }
                None => {
                    return Err(syntax(
                        &format!("element {} was closed, but no element is open", quote(name)),
                        line,
                        column,
                    ))
                }
            }
            tokens.push(Token {
                event: Event::End { name: name.to_string() },
                line,
                column,
            });
            caps[0].len()
        } else if let Some(m) = TEXT.find(rest) {
            let part = m.as_str();
            if open.is_empty() {
                if !part.trim().is_empty() {
                    return Err(syntax(
                        &format!("text {} outside of the root element", quote(part.trim())),
                        line,
                        column,
                    ));
                }
            } else {
                let decoded = decode_entities(part).map_err(|e| error_at(e, line, column))?;
                tokens.push(Token {
                    event: Event::Text { text: decoded },
                    line,
                    column,
                });
            }
            m.end()
        } else {
            let snippet: String = rest.chars().take(16).collect();
            return Err(syntax(&format!("Syntax error: {}", quote(&snippet)), line, column));
        };

        // Update line/column
        let part = &rest[..consumed];
        let newline_count = part.matches('\n').count();
        if newline_count > 0 {
            line += newline_count;
            if let Some(last_line_part) = part.split('\n').last() {
                column = last_line_part.chars().count() + 1;
            }
        } else {
            column += part.chars().count();
        }
        pos += consumed;
    }

    if let Some(name) = open.last() {
        return Err(syntax(
            &format!("document ended with element {} still open", quote(name)),
            line,
            column,
        ));
    }
    if !seen_root {
        return Err(syntax("document was empty or contained only whitespace", line, column));
    }

    Ok(tokens)
}

fn syntax(msg: &str, line: usize, column: usize) -> SchemaError {
    error_at(SchemaError::Syntax(msg.to_string()), line, column)
}

/// Character references may only name characters legal in a document.
fn xml_char(code: u32) -> Option<char> {
    match code {
        0x9 | 0xA | 0xD | 0x20..=0xFFFD | 0x10000..=0x10FFFF => char::from_u32(code),
        _ => None,
    }
}

/// Replaces the predefined entities and character references in `text`.
fn decode_entities(text: &str) -> Result<String, SchemaError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in ENTITY.captures_iter(text) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        check_ampersands(&text[last..whole.start])?;
        out.push_str(&text[last..whole.start]);

        let decoded = if let Some(hex) = caps.get(1) {
            u32::from_str_radix(hex.as_str(), 16).ok().and_then(xml_char)
        } else if let Some(dec) = caps.get(2) {
            dec.as_str().parse::<u32>().ok().and_then(xml_char)
        } else {
            match &caps[3] {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => None,
            }
        };
        match decoded {
            Some(c) => out.push(c),
            None => {
                return Err(SchemaError::Syntax(format!(
                    "unknown entity or character reference {}",
                    quote(&caps[0])
                )))
            }
        }
        last = whole.end;
    }
    check_ampersands(&text[last..])?;
    out.push_str(&text[last..]);
    Ok(out)
}

fn check_ampersands(text: &str) -> Result<(), SchemaError> {
    if text.contains('&') {
        return Err(SchemaError::Syntax(
            "'&' must start an entity; write '&amp;' for a literal ampersand".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(name: &str, attributes: &[(&str, &str)], line: usize, column: usize) -> Token {
        Token {
            event: Event::Start {
                name:       name.into(),
                attributes: attributes.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            },
            line,
            column,
        }
    }

    fn end(name: &str, line: usize, column: usize) -> Token {
        Token { event: Event::End { name: name.into() }, line, column }
    }

    fn text(text: &str, line: usize, column: usize) -> Token {
        Token { event: Event::Text { text: text.into() }, line, column }
    }

    #[test]
    fn test_tokenize_simple() {
        let input = "<a x=\"1\"><b y='2'/>hi</a>";
        let expected = vec![
            start("a", &[("x", "1")], 1, 1),
            start("b", &[("y", "2")], 1, 10),
            end("b", 1, 10),
            text("hi", 1, 20),
            end("a", 1, 22),
        ];
        assert_eq!(tokenize_markup(input).unwrap(), expected);
    }

    #[test]
    fn test_tokenize_tracks_lines() {
        let input = "<?xml version=\"1.0\"?>\n<!-- note -->\n<a>\n  <b/>\n</a>\n";
        let got = tokenize_markup(input).unwrap();
        assert_eq!(got[0], start("a", &[], 3, 1));
        assert_eq!(got[1], text("\n  ", 3, 4));
        assert_eq!(got[2], start("b", &[], 4, 3));
        assert_eq!(got[5], end("a", 5, 1));
    }

    #[test]
    fn test_tokenize_entities_and_cdata() {
        let input = "<a v='&lt;&#65;&#x42;&amp;'>&quot;x&apos;<![CDATA[<raw & text>]]></a>";
        let got = tokenize_markup(input).unwrap();
        assert_eq!(got[0], start("a", &[("v", "<AB&")], 1, 1));
        assert_eq!(got[1].event, Event::Text { text: "\"x'".into() });
        assert_eq!(got[2].event, Event::Text { text: "<raw & text>".into() });
    }

    #[test]
    fn test_tokenize_doctype() {
        let input = "<!DOCTYPE schemalist SYSTEM \"x.dtd\"><schemalist/>";
        let got = tokenize_markup(input).unwrap();
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn test_tokenize_errors() {
        for input in [
            "",
            "   ",
            "<a><b></a></b>",
            "<a>",
            "</a>",
            "<a></a><b></b>",
            "hello<a/>",
            "<a>&bogus;</a>",
            "<a>fish & chips</a>",
            "<a>&#0;</a>",
            "<a>&#1;</a>",
            "<a v='&#xFFFF;'/>",
            "<a x='1' x='2'/>",
            "<a <b/>",
        ] {
            let err = tokenize_markup(input).unwrap_err();
            assert!(
                matches!(err.root(), SchemaError::Syntax(_)),
                "expected a syntax error for {:?} but got {:?}",
                input,
                err
            );
        }
    }

    #[test]
    fn test_error_position() {
        let err = tokenize_markup("<a>\n  <b>\n</a>").unwrap_err();
        assert!(matches!(err, SchemaError::At { line: 3, column: 1, .. }), "{:?}", err);
    }
}
