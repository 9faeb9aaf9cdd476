use std::collections::BTreeMap;

use gschema_format::{Value, VariantType};
use tracing::{debug, trace};

use crate::{
    error::SchemaError,
    tokenizer::{Event, Token},
    types::{Constraints, EntryId, SchemaSet},
    utils::{error_at, quote},
    verifier::{verify_name, NameClass},
};

/// The elements a schema file may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    SchemaList,
    Schema,
    Key,
    Child,
    Default,
    Summary,
    Description,
    Range,
    Choice,
    Min,
    Max,
}

impl Element {
    pub fn from_name(name: &str) -> Option<Element> {
        Some(match name {
            "schema-list" | "schemalist" => Element::SchemaList,
            "schema" => Element::Schema,
            "key" => Element::Key,
            "child" => Element::Child,
            "default" => Element::Default,
            "summary" => Element::Summary,
            "description" => Element::Description,
            "range" => Element::Range,
            "choice" => Element::Choice,
            "min" => Element::Min,
            "max" => Element::Max,
            _ => return None,
        })
    }

    /// The only element this one may appear in; `None` means toplevel.
    pub fn container(self) -> Option<Element> {
        match self {
            Element::SchemaList => None,
            Element::Schema => Some(Element::SchemaList),
            Element::Key | Element::Child => Some(Element::Schema),
            Element::Default | Element::Summary | Element::Description | Element::Range => Some(Element::Key),
            Element::Choice | Element::Min | Element::Max => Some(Element::Range),
        }
    }

    pub fn required_attributes(self) -> &'static [&'static str] {
        match self {
            Element::Schema => &["id"],
            Element::Key => &["name", "type"],
            Element::Child => &["name", "schema"],
            Element::Choice => &["value"],
            _ => &[],
        }
    }

    pub fn optional_attributes(self) -> &'static [&'static str] {
        match self {
            Element::SchemaList => &["gettext-domain"],
            Element::Schema => &["path", "gettext-domain"],
            Element::Default => &["l10n", "context"],
            _ => &[],
        }
    }
}

/// Attribute values of one element, checked against its allowed set.
struct Attributes<'a> {
    values: Vec<(&'static str, &'a str)>,
}

impl<'a> Attributes<'a> {
    fn collect(element: Element, name: &str, raw: &'a [(String, String)]) -> Result<Attributes<'a>, SchemaError> {
        let mut values = Vec::new();
        for (attr, value) in raw {
            let known = element
                .required_attributes()
                .iter()
                .chain(element.optional_attributes())
                .find(|known| **known == attr.as_str());
            match known {
                Some(known) => values.push((*known, value.as_str())),
                None => {
                    return Err(SchemaError::Attribute(format!(
                        "attribute {} invalid for element <{}>",
                        quote(attr),
                        name
                    )))
                }
            }
        }
        for required in element.required_attributes() {
            if !values.iter().any(|(attr, _)| attr == required) {
                return Err(SchemaError::Attribute(format!(
                    "element <{}> requires attribute {}",
                    name,
                    quote(required)
                )));
            }
        }
        Ok(Attributes { values })
    }

    fn get(&self, attr: &str) -> Option<&'a str> {
        self.values.iter().find(|(name, _)| *name == attr).map(|(_, value)| *value)
    }

    fn required(&self, attr: &str) -> &'a str {
        self.get(attr).unwrap_or_default()
    }
}

/// The key currently being built.
#[derive(Debug)]
struct PendingKey {
    id:          EntryId,
    value_type:  VariantType,
    default:     Option<Value>,
    options:     BTreeMap<String, Value>,
    summary:     Option<String>,
    description: Option<String>,
    constraints: Constraints,
    saw_range:   bool,
    min:         Option<Value>,
    max:         Option<Value>,
}

/// Mutable state carried through the parse of one or more files.
pub struct ParseState<'s> {
    set:         &'s mut SchemaSet,
    stack:       Vec<(Element, String)>,
    list_domain: Option<String>,
    schema:      Option<String>,
    key:         Option<PendingKey>,
    text:        Option<String>,
    l10n:        Option<u8>,
    context:     Option<String>,
}

impl<'s> ParseState<'s> {
    pub fn new(set: &'s mut SchemaSet) -> ParseState<'s> {
        ParseState {
            set,
            stack: Vec::new(),
            list_domain: None,
            schema: None,
            key: None,
            text: None,
            l10n: None,
            context: None,
        }
    }

    /// Feeds the events of one document through the state machine.
    pub fn parse(&mut self, tokens: &[Token]) -> Result<(), SchemaError> {
        for token in tokens {
            let result = match &token.event {
                Event::Start { name, attributes } => self.start_element(name, attributes),
                Event::End { name } => self.end_element(name),
                Event::Text { text } => self.text(text),
            };
            result.map_err(|e| error_at(e, token.line, token.column))?;
        }
        Ok(())
    }

    fn start_element(&mut self, name: &str, raw: &[(String, String)]) -> Result<(), SchemaError> {
        let container = self.stack.last().map(|(element, _)| *element);
        let element = match Element::from_name(name) {
            Some(element) if element.container() == container => element,
            _ => {
                return Err(SchemaError::UnknownElement {
                    element:   name.to_owned(),
                    container: self.stack.last().map(|(_, name)| name.clone()),
                })
            }
        };
        let attributes = Attributes::collect(element, name, raw)?;
        trace!(element = name, "enter");

        match element {
            Element::SchemaList => self.enter_schema_list(&attributes),
            Element::Schema => self.enter_schema(&attributes)?,
            Element::Key => self.enter_key(&attributes)?,
            Element::Child => self.enter_child(&attributes)?,
            Element::Default => self.enter_default(&attributes)?,
            Element::Summary | Element::Description => self.enter_text(element)?,
            Element::Range => self.enter_range()?,
            Element::Choice => self.enter_choice(&attributes)?,
            Element::Min | Element::Max => self.enter_bound(element)?,
        }

        self.stack.push((element, name.to_owned()));
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<(), SchemaError> {
        let element = match self.stack.pop() {
            Some((element, _)) => element,
            None => return Err(SchemaError::Syntax(format!("unexpected end of element <{}>", name))),
        };
        trace!(element = name, "leave");

        match element {
            Element::SchemaList => {}
            Element::Schema => self.schema = None,
            Element::Key => self.leave_key()?,
            Element::Child | Element::Choice => {}
            Element::Default => self.leave_default()?,
            Element::Summary => {
                let text = self.take_text();
                self.pending_key()?.summary = Some(text);
            }
            Element::Description => {
                let text = self.take_text();
                self.pending_key()?.description = Some(text);
            }
            Element::Range => self.leave_range()?,
            Element::Min | Element::Max => self.leave_bound(element)?,
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), SchemaError> {
        if let Some(buffer) = &mut self.text {
            buffer.push_str(text);
            return Ok(());
        }
        if text.trim().is_empty() {
            return Ok(());
        }
        match self.stack.last() {
            Some((_, name)) => Err(SchemaError::InvalidText { element: name.clone() }),
            None => Err(SchemaError::Syntax("text may not appear at toplevel".to_owned())),
        }
    }

    fn take_text(&mut self) -> String {
        self.text.take().unwrap_or_default()
    }

    fn pending_key(&mut self) -> Result<&mut PendingKey, SchemaError> {
        self.key
            .as_mut()
            .ok_or_else(|| SchemaError::Syntax("no key is open".to_owned()))
    }

    fn current_schema(&mut self) -> Result<&mut crate::types::Schema, SchemaError> {
        let id = self.schema.as_deref().unwrap_or_default();
        self.set
            .get_mut(id)
            .ok_or_else(|| SchemaError::Syntax("no schema is open".to_owned()))
    }

    fn enter_schema_list(&mut self, attributes: &Attributes) {
        self.list_domain = attributes.get("gettext-domain").map(str::to_owned);
    }

    fn enter_schema(&mut self, attributes: &Attributes) -> Result<(), SchemaError> {
        let id = attributes.required("id");
        let domain = attributes
            .get("gettext-domain")
            .map(str::to_owned)
            .or_else(|| self.list_domain.clone());

        let schema = self.set.insert_schema(id)?;
        schema.path = attributes.get("path").map(str::to_owned);
        schema.gettext_domain = domain;
        debug!(schema = id, path = ?schema.path, "created schema");

        self.schema = Some(id.to_owned());
        Ok(())
    }

    fn enter_key(&mut self, attributes: &Attributes) -> Result<(), SchemaError> {
        let name = attributes.required("name");
        verify_name(name, NameClass::Key)?;
        if self.current_schema()?.contains(name) {
            return Err(SchemaError::Duplicate(format!("<key name='{}'>", name)));
        }
        let value_type = VariantType::parse(attributes.required("type"))?;
        let id = self.current_schema()?.insert_key(name, value_type.clone())?;

        self.key = Some(PendingKey {
            id,
            value_type,
            default: None,
            options: BTreeMap::new(),
            summary: None,
            description: None,
            constraints: Constraints::default(),
            saw_range: false,
            min: None,
            max: None,
        });
        Ok(())
    }

    fn enter_child(&mut self, attributes: &Attributes) -> Result<(), SchemaError> {
        let name = attributes.required("name");
        verify_name(name, NameClass::Child)?;
        let schema = attributes.required("schema");
        self.current_schema()?.insert_child(name, schema)?;
        Ok(())
    }

    fn enter_default(&mut self, attributes: &Attributes) -> Result<(), SchemaError> {
        if self.pending_key()?.default.is_some() {
            return Err(SchemaError::Duplicate("<default>".to_owned()));
        }

        let context = attributes.get("context");
        self.l10n = match attributes.get("l10n") {
            Some(category) => {
                let has_domain = self
                    .current_schema()?
                    .gettext_domain
                    .as_deref()
                    .map_or(false, |domain| !domain.is_empty());
                if !has_domain {
                    return Err(SchemaError::Localization(
                        "l10n requested, but no gettext domain given".to_owned(),
                    ));
                }
                match category {
                    "messages" => Some(b'm'),
                    "time" => Some(b't'),
                    other => {
                        return Err(SchemaError::Localization(format!(
                            "unsupported l10n category: {}",
                            other
                        )))
                    }
                }
            }
            None => {
                if context.is_some() {
                    return Err(SchemaError::Localization(
                        "translation context given for value without l10n enabled".to_owned(),
                    ));
                }
                None
            }
        };
        self.context = context.map(str::to_owned);
        self.text = Some(String::new());
        Ok(())
    }

    fn leave_default(&mut self) -> Result<(), SchemaError> {
        let text = self.take_text();
        let l10n = self.l10n.take();
        let context = self.context.take();
        let key = self.pending_key()?;

        let value = match Value::parse(&key.value_type, &text) {
            Ok(value) => value,
            // Translatable strings are commonly written without quotes.
            Err(_) if l10n.is_some() && key.value_type == VariantType::String && !is_quoted(&text) => {
                Value::String(text.trim().to_owned())
            }
            Err(err) => return Err(err.into()),
        };
        key.default = Some(value);

        if let Some(marker) = l10n {
            let message = match context {
                Some(context) => format!("{}\u{4}{}", context, text),
                None => text,
            };
            key.options.insert(
                "l10n".to_owned(),
                Value::Tuple(vec![Value::Byte(marker), Value::String(message)]),
            );
        }
        Ok(())
    }

    fn enter_text(&mut self, element: Element) -> Result<(), SchemaError> {
        let key = self.pending_key()?;
        let taken = match element {
            Element::Summary => key.summary.is_some(),
            _ => key.description.is_some(),
        };
        if taken {
            let name = if element == Element::Summary { "<summary>" } else { "<description>" };
            return Err(SchemaError::Duplicate(name.to_owned()));
        }
        self.text = Some(String::new());
        Ok(())
    }

    fn enter_range(&mut self) -> Result<(), SchemaError> {
        let key = self.pending_key()?;
        if key.saw_range {
            return Err(SchemaError::Duplicate("<range>".to_owned()));
        }
        key.saw_range = true;
        Ok(())
    }

    fn enter_choice(&mut self, attributes: &Attributes) -> Result<(), SchemaError> {
        let key = self.pending_key()?;
        if !holds_strings(&key.value_type) {
            return Err(SchemaError::Constraint(format!(
                "<choice> not allowed for keys of type '{}'",
                key.value_type
            )));
        }
        let value = attributes.required("value");
        if key.constraints.choices.iter().any(|choice| choice == value) {
            return Err(SchemaError::Duplicate(format!("<choice value='{}'>", value)));
        }
        key.constraints.choices.push(value.to_owned());
        Ok(())
    }

    fn enter_bound(&mut self, element: Element) -> Result<(), SchemaError> {
        let key = self.pending_key()?;
        if !is_numeric(&key.value_type) {
            return Err(SchemaError::Constraint(format!(
                "<range> bounds not allowed for keys of type '{}'",
                key.value_type
            )));
        }
        let (taken, name) = match element {
            Element::Min => (key.min.is_some(), "<min>"),
            _ => (key.max.is_some(), "<max>"),
        };
        if taken {
            return Err(SchemaError::Duplicate(name.to_owned()));
        }
        self.text = Some(String::new());
        Ok(())
    }

    fn leave_bound(&mut self, element: Element) -> Result<(), SchemaError> {
        let text = self.take_text();
        let key = self.pending_key()?;
        let value = Value::parse(&key.value_type, &text)?;
        match element {
            Element::Min => key.min = Some(value),
            _ => key.max = Some(value),
        }
        Ok(())
    }

    fn leave_range(&mut self) -> Result<(), SchemaError> {
        let key = self.pending_key()?;
        match (key.min.take(), key.max.take()) {
            (Some(min), Some(max)) => {
                if min.compare(&max).map_or(true, |o| o.is_gt()) {
                    return Err(SchemaError::Constraint(format!(
                        "<range> minimum {} is greater than maximum {}",
                        min, max
                    )));
                }
                key.constraints.range = Some((min, max));
            }
            (None, None) => {}
            _ => {
                return Err(SchemaError::Constraint(
                    "<range> needs both <min> and <max>".to_owned(),
                ))
            }
        }
        Ok(())
    }

    fn leave_key(&mut self) -> Result<(), SchemaError> {
        let pending = match self.key.take() {
            Some(pending) => pending,
            None => return Err(SchemaError::Syntax("no key is open".to_owned())),
        };
        let schema = self.current_schema()?;
        let key = match schema.key_mut(pending.id) {
            Some(key) => key,
            None => return Err(SchemaError::Syntax("key vanished from its schema".to_owned())),
        };

        let default = match pending.default {
            Some(default) => default,
            None => return Err(SchemaError::MissingDefault(key.name.clone())),
        };
        pending.constraints.check(&default)?;

        key.set_default(default);
        key.set_options(pending.options);
        if let Some((min, max)) = pending.constraints.range {
            key.set_range(min, max);
        }
        key.set_choices(pending.constraints.choices);
        if let Some(summary) = pending.summary {
            key.set_summary(summary.trim().to_owned());
        }
        if let Some(description) = pending.description {
            key.set_description(description.trim().to_owned());
        }
        Ok(())
    }
}

fn is_quoted(text: &str) -> bool {
    let text = text.trim();
    text.starts_with('\'') || text.starts_with('"')
}

fn is_numeric(ty: &VariantType) -> bool {
    ty.is_integer() || *ty == VariantType::Double
}

fn holds_strings(ty: &VariantType) -> bool {
    match ty {
        VariantType::String => true,
        VariantType::Maybe(inner) | VariantType::Array(inner) => **inner == VariantType::String,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize_markup;

    fn parse(input: &str) -> Result<SchemaSet, SchemaError> {
        let mut set = SchemaSet::new();
        let tokens = tokenize_markup(input)?;
        ParseState::new(&mut set).parse(&tokens)?;
        Ok(set)
    }

    fn parse_err(input: &str) -> String {
        parse(input).unwrap_err().root().to_string()
    }

    #[test]
    fn test_parse_schema() {
        let input = r#"
        <schemalist gettext-domain="app">
          <schema id="org.example" path="/org/example/">
            <key name="volume" type="i">
              <default>50</default>
              <summary> Volume </summary>
              <description>How loud it is</description>
              <range><min>0</min><max>100</max></range>
            </key>
            <key name="mode" type="s">
              <default>'fast'</default>
              <range><choice value="fast"/><choice value="slow"/></range>
            </key>
            <child name="sub" schema="org.example.sub"/>
          </schema>
          <schema id="org.example.sub" gettext-domain="other"/>
        </schemalist>
        "#;
        let set = parse(input).unwrap();
        assert_eq!(set.len(), 2);

        let schema = set.get("org.example").unwrap();
        assert_eq!(schema.path.as_deref(), Some("/org/example/"));
        assert_eq!(schema.gettext_domain.as_deref(), Some("app"));

        let volume = schema.key("volume").unwrap();
        assert_eq!(volume.default, Some(Value::Int32(50)));
        assert_eq!(volume.summary.as_deref(), Some("Volume"));
        assert_eq!(volume.description.as_deref(), Some("How loud it is"));
        assert_eq!(volume.constraints.range, Some((Value::Int32(0), Value::Int32(100))));
        assert!(volume.options.is_empty());

        let mode = schema.key("mode").unwrap();
        assert_eq!(mode.constraints.choices, vec!["fast", "slow"]);
        assert_eq!(schema.children().collect::<Vec<_>>(), vec![("sub", "org.example.sub")]);

        let sub = set.get("org.example.sub").unwrap();
        assert_eq!(sub.gettext_domain.as_deref(), Some("other"));
    }

    #[test]
    fn test_l10n_options() {
        let input = r#"<schema-list>
            <schema id="a" gettext-domain="myapp">
              <key name="greeting" type="s"><default l10n="messages">Hello</default></key>
              <key name="when" type="s"><default l10n="time" context="greet">'Hello'</default></key>
            </schema>
        </schema-list>"#;
        let set = parse(input).unwrap();
        let schema = set.get("a").unwrap();

        let greeting = schema.key("greeting").unwrap();
        assert_eq!(greeting.default, Some(Value::String("Hello".into())));
        assert_eq!(
            greeting.options["l10n"],
            Value::Tuple(vec![Value::Byte(b'm'), Value::String("Hello".into())])
        );

        let when = schema.key("when").unwrap();
        assert_eq!(when.default, Some(Value::String("Hello".into())));
        assert_eq!(
            when.options["l10n"],
            Value::Tuple(vec![Value::Byte(b't'), Value::String("greet\u{4}'Hello'".into())])
        );
    }

    #[test]
    fn test_schema_list_domain_resets() {
        let input = r#"<schemalist gettext-domain="app">
            <schema id="a"/>
        </schemalist>"#;
        let set = parse(input).unwrap();
        assert_eq!(set.get("a").unwrap().gettext_domain.as_deref(), Some("app"));

        // a second document without a domain does not inherit the first one's
        let mut set = SchemaSet::new();
        let mut state = ParseState::new(&mut set);
        state.parse(&tokenize_markup(input).unwrap()).unwrap();
        state
            .parse(&tokenize_markup(r#"<schemalist><schema id="b"/></schemalist>"#).unwrap())
            .unwrap();
        assert_eq!(set.get("b").unwrap().gettext_domain, None);
    }

    #[test]
    fn test_localization_errors() {
        let key = |default: &str| {
            format!(
                r#"<schemalist><schema id="a"><key name="k" type="s">{}</key></schema></schemalist>"#,
                default
            )
        };
        assert_eq!(
            parse_err(&key(r#"<default l10n="messages">Hi</default>"#)),
            "l10n requested, but no gettext domain given"
        );
        assert_eq!(
            parse_err(&key(r#"<default context="x">'Hi'</default>"#)),
            "translation context given for value without l10n enabled"
        );

        let input = r#"<schemalist gettext-domain="d"><schema id="a"><key name="k" type="s">
            <default l10n="colours">'Hi'</default></key></schema></schemalist>"#;
        assert_eq!(parse_err(input), "unsupported l10n category: colours");
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(parse_err("<schema id='a'/>"), "Element <schema> not allowed at toplevel");
        assert_eq!(
            parse_err("<schemalist><key name='a' type='s'/></schemalist>"),
            "Element <key> not allowed inside <schemalist>"
        );
        assert_eq!(
            parse_err("<schemalist><schema id='a'><bogus/></schema></schemalist>"),
            "Element <bogus> not allowed inside <schema>"
        );
        assert_eq!(
            parse_err("<schemalist><schema/></schemalist>"),
            "element <schema> requires attribute \"id\""
        );
        assert_eq!(
            parse_err("<schemalist><schema id='a' colour='red'/></schemalist>"),
            "attribute \"colour\" invalid for element <schema>"
        );
        assert_eq!(
            parse_err("<schemalist><schema id='a'>words</schema></schemalist>"),
            "text may not appear inside <schema>"
        );
        assert_eq!(
            parse_err("<schemalist><schema id='a'/><schema id='a'/></schemalist>"),
            "<schema id='a'> already specified"
        );
        assert_eq!(
            parse_err(
                "<schemalist><schema id='a'><key name='k' type='b'><default>true</default></key>\
                 <key name='k' type='b'><default>true</default></key></schema></schemalist>"
            ),
            "<key name='k'> already specified"
        );
        assert_eq!(
            parse_err(
                "<schemalist><schema id='a'><child name='c' schema='b'/>\
                 <child name='c' schema='d'/></schema></schemalist>"
            ),
            "<child name='c'> already specified"
        );
        assert_eq!(
            parse_err("<schemalist><schema id='a'><child name='Bad' schema='b'/></schema></schemalist>"),
            "invalid name \"Bad\": names must begin with a lowercase letter"
        );
        assert_eq!(
            parse_err("<schemalist><schema id='a'><key name='k' type='b'/></schema></schemalist>"),
            "<key name='k'> has no <default>"
        );
    }

    #[test]
    fn test_type_errors() {
        let err = parse("<schemalist><schema id='a'><key name='k' type='ii'/></schema></schemalist>").unwrap_err();
        assert!(matches!(err.root(), SchemaError::Type(_)));

        let err = parse(
            "<schemalist><schema id='a'><key name='k' type='i'><default>'x'</default></key></schema></schemalist>",
        )
        .unwrap_err();
        assert!(matches!(err.root(), SchemaError::Type(_)));

        let err = parse("<schemalist><schema id='a'><key name='Bad' type='i'/></schema></schemalist>").unwrap_err();
        assert!(matches!(err.root(), SchemaError::InvalidName(_)));
    }

    #[test]
    fn test_constraint_errors() {
        let key = |ty: &str, body: &str| {
            format!(
                "<schemalist><schema id='a'><key name='k' type='{}'>{}</key></schema></schemalist>",
                ty, body
            )
        };
        let err = parse(&key("i", "<default>200</default><range><min>0</min><max>100</max></range>")).unwrap_err();
        assert!(matches!(err.root(), SchemaError::Constraint(_)));

        let err = parse(&key("i", "<default>5</default><range><min>10</min><max>1</max></range>")).unwrap_err();
        assert!(matches!(err.root(), SchemaError::Constraint(_)));

        let err = parse(&key("s", "<default>'x'</default><range><choice value='y'/></range>")).unwrap_err();
        assert!(matches!(err.root(), SchemaError::Constraint(_)));

        let err = parse(&key("s", "<default>'x'</default><range><min>'a'</min></range>")).unwrap_err();
        assert!(matches!(err.root(), SchemaError::Constraint(_)));

        let err = parse(&key("i", "<default>1</default><range><choice value='1'/></range>")).unwrap_err();
        assert!(matches!(err.root(), SchemaError::Constraint(_)));

        assert!(parse(&key("as", "<default>['x', 'y']</default><range><choice value='x'/><choice value='y'/></range>")).is_ok());
        assert!(parse(&key("d", "<default>0.5</default><range><min>0</min><max>1</max></range>")).is_ok());
    }

    #[test]
    fn test_error_has_position() {
        let err = parse("<schemalist>\n  <schema id='a'/>\n  <schema id='a'/>\n</schemalist>").unwrap_err();
        assert!(matches!(err, SchemaError::At { line: 3, column: 3, .. }), "{:?}", err);
    }
}
