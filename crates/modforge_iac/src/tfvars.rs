//! Rendering of `terraform.tfvars`.
//!
//! Variables of all retained modules are merged into one namespace and
//! rendered as HCL assignments, one per line, sorted by name.

use std::collections::BTreeMap;

use modforge_config::{CollisionPolicy, ConfigValue, SelectedModules};
use tracing::warn;

use crate::error::{IacError, IacResult};

const SELECTED_KEY: &str = "selected";
const PROJECT_ORIGIN: &str = "project";
const INDENT: &str = "  ";

/// Result of merging variables from several modules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedVariables {
    pub values: BTreeMap<String, ConfigValue>,
    /// One message per collision that was resolved by policy.
    pub warnings: Vec<String>,
}

/// Serializes project variables into tfvars text.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableSerializer {
    policy: CollisionPolicy,
}

impl VariableSerializer {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Flatten project-level variables and then every selected module's
    /// variables, in module-name order.
    pub fn merge(
        &self,
        project_level: &BTreeMap<String, ConfigValue>,
        selection: &SelectedModules,
    ) -> IacResult<MergedVariables> {
        let mut merged = MergedVariables::default();
        let mut origins: BTreeMap<String, String> = BTreeMap::new();

        let sources = std::iter::once((PROJECT_ORIGIN, project_level)).chain(selection.iter());
        for (origin, variables) in sources {
            for (key, value) in variables {
                if key == SELECTED_KEY {
                    continue;
                }
                let Some(existing) = merged.values.get(key) else {
                    merged.values.insert(key.clone(), value.clone());
                    origins.insert(key.clone(), origin.to_string());
                    continue;
                };
                if existing == value {
                    continue;
                }

                let first = origins.get(key).cloned().unwrap_or_default();
                match self.policy {
                    CollisionPolicy::Error => {
                        return Err(IacError::VariableConflict {
                            key: key.clone(),
                            first,
                            second: origin.to_string(),
                        });
                    }
                    CollisionPolicy::LastWins => {
                        let message = format!(
                            "Variable '{}' from '{}' overrides the value from '{}'",
                            key, origin, first
                        );
                        warn!("{}", message);
                        merged.warnings.push(message);
                        merged.values.insert(key.clone(), value.clone());
                        origins.insert(key.clone(), origin.to_string());
                    }
                    CollisionPolicy::FirstWins => {
                        let message = format!(
                            "Variable '{}' from '{}' ignored, keeping the value from '{}'",
                            key, origin, first
                        );
                        warn!("{}", message);
                        merged.warnings.push(message);
                    }
                }
            }
        }

        Ok(merged)
    }

    /// Merge and render in one step.
    pub fn serialize(
        &self,
        project_level: &BTreeMap<String, ConfigValue>,
        selection: &SelectedModules,
    ) -> IacResult<(String, MergedVariables)> {
        let merged = self.merge(project_level, selection)?;
        Ok((render(&merged.values), merged))
    }
}

/// Render `name = value` lines sorted by name, without a trailing newline.
pub fn render(values: &BTreeMap<String, ConfigValue>) -> String {
    values
        .iter()
        .filter(|(key, _)| key.as_str() != SELECTED_KEY)
        .map(|(key, value)| format!("{} = {}", render_key(key), render_value(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render one value as an HCL expression.
pub fn render_value(value: &ConfigValue) -> String {
    let mut out = String::new();
    write_value(&mut out, value, 0);
    out
}

fn write_value(out: &mut String, value: &ConfigValue, depth: usize) {
    match value {
        ConfigValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        ConfigValue::Integer(i) => out.push_str(&i.to_string()),
        ConfigValue::Float(f) if f.is_finite() => out.push_str(&format!("{:?}", f)),
        // Not produced by the config loader.
        ConfigValue::Float(_) => out.push_str("null"),
        ConfigValue::String(s) => out.push_str(&quote(s)),
        ConfigValue::List(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_value(out, item, depth);
            }
            out.push(']');
        }
        ConfigValue::Map(map) if map.is_empty() => out.push_str("{}"),
        ConfigValue::Map(map) => {
            out.push_str("{\n");
            for (key, item) in map {
                out.push_str(&INDENT.repeat(depth + 1));
                out.push_str(&render_key(key));
                out.push_str(" = ");
                write_value(out, item, depth + 1);
                out.push('\n');
            }
            out.push_str(&INDENT.repeat(depth));
            out.push('}');
        }
    }
}

fn render_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Parse one rendered value back into a [`ConfigValue`].
pub fn parse_value(text: &str) -> IacResult<ConfigValue> {
    let mut parser = ValueParser::new(text);
    let value = parser.value()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

/// Parse a rendered tfvars document.
pub fn parse_document(text: &str) -> IacResult<BTreeMap<String, ConfigValue>> {
    let mut parser = ValueParser::new(text);
    let mut values = BTreeMap::new();
    loop {
        parser.skip_whitespace();
        if parser.at_end() {
            return Ok(values);
        }
        let key = parser.key()?;
        parser.skip_inline_whitespace();
        parser.expect('=')?;
        let value = parser.value()?;
        values.insert(key, value);
    }
}

struct ValueParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> ValueParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn error(&self, message: impl Into<String>) -> IacError {
        IacError::VarsParse {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: char) -> IacResult<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            _ => Err(self.error(format!("expected '{}'", expected))),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn skip_inline_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
    }

    fn value(&mut self) -> IacResult<ConfigValue> {
        self.skip_whitespace();
        match self.peek() {
            Some('"') => self.string().map(ConfigValue::String),
            Some('[') => self.list(),
            Some('{') => self.map(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let word = self.word();
                match word.as_str() {
                    "true" => Ok(ConfigValue::Bool(true)),
                    "false" => Ok(ConfigValue::Bool(false)),
                    other => Err(self.error(format!("unexpected word '{}'", other))),
                }
            }
            Some(c) => Err(self.error(format!("unexpected character '{}'", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }

    fn key(&mut self) -> IacResult<String> {
        match self.peek() {
            Some('"') => self.string(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => Ok(self.word()),
            _ => Err(self.error("expected a key")),
        }
    }

    fn string(&mut self) -> IacResult<String> {
        let start = self.pos;
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(c) => return Err(self.error(format!("unknown escape '\\{}'", c))),
                    None => break,
                },
                Some(c @ ('$' | '%')) if self.src[self.pos..].starts_with(&format!("{}{{", c)) => {
                    // `$${` is a literal `${`.
                    self.bump();
                    out.push(c);
                }
                Some('\n') | None => break,
                Some(c) => out.push(c),
            }
        }
        Err(IacError::VarsParse {
            offset: start,
            message: "unterminated string".to_string(),
        })
    }

    fn number(&mut self) -> IacResult<ConfigValue> {
        let start = self.pos;
        let mut is_float = false;
        if self.peek() == Some('-') {
            self.bump();
        }
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' | 'e' | 'E' => is_float = true,
                '+' | '-' if matches!(self.src[..self.pos].chars().last(), Some('e' | 'E')) => {}
                _ => break,
            }
            self.bump();
        }
        let text = &self.src[start..self.pos];
        let parsed = if is_float {
            text.parse::<f64>().ok().map(ConfigValue::Float)
        } else {
            text.parse::<i64>().ok().map(ConfigValue::Integer)
        };
        parsed.ok_or_else(|| IacError::VarsParse {
            offset: start,
            message: format!("invalid number '{}'", text),
        })
    }

    fn list(&mut self) -> IacResult<ConfigValue> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(']') {
                self.bump();
                return Ok(ConfigValue::List(items));
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {}
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn map(&mut self) -> IacResult<ConfigValue> {
        self.expect('{')?;
        let mut map = BTreeMap::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(ConfigValue::Map(map));
                }
                Some(',') => {
                    self.bump();
                    continue;
                }
                _ => {}
            }
            let key = self.key()?;
            self.skip_inline_whitespace();
            self.expect('=')?;
            let value = self.value()?;
            map.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: Vec<(&str, ConfigValue)>) -> BTreeMap<String, ConfigValue> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn selection(modules: Vec<(&str, BTreeMap<String, ConfigValue>)>) -> SelectedModules {
        modules.into_iter().collect()
    }

    #[test]
    fn test_render_sorted_scalars_and_lists() {
        let values = vars(vec![
            ("size", ConfigValue::from(3i64)),
            ("enabled", ConfigValue::from(true)),
            ("tags", ConfigValue::from(vec![ConfigValue::from("x"), ConfigValue::from("y")])),
        ]);
        assert_eq!(
            render(&values),
            "enabled = true\nsize = 3\ntags = [\"x\", \"y\"]"
        );
    }

    #[test]
    fn test_render_floats() {
        assert_eq!(render_value(&ConfigValue::Float(2.0)), "2.0");
        assert_eq!(render_value(&ConfigValue::Float(0.1)), "0.1");
        assert_eq!(render_value(&ConfigValue::Float(-1.5)), "-1.5");
    }

    #[test]
    fn test_render_escapes_strings() {
        let value = ConfigValue::from("say \"hi\"\\\n${var.x} %{if}");
        assert_eq!(
            render_value(&value),
            r#""say \"hi\"\\\n$${var.x} %%{if}""#
        );
    }

    #[test]
    fn test_render_nested_maps() {
        let inner = vars(vec![("team", ConfigValue::from("core")), ("cost-center", ConfigValue::from(7i64))]);
        let value = ConfigValue::from(vars(vec![
            ("labels", ConfigValue::from(inner)),
            ("empty", ConfigValue::from(BTreeMap::new())),
            ("with space", ConfigValue::from(false)),
        ]));
        assert_eq!(
            render_value(&value),
            "{\n  empty = {}\n  labels = {\n    cost-center = 7\n    team = \"core\"\n  }\n  \"with space\" = false\n}"
        );
    }

    #[test]
    fn test_merge_last_wins_with_warning() {
        let serializer = VariableSerializer::default();
        let selected = selection(vec![
            ("compute", vars(vec![("zone", ConfigValue::from("a"))])),
            ("network", vars(vec![("zone", ConfigValue::from("b"))])),
        ]);
        let merged = serializer.merge(&BTreeMap::new(), &selected).unwrap();
        assert_eq!(merged.values["zone"], ConfigValue::from("b"));
        assert_eq!(merged.warnings.len(), 1);
        assert!(merged.warnings[0].contains("'network'"));
    }

    #[test]
    fn test_merge_first_wins() {
        let serializer = VariableSerializer::new(CollisionPolicy::FirstWins);
        let selected = selection(vec![
            ("compute", vars(vec![("zone", ConfigValue::from("a"))])),
            ("network", vars(vec![("zone", ConfigValue::from("b"))])),
        ]);
        let merged = serializer.merge(&BTreeMap::new(), &selected).unwrap();
        assert_eq!(merged.values["zone"], ConfigValue::from("a"));
    }

    #[test]
    fn test_merge_error_policy() {
        let serializer = VariableSerializer::new(CollisionPolicy::Error);
        let project = vars(vec![("region", ConfigValue::from("eu"))]);
        let selected = selection(vec![("compute", vars(vec![("region", ConfigValue::from("us"))]))]);
        match serializer.merge(&project, &selected).unwrap_err() {
            IacError::VariableConflict { key, first, second } => {
                assert_eq!(key, "region");
                assert_eq!(first, "project");
                assert_eq!(second, "compute");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_identical_values_do_not_collide() {
        let serializer = VariableSerializer::new(CollisionPolicy::Error);
        let selected = selection(vec![
            ("a", vars(vec![("region", ConfigValue::from("eu"))])),
            ("b", vars(vec![("region", ConfigValue::from("eu"))])),
        ]);
        let merged = serializer.merge(&BTreeMap::new(), &selected).unwrap();
        assert!(merged.warnings.is_empty());
    }

    #[test]
    fn test_selected_key_is_never_emitted() {
        let selected = selection(vec![(
            "a",
            vars(vec![("selected", ConfigValue::from(true)), ("x", ConfigValue::from(1i64))]),
        )]);
        let (text, _) = VariableSerializer::default()
            .serialize(&BTreeMap::new(), &selected)
            .unwrap();
        assert_eq!(text, "x = 1");
    }

    #[test]
    fn test_round_trip() {
        let nested = vars(vec![
            ("b", ConfigValue::from(vec![ConfigValue::from(1.5), ConfigValue::from(-2i64)])),
            ("quoted key", ConfigValue::from("tab\there ${x}")),
        ]);
        let values = vars(vec![
            ("enabled", ConfigValue::from(false)),
            ("ratio", ConfigValue::from(1.0)),
            ("config", ConfigValue::from(nested)),
            ("empty", ConfigValue::List(Vec::new())),
        ]);
        let text = render(&values);
        assert_eq!(parse_document(&text).unwrap(), values);
    }

    #[test]
    fn test_parse_value_errors() {
        for bad in ["\"open", "[1, 2", "{ a = }", "maybe", "1 2"] {
            assert!(
                matches!(parse_value(bad), Err(IacError::VarsParse { .. })),
                "{bad:?} should not parse"
            );
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_key() -> impl Strategy<Value = String> {
            prop_oneof!["[a-z_][a-z0-9_-]{0,8}", "[ -~]{1,8}"]
        }

        fn arb_value() -> impl Strategy<Value = ConfigValue> {
            let leaf = prop_oneof![
                any::<bool>().prop_map(ConfigValue::Bool),
                any::<i64>().prop_map(ConfigValue::Integer),
                any::<f64>()
                    .prop_filter("finite", |f| f.is_finite())
                    .prop_map(ConfigValue::Float),
                any::<String>().prop_map(ConfigValue::String),
            ];
            leaf.prop_recursive(3, 24, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(ConfigValue::List),
                    prop::collection::btree_map(arb_key(), inner, 0..4).prop_map(ConfigValue::Map),
                ]
            })
        }

        proptest! {
            #[test]
            fn rendered_documents_parse_back(
                values in prop::collection::btree_map(
                    arb_key().prop_filter("reserved", |k| k != "selected"),
                    arb_value(),
                    0..6,
                ),
            ) {
                let text = render(&values);
                prop_assert_eq!(parse_document(&text).unwrap(), values);
            }

            #[test]
            fn rendered_values_parse_back(value in arb_value()) {
                prop_assert_eq!(parse_value(&render_value(&value)).unwrap(), value);
            }
        }
    }
}
