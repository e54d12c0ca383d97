//! Module dependency extraction from `terraform graph` output.
//!
//! `terraform graph` prints a DOT document whose node identifiers are
//! resource addresses such as `module.compute.google_compute_instance.vm`.
//! Only the module segment matters here: an edge between two addresses that
//! live in different modules means the first module requires the second.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use serde::Serialize;
use tracing::debug;

use crate::error::{IacError, IacResult};

const MODULE_PREFIX: &str = "module.";
const ROOT_PREFIX: &str = "[root] ";

/// Mapping from module name to the modules it requires.
///
/// Dependency sets are ordered and never contain the module itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyMap {
    modules: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `module` has an entry, even without dependencies.
    pub fn insert_module(&mut self, module: impl Into<String>) {
        self.modules.entry(module.into()).or_default();
    }

    /// Record that `module` requires `dependency`. Self-edges are dropped.
    pub fn add_dependency(&mut self, module: impl Into<String>, dependency: impl Into<String>) {
        let module = module.into();
        let dependency = dependency.into();
        self.insert_module(dependency.clone());
        let deps = self.modules.entry(module.clone()).or_default();
        if module != dependency {
            deps.insert(dependency);
        }
    }

    pub fn dependencies(&self, module: &str) -> Option<&BTreeSet<String>> {
        self.modules.get(module)
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.modules.iter().map(|(name, deps)| (name.as_str(), deps))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl<K, I, V> FromIterator<(K, I)> for DependencyMap
where
    K: Into<String>,
    I: IntoIterator<Item = V>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (module, deps) in iter {
            let module = module.into();
            map.insert_module(module.clone());
            for dep in deps {
                map.add_dependency(module.clone(), dep);
            }
        }
        map
    }
}

impl fmt::Display for DependencyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (module, deps) in &self.modules {
            if deps.is_empty() {
                writeln!(f, "{}", module)?;
            } else {
                let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                writeln!(f, "{} -> {}", module, deps.join(", "))?;
            }
        }
        Ok(())
    }
}

/// Extract the module name from a graph node identifier.
///
/// Accepts `module.<name>...` with an optional `[root] ` prefix; the name ends
/// at the first `.`, `[` or whitespace.
pub fn module_name(id: &str) -> Option<&str> {
    let id = id.trim();
    let id = id.strip_prefix(ROOT_PREFIX).unwrap_or(id);
    let rest = id.strip_prefix(MODULE_PREFIX)?;
    let end = rest
        .find(|c: char| c == '.' || c == '[' || c.is_whitespace())
        .unwrap_or(rest.len());
    let name = &rest[..end];
    (!name.is_empty()).then_some(name)
}

/// Builds a [`DependencyMap`] from DOT text.
pub struct GraphExtractor;

impl GraphExtractor {
    /// Parse `terraform graph` output.
    pub fn parse(dot: &str) -> IacResult<DependencyMap> {
        let graph = DotParser::new(dot)?.parse()?;

        let mut map = DependencyMap::new();
        for (source, target) in &graph.edges {
            match (module_name(source), module_name(target)) {
                (Some(from), Some(to)) => map.add_dependency(from, to),
                (Some(module), None) | (None, Some(module)) => map.insert_module(module),
                (None, None) => {}
            }
        }
        for node in &graph.nodes {
            if let Some(module) = module_name(node) {
                map.insert_module(module);
            }
        }

        debug!(
            "Parsed graph with {} nodes and {} edges into {} modules",
            graph.nodes.len(),
            graph.edges.len(),
            map.len()
        );
        Ok(map)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Id { text: String, quoted: bool },
    EdgeOp,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Equals,
    Colon,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Id { text, quoted: false } if text.eq_ignore_ascii_case(keyword))
    }
}

fn parse_error(offset: usize, message: impl Into<String>) -> IacError {
    IacError::GraphParse {
        offset,
        message: message.into(),
    }
}

struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> IacResult<Vec<(usize, Token)>> {
        let mut tokens = Vec::new();

        while let Some(&(offset, c)) = self.chars.peek() {
            let token = match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                    continue;
                }
                '#' => {
                    self.skip_line();
                    continue;
                }
                '/' => {
                    self.chars.next();
                    match self.chars.peek().map(|&(_, c)| c) {
                        Some('/') => self.skip_line(),
                        Some('*') => {
                            self.chars.next();
                            self.skip_block_comment(offset)?;
                        }
                        _ => return Err(parse_error(offset, "unexpected '/'")),
                    }
                    continue;
                }
                '{' => self.single(Token::LBrace),
                '}' => self.single(Token::RBrace),
                '[' => self.single(Token::LBracket),
                ']' => self.single(Token::RBracket),
                ';' => self.single(Token::Semi),
                ',' => self.single(Token::Comma),
                '=' => self.single(Token::Equals),
                ':' => self.single(Token::Colon),
                '-' => {
                    self.chars.next();
                    match self.chars.peek().map(|&(_, c)| c) {
                        Some('>') | Some('-') => {
                            self.chars.next();
                            Token::EdgeOp
                        }
                        Some(c) if c.is_ascii_digit() || c == '.' => {
                            let mut text = String::from("-");
                            text.push_str(&self.word());
                            Token::Id {
                                text,
                                quoted: false,
                            }
                        }
                        _ => return Err(parse_error(offset, "unexpected '-'")),
                    }
                }
                '"' => Token::Id {
                    text: self.quoted(offset)?,
                    quoted: true,
                },
                '<' => Token::Id {
                    text: self.html(offset)?,
                    quoted: true,
                },
                c if is_word_char(c) => Token::Id {
                    text: self.word(),
                    quoted: false,
                },
                other => {
                    return Err(parse_error(
                        offset,
                        format!("unexpected character '{}'", other),
                    ))
                }
            };
            tokens.push((offset, token));
        }

        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn skip_line(&mut self) {
        for (_, c) in self.chars.by_ref() {
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self, start: usize) -> IacResult<()> {
        let mut prev = '\0';
        for (_, c) in self.chars.by_ref() {
            if prev == '*' && c == '/' {
                return Ok(());
            }
            prev = c;
        }
        Err(parse_error(start, "unterminated comment"))
    }

    fn word(&mut self) -> String {
        let mut text = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if !is_word_char(c) {
                break;
            }
            text.push(c);
            self.chars.next();
        }
        text
    }

    /// Read a double-quoted string, including `"a" + "b"` concatenation.
    fn quoted(&mut self, start: usize) -> IacResult<String> {
        let mut text = String::new();
        loop {
            self.chars.next(); // opening quote
            loop {
                match self.chars.next() {
                    Some((_, '\\')) => match self.chars.next() {
                        Some((_, '"')) => text.push('"'),
                        Some((_, '\n')) => {}
                        Some((_, c)) => {
                            text.push('\\');
                            text.push(c);
                        }
                        None => return Err(parse_error(start, "unterminated string")),
                    },
                    Some((_, '"')) => break,
                    Some((_, c)) => text.push(c),
                    None => return Err(parse_error(start, "unterminated string")),
                }
            }

            let mut lookahead = self.chars.clone();
            let mut saw_plus = false;
            let mut continues = false;
            while let Some(&(_, c)) = lookahead.peek() {
                if c.is_whitespace() {
                    lookahead.next();
                } else if c == '+' && !saw_plus {
                    saw_plus = true;
                    lookahead.next();
                } else {
                    continues = saw_plus && c == '"';
                    break;
                }
            }
            if !continues {
                return Ok(text);
            }
            self.chars = lookahead;
        }
    }

    fn html(&mut self, start: usize) -> IacResult<String> {
        self.chars.next(); // opening angle bracket
        let mut depth = 1usize;
        let mut text = String::new();
        for (_, c) in self.chars.by_ref() {
            match c {
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                }
                _ => {}
            }
            text.push(c);
        }
        Err(parse_error(start, "unterminated HTML string"))
    }

    fn end(&self) -> usize {
        self.src.len()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || !c.is_ascii()
}

/// Nodes and edges of a DOT document, in document order.
#[derive(Debug, Default)]
struct DotGraph {
    nodes: Vec<String>,
    edges: Vec<(String, String)>,
}

enum Operand {
    Node(String),
    Subgraph(Vec<String>),
}

impl Operand {
    fn into_nodes(self) -> Vec<String> {
        match self {
            Operand::Node(id) => vec![id],
            Operand::Subgraph(nodes) => nodes,
        }
    }
}

struct DotParser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    graph: DotGraph,
}

impl DotParser {
    fn new(src: &str) -> IacResult<Self> {
        let lexer = Lexer::new(src);
        let end = lexer.end();
        Ok(Self {
            tokens: lexer.tokenize()?,
            pos: 0,
            end,
            graph: DotGraph::default(),
        })
    }

    /// Parse the first graph of the document.
    fn parse(mut self) -> IacResult<DotGraph> {
        if self.peek().map_or(false, |t| t.is_keyword("strict")) {
            self.pos += 1;
        }
        match self.peek() {
            Some(t) if t.is_keyword("digraph") || t.is_keyword("graph") => self.pos += 1,
            _ => return Err(parse_error(self.offset(), "expected 'graph' or 'digraph'")),
        }
        if matches!(self.peek(), Some(Token::Id { .. })) {
            self.pos += 1;
        }
        self.expect(Token::LBrace, "'{'")?;
        self.parse_stmt_list()?;
        self.expect(Token::RBrace, "'}'")?;
        Ok(self.graph)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(o, _)| *o)
    }

    fn expect(&mut self, token: Token, what: &str) -> IacResult<()> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(parse_error(self.offset(), format!("expected {}", what)))
        }
    }

    fn expect_id(&mut self) -> IacResult<String> {
        match self.tokens.get(self.pos) {
            Some((_, Token::Id { text, .. })) => {
                let text = text.clone();
                self.pos += 1;
                Ok(text)
            }
            _ => Err(parse_error(self.offset(), "expected identifier")),
        }
    }

    fn parse_stmt_list(&mut self) -> IacResult<()> {
        loop {
            match self.peek() {
                None => return Err(parse_error(self.end, "unexpected end of input, expected '}'")),
                Some(Token::RBrace) => return Ok(()),
                Some(Token::Semi) => self.pos += 1,
                Some(_) => self.parse_stmt()?,
            }
        }
    }

    fn parse_stmt(&mut self) -> IacResult<()> {
        let attr_target = self
            .peek()
            .map_or(false, |t| t.is_keyword("graph") || t.is_keyword("node") || t.is_keyword("edge"));
        if attr_target && self.peek_at(1) == Some(&Token::LBracket) {
            self.pos += 1;
            return self.skip_attr_lists();
        }

        let first = self.parse_operand()?;

        if let Operand::Node(_) = first {
            if self.peek() == Some(&Token::Equals) {
                self.pos += 1;
                self.expect_id()?;
                return Ok(());
            }
        }

        if self.peek() == Some(&Token::EdgeOp) {
            let mut sources = first.into_nodes();
            while self.peek() == Some(&Token::EdgeOp) {
                self.pos += 1;
                let targets = self.parse_operand()?.into_nodes();
                for source in &sources {
                    for target in &targets {
                        self.graph.edges.push((source.clone(), target.clone()));
                    }
                }
                sources = targets;
            }
        } else if let Operand::Node(id) = first {
            self.graph.nodes.push(id);
        }

        self.skip_attr_lists()
    }

    fn parse_operand(&mut self) -> IacResult<Operand> {
        match self.peek() {
            Some(t) if t.is_keyword("subgraph") => {
                self.pos += 1;
                if matches!(self.peek(), Some(Token::Id { .. })) {
                    self.pos += 1;
                }
                self.parse_subgraph_body().map(Operand::Subgraph)
            }
            Some(Token::LBrace) => self.parse_subgraph_body().map(Operand::Subgraph),
            Some(Token::Id { .. }) => {
                let id = self.expect_id()?;
                // Ports (`node:port:compass`) do not change the node.
                while self.peek() == Some(&Token::Colon) {
                    self.pos += 1;
                    self.expect_id()?;
                }
                Ok(Operand::Node(id))
            }
            _ => Err(parse_error(self.offset(), "expected node identifier")),
        }
    }

    /// Parse `{ stmt_list }` and return every node it mentions.
    fn parse_subgraph_body(&mut self) -> IacResult<Vec<String>> {
        self.expect(Token::LBrace, "'{'")?;
        let nodes_before = self.graph.nodes.len();
        let edges_before = self.graph.edges.len();
        self.parse_stmt_list()?;
        self.expect(Token::RBrace, "'}'")?;

        let mut seen = BTreeSet::new();
        let mut members = Vec::new();
        let declared = self.graph.nodes[nodes_before..].iter();
        let endpoints = self.graph.edges[edges_before..]
            .iter()
            .flat_map(|(a, b)| [a, b]);
        for node in declared.chain(endpoints) {
            if seen.insert(node.as_str()) {
                members.push(node.clone());
            }
        }
        Ok(members)
    }

    fn skip_attr_lists(&mut self) -> IacResult<()> {
        while self.peek() == Some(&Token::LBracket) {
            let start = self.offset();
            self.pos += 1;
            loop {
                match self.peek() {
                    Some(Token::RBracket) => {
                        self.pos += 1;
                        break;
                    }
                    Some(_) => self.pos += 1,
                    None => return Err(parse_error(start, "unterminated attribute list")),
                }
            }
        }
        Ok(())
    }
}
