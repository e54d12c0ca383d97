//! Selective retention of named blocks in template documents.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use modforge_config::{ConfigValue, SelectedModules};
use regex::Regex;
use tracing::debug;

use crate::error::{IacResult, TemplateStructureError};
use crate::scanner::BraceScanner;

/// Keyword of the top-level blocks a filter works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Module,
    Variable,
}

impl BlockKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            BlockKind::Module => "module",
            BlockKind::Variable => "variable",
        }
    }
}

/// One `<keyword> "<name>" { ... }` block as found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateBlock<'t> {
    pub kind: BlockKind,
    pub name: String,
    /// 1-based line of the header.
    pub start_line: usize,
    /// 1-based line where the block closes.
    pub end_line: usize,
    pub lines: Vec<&'t str>,
}

/// A document split into free lines and blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'t> {
    Line(&'t str),
    Block(TemplateBlock<'t>),
}

/// Replacement of a local module path token in `source` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRewrite {
    pub from: String,
    pub to: String,
}

impl SourceRewrite {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Keeps the blocks whose name is in a keep-set and drops the others.
#[derive(Debug, Clone)]
pub struct TemplateFilter {
    kind: BlockKind,
    header: Regex,
    source_rewrite: Option<SourceRewrite>,
}

impl TemplateFilter {
    pub fn new(kind: BlockKind) -> IacResult<Self> {
        let pattern = format!(r#"^{}\s+"([^"]+)""#, regex::escape(kind.keyword()));
        Ok(Self {
            kind,
            header: Regex::new(&pattern)?,
            source_rewrite: None,
        })
    }

    /// Filter for `module` blocks.
    pub fn modules() -> IacResult<Self> {
        Self::new(BlockKind::Module)
    }

    /// Filter for `variable` blocks.
    pub fn variables() -> IacResult<Self> {
        Self::new(BlockKind::Variable)
    }

    /// Rewrite local module sources inside retained blocks.
    pub fn with_source_rewrite(mut self, rewrite: SourceRewrite) -> Self {
        self.source_rewrite = Some(rewrite);
        self
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Split `content` into free lines and blocks of this filter's kind.
    pub fn segments<'t>(&self, content: &'t str) -> Result<Vec<Segment<'t>>, TemplateStructureError> {
        let mut scanner = BraceScanner::new();
        let mut segments = Vec::new();
        let mut current: Option<TemplateBlock<'t>> = None;

        for (idx, line) in content.split('\n').enumerate() {
            let line_no = idx + 1;

            if let Some(block) = current.as_mut() {
                scanner.scan_line(line, line_no)?;
                block.lines.push(line);
                block.end_line = line_no;
                if scanner.depth() == 0 {
                    if let Some(done) = current.take() {
                        segments.push(Segment::Block(done));
                    }
                }
                continue;
            }

            let header = if scanner.depth() == 0 && scanner.in_code() {
                self.header_name(line)
            } else {
                None
            };
            let scan = scanner.scan_line(line, line_no)?;

            let Some(name) = header else {
                segments.push(Segment::Line(line));
                continue;
            };
            if !scan.opened {
                return Err(TemplateStructureError::MissingOpenBrace {
                    keyword: self.kind.keyword().to_string(),
                    name,
                    line: line_no,
                });
            }
            let block = TemplateBlock {
                kind: self.kind,
                name,
                start_line: line_no,
                end_line: line_no,
                lines: vec![line],
            };
            if scanner.depth() == 0 {
                segments.push(Segment::Block(block));
            } else {
                current = Some(block);
            }
        }

        if let Some(block) = current {
            return Err(TemplateStructureError::UnterminatedBlock {
                keyword: self.kind.keyword().to_string(),
                name: block.name,
                line: block.start_line,
            });
        }
        scanner.finish()?;
        Ok(segments)
    }

    /// Blocks of this filter's kind, in document order.
    pub fn blocks<'t>(&self, content: &'t str) -> Result<Vec<TemplateBlock<'t>>, TemplateStructureError> {
        Ok(self
            .segments(content)?
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::Block(block) => Some(block),
                Segment::Line(_) => None,
            })
            .collect())
    }

    /// Keep the blocks named in `keep`, each followed by a blank line.
    /// Runs of blank lines collapse into one and trailing blank lines are
    /// dropped; a final newline is kept if the input had one.
    pub fn filter(&self, content: &str, keep: &BTreeSet<String>) -> Result<String, TemplateStructureError> {
        let (body, final_newline) = match content.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (content, false),
        };
        let separator = if content.contains("\r\n") { "\r" } else { "" };

        let mut output: Vec<Cow<'_, str>> = Vec::new();
        let mut kept = 0usize;
        let mut dropped = 0usize;
        for segment in self.segments(body)? {
            match segment {
                Segment::Line(line) => push_collapsed(&mut output, Cow::Borrowed(line)),
                Segment::Block(block) if keep.contains(&block.name) => {
                    kept += 1;
                    for line in block.lines {
                        push_collapsed(&mut output, self.rewrite_source(line));
                    }
                    push_collapsed(&mut output, Cow::Borrowed(separator));
                }
                Segment::Block(_) => dropped += 1,
            }
        }
        while output.last().map_or(false, |line| line.trim().is_empty()) {
            output.pop();
        }

        debug!(
            "Filtered {} blocks: kept {}, dropped {}",
            self.kind.keyword(),
            kept,
            dropped
        );

        let mut result = output
            .iter()
            .map(|line| line.as_ref())
            .collect::<Vec<_>>()
            .join("\n");
        if final_newline {
            result.push('\n');
        }
        Ok(result)
    }

    fn header_name(&self, line: &str) -> Option<String> {
        self.header
            .captures(line.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn rewrite_source<'l>(&self, line: &'l str) -> Cow<'l, str> {
        let Some(rewrite) = &self.source_rewrite else {
            return Cow::Borrowed(line);
        };
        let from = rewrite.from.as_str();
        if from.is_empty() || !line.contains("source") || !line.contains(from) {
            return Cow::Borrowed(line);
        }

        let mut rewritten = String::with_capacity(line.len() + rewrite.to.len());
        let mut last = 0;
        for (idx, _) in line.match_indices(from) {
            if idx < last {
                continue;
            }
            let at_path_start = line[..idx]
                .chars()
                .next_back()
                .map_or(true, |c| !(c.is_alphanumeric() || matches!(c, '.' | '/' | '_' | '-')));
            if at_path_start {
                rewritten.push_str(&line[last..idx]);
                rewritten.push_str(&rewrite.to);
                last = idx + from.len();
            }
        }
        if last == 0 {
            return Cow::Borrowed(line);
        }
        rewritten.push_str(&line[last..]);
        Cow::Owned(rewritten)
    }
}

fn push_collapsed<'a>(output: &mut Vec<Cow<'a, str>>, line: Cow<'a, str>) {
    let blank = line.trim().is_empty();
    if blank && output.last().map_or(false, |prev| prev.trim().is_empty()) {
        return;
    }
    output.push(line);
}

/// Names of the variables a project needs declared.
///
/// The configured project-wide names, every variable of every selected module
/// and every project-level variable.
pub fn needed_variables(
    project_variables: &[String],
    selection: &SelectedModules,
    project_level: &BTreeMap<String, ConfigValue>,
) -> BTreeSet<String> {
    let mut needed: BTreeSet<String> = project_variables.iter().cloned().collect();
    for (_, variables) in selection.iter() {
        needed.extend(variables.keys().cloned());
    }
    needed.extend(project_level.keys().cloned());
    needed
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN_TF: &str = r#"terraform {
  required_version = ">= 1.3"
}

module "a" {
  source = "./modules/a"
  tags = {
    team = "core"
  }
}

module "b" {
  source = "./modules/b"
  depends_on = [module.a]
}
"#;

    fn keep(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn module_filter() -> TemplateFilter {
        TemplateFilter::modules()
            .unwrap()
            .with_source_rewrite(SourceRewrite::new("./modules/", "../../modules/"))
    }

    #[test]
    fn test_keeps_only_selected_blocks() {
        let output = module_filter().filter(MAIN_TF, &keep(&["a"])).unwrap();
        assert_eq!(
            output,
            r#"terraform {
  required_version = ">= 1.3"
}

module "a" {
  source = "../../modules/a"
  tags = {
    team = "core"
  }
}
"#
        );
    }

    #[test]
    fn test_keeps_original_order() {
        let output = module_filter().filter(MAIN_TF, &keep(&["b", "a"])).unwrap();
        let a = output.find("module \"a\"").unwrap();
        let b = output.find("module \"b\"").unwrap();
        assert!(a < b);
        assert!(!output.contains("\n\n\n"));
    }

    #[test]
    fn test_idempotent() {
        let filter = module_filter();
        let keep = keep(&["b"]);
        let once = filter.filter(MAIN_TF, &keep).unwrap();
        let twice = filter.filter(&once, &keep).unwrap();
        assert_eq!(once, twice);
        assert!(twice.contains("\"../../modules/b\""));
        assert!(!twice.contains("../../../"));
    }

    #[test]
    fn test_empty_keep_set_keeps_free_lines() {
        let output = module_filter().filter(MAIN_TF, &BTreeSet::new()).unwrap();
        assert_eq!(output, "terraform {\n  required_version = \">= 1.3\"\n}\n");
    }

    #[test]
    fn test_no_final_newline_is_preserved() {
        let content = "module \"a\" {\n  x = 1\n}";
        let output = TemplateFilter::modules().unwrap().filter(content, &keep(&["a"])).unwrap();
        assert_eq!(output, content);
    }

    #[test]
    fn test_crlf_line_endings() {
        let content = "module \"a\" {\r\n  x = 1\r\n}\r\nmodule \"b\" {\r\n}\r\n";
        let output = TemplateFilter::modules().unwrap().filter(content, &keep(&["a"])).unwrap();
        assert_eq!(output, "module \"a\" {\r\n  x = 1\r\n}\r\n");
    }

    #[test]
    fn test_braces_in_strings_and_heredocs() {
        let content = r#"module "a" {
  name = "}"
  policy = <<EOT
{ "Statement": [ }
EOT
}
module "b" {
}
"#;
        let output = TemplateFilter::modules().unwrap().filter(content, &keep(&["b"])).unwrap();
        assert_eq!(output, "module \"b\" {\n}\n");
    }

    #[test]
    fn test_single_line_block() {
        let content = "module \"a\" { source = \"./modules/a\" }\nmodule \"b\" {}\n";
        let output = module_filter().filter(content, &keep(&["a"])).unwrap();
        assert_eq!(output, "module \"a\" { source = \"../../modules/a\" }\n");
    }

    #[test]
    fn test_block_line_spans() {
        let blocks = TemplateFilter::modules().unwrap().blocks(MAIN_TF).unwrap();
        let spans: Vec<_> = blocks
            .iter()
            .map(|b| (b.name.as_str(), b.start_line, b.end_line, b.lines.len()))
            .collect();
        assert_eq!(spans, vec![("a", 5, 10, 6), ("b", 12, 15, 4)]);

        let single = TemplateFilter::modules().unwrap().blocks("module \"a\" {}\n").unwrap();
        assert_eq!((single[0].start_line, single[0].end_line), (1, 1));
    }

    #[test]
    fn test_headers_inside_blocks_are_not_blocks() {
        let content = "locals {\n  module \"inner\" {\n  }\n}\n";
        let blocks = TemplateFilter::modules().unwrap().blocks(content).unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_unterminated_block() {
        let content = "module \"a\" {\n  source = \"./modules/a\"\n";
        let err = TemplateFilter::modules().unwrap().filter(content, &keep(&["a"])).unwrap_err();
        assert_eq!(
            err,
            TemplateStructureError::UnterminatedBlock {
                keyword: "module".to_string(),
                name: "a".to_string(),
                line: 1,
            }
        );
    }

    #[test]
    fn test_missing_open_brace() {
        let err = TemplateFilter::variables()
            .unwrap()
            .filter("variable \"region\"\n", &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, TemplateStructureError::MissingOpenBrace { line: 1, .. }));
    }

    #[test]
    fn test_unbalanced_close() {
        let err = TemplateFilter::modules()
            .unwrap()
            .filter("}\nmodule \"a\" {\n}\n", &BTreeSet::new())
            .unwrap_err();
        assert_eq!(err, TemplateStructureError::UnbalancedClose { line: 1 });
    }

    #[test]
    fn test_source_rewrite_only_at_path_start() {
        let filter = module_filter();
        assert_eq!(
            filter.rewrite_source("  source = \"./modules/net\""),
            "  source = \"../../modules/net\""
        );
        assert_eq!(
            filter.rewrite_source("  source = \"../../modules/net\""),
            "  source = \"../../modules/net\""
        );
        assert_eq!(filter.rewrite_source("  path = \"./modules/net\""), "  path = \"./modules/net\"");
    }

    #[test]
    fn test_needed_variables() {
        let mut vars = BTreeMap::new();
        vars.insert("machine_type".to_string(), ConfigValue::from("e2-small"));
        let selection: SelectedModules = vec![("compute", vars)].into_iter().collect();
        let mut project_level = BTreeMap::new();
        project_level.insert("labels".to_string(), ConfigValue::from(true));
        let project_vars = vec!["project_id".to_string(), "region".to_string()];

        let needed = needed_variables(&project_vars, &selection, &project_level);
        assert_eq!(
            needed.into_iter().collect::<Vec<_>>(),
            vec!["labels", "machine_type", "project_id", "region"]
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        const BODY: &[&str] = &[
            "  source = \"./modules/x\"",
            "  tags = {\n    team = \"core\"\n  }",
            "  name = \"}{\"",
            "  # closing } in a comment",
            "  // opening { in a comment",
            "  policy = <<EOT\n{ \"Statement\": [ }\nEOT",
            "  script = <<-EOT\n    }\n    EOT",
            "  expr = \"${var.a}-${lookup(var.m, \"k\", \"}\")}\"",
            "  /* } */ count = 1",
            "",
        ];

        const FREE: &[&str] = &[
            "",
            "# free comment with {",
            "provider \"google\" {\n  region = \"x\"\n}",
            "locals {\n  module \"inner\" {\n  }\n}",
            "variable \"v\" {\n}",
            "terraform {}",
        ];

        /// A document and the names of its module blocks, in order.
        fn arb_document() -> impl Strategy<Value = (String, Vec<String>)> {
            let item = (any::<bool>(), prop::collection::vec(0..BODY.len(), 0..4), 0..FREE.len());
            prop::collection::vec(item, 1..8).prop_map(|items| {
                let mut lines = Vec::new();
                let mut names = Vec::new();
                for (idx, (is_block, body, free)) in items.into_iter().enumerate() {
                    if !is_block {
                        lines.push(FREE[free].to_string());
                        continue;
                    }
                    let name = format!("b{}", idx);
                    if body.is_empty() {
                        lines.push(format!("module \"{0}\" {{ source = \"./modules/{0}\" }}", name));
                    } else {
                        lines.push(format!("module \"{}\" {{", name));
                        lines.extend(body.into_iter().map(|b| BODY[b].to_string()));
                        lines.push("}".to_string());
                    }
                    names.push(name);
                }
                (lines.join("\n") + "\n", names)
            })
        }

        fn arb_keep() -> impl Strategy<Value = BTreeSet<String>> {
            prop::collection::btree_set((0usize..8).prop_map(|i| format!("b{}", i)), 0..8)
        }

        proptest! {
            #[test]
            fn keeps_exactly_the_named_blocks_balanced((doc, names) in arb_document(), keep in arb_keep()) {
                let filter = module_filter();
                let output = filter.filter(&doc, &keep).unwrap();

                let kept: Vec<String> = filter
                    .blocks(&output)
                    .unwrap()
                    .into_iter()
                    .map(|block| block.name)
                    .collect();
                let expected: Vec<String> = names.into_iter().filter(|n| keep.contains(n)).collect();
                prop_assert_eq!(kept, expected);

                let mut scanner = BraceScanner::new();
                for (idx, line) in output.split('\n').enumerate() {
                    prop_assert!(scanner.scan_line(line, idx + 1).is_ok());
                }
                prop_assert_eq!(scanner.depth(), 0);
                prop_assert!(scanner.finish().is_ok());
            }

            #[test]
            fn filtering_is_idempotent((doc, _names) in arb_document(), keep in arb_keep()) {
                let filter = module_filter();
                let once = filter.filter(&doc, &keep).unwrap();
                let twice = filter.filter(&once, &keep).unwrap();
                prop_assert_eq!(once, twice);
            }
        }
    }
}
