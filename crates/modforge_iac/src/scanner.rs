//! Line-oriented brace scanner for HCL-like template documents.
//!
//! Tracks brace depth while ignoring braces inside quoted strings, comments
//! and heredoc bodies. String interpolation (`${ ... }`, `%{ ... }`) is code
//! again, so nested strings inside it are followed too.

use crate::error::TemplateStructureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Str,
    /// Braces opened inside an interpolation that are not yet closed.
    Interp(usize),
}

#[derive(Debug, Clone)]
struct Heredoc {
    marker: String,
    line: usize,
}

/// What scanning one line found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineScan {
    /// At least one brace group opened in code on this line.
    pub opened: bool,
}

#[derive(Debug, Default)]
pub struct BraceScanner {
    depth: usize,
    stack: Vec<Context>,
    open_groups: Vec<usize>,
    block_comment: Option<usize>,
    heredoc: Option<Heredoc>,
}

impl BraceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current brace depth outside strings.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True when the next line starts in plain code: not inside a string,
    /// block comment or heredoc body.
    pub fn in_code(&self) -> bool {
        self.stack.is_empty() && self.block_comment.is_none() && self.heredoc.is_none()
    }

    /// Scan one line (without its terminator). `line_no` is 1-based.
    pub fn scan_line(&mut self, line: &str, line_no: usize) -> Result<LineScan, TemplateStructureError> {
        let mut scan = LineScan::default();

        if let Some(heredoc) = &self.heredoc {
            if line.trim() == heredoc.marker {
                self.heredoc = None;
            }
            return Ok(scan);
        }

        let chars: Vec<char> = line.chars().collect();
        let mut pending_heredoc = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if self.block_comment.is_some() {
                if c == '*' && next == Some('/') {
                    self.block_comment = None;
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }

            match self.stack.last().copied() {
                Some(Context::Str) => match c {
                    '\\' => {
                        i += 2;
                        continue;
                    }
                    '"' => {
                        self.stack.pop();
                    }
                    '$' | '%' if next == Some(c) && chars.get(i + 2) == Some(&'{') => {
                        // `$${` and `%%{` are literal.
                        i += 3;
                        continue;
                    }
                    '$' | '%' if next == Some('{') => {
                        self.stack.push(Context::Interp(0));
                        i += 2;
                        continue;
                    }
                    _ => {}
                },
                Some(Context::Interp(open)) => match c {
                    '"' => self.stack.push(Context::Str),
                    '{' => self.set_interp(open + 1),
                    '}' if open == 0 => {
                        self.stack.pop();
                    }
                    '}' => self.set_interp(open - 1),
                    _ => {}
                },
                None => match c {
                    '"' => self.stack.push(Context::Str),
                    '#' => break,
                    '/' if next == Some('/') => break,
                    '/' if next == Some('*') => {
                        self.block_comment = Some(line_no);
                        i += 2;
                        continue;
                    }
                    '<' if next == Some('<') => {
                        let (marker, consumed) = heredoc_marker(&chars[i + 2..]);
                        if let Some(marker) = marker {
                            pending_heredoc = Some(Heredoc {
                                marker,
                                line: line_no,
                            });
                        }
                        i += 2 + consumed;
                        continue;
                    }
                    '{' => {
                        self.depth += 1;
                        self.open_groups.push(line_no);
                        scan.opened = true;
                    }
                    '}' => {
                        if self.depth == 0 {
                            return Err(TemplateStructureError::UnbalancedClose { line: line_no });
                        }
                        self.depth -= 1;
                        self.open_groups.pop();
                    }
                    _ => {}
                },
            }
            i += 1;
        }

        // Quoted strings end with the line.
        if self.stack.last() == Some(&Context::Str) {
            self.stack.clear();
        }
        if pending_heredoc.is_some() {
            self.heredoc = pending_heredoc;
        }
        Ok(scan)
    }

    /// Report anything left open at the end of the document.
    pub fn finish(&self) -> Result<(), TemplateStructureError> {
        if let Some(heredoc) = &self.heredoc {
            return Err(TemplateStructureError::UnterminatedHeredoc {
                marker: heredoc.marker.clone(),
                line: heredoc.line,
            });
        }
        if let Some(line) = self.block_comment {
            return Err(TemplateStructureError::UnterminatedComment { line });
        }
        if let Some(&line) = self.open_groups.first() {
            return Err(TemplateStructureError::UnterminatedGroup { line });
        }
        Ok(())
    }

    fn set_interp(&mut self, open: usize) {
        if let Some(top) = self.stack.last_mut() {
            *top = Context::Interp(open);
        }
    }
}

/// Parse the marker after `<<` (`EOF` or `-EOF`); returns the marker and the
/// number of characters consumed.
fn heredoc_marker(rest: &[char]) -> (Option<String>, usize) {
    let mut consumed = 0;
    if rest.first() == Some(&'-') {
        consumed += 1;
    }
    let start = consumed;
    while let Some(&c) = rest.get(consumed) {
        let valid = if consumed == start {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };
        if !valid {
            break;
        }
        consumed += 1;
    }
    if consumed == start {
        return (None, consumed);
    }
    (Some(rest[start..consumed].iter().collect()), consumed)
}
