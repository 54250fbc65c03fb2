//! Code analyzer: symbol extraction from source trees.
//!
//! The input is a file or directory path. Supported source files (Rust,
//! TypeScript/JavaScript, Python, Go) are scanned line by line for
//! declarations, and the totals become facts while the per-file listing
//! becomes raw context.
//!
//! Extraction is keyword based, not a parser. It will report a `fn` inside a
//! string literal and miss declarations split across lines; the output is
//! context for a model, not an index to navigate by.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::BoxFuture;
use crate::model::{Fact, Finding};
use crate::producer::{Producer, ProducerError};
use crate::tokenizer::estimate_tokens;

const SUPPORTED_EXTENSIONS: [&str; 7] = ["rs", "ts", "tsx", "js", "jsx", "py", "go"];

/// Names listed per category in the facts.
const MAX_LISTED_NAMES: usize = 15;

/// Kind of extracted declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolKind {
    Function,
    Struct,
    Enum,
    Trait,
    Impl,
    Type,
    Module,
}

impl SymbolKind {
    /// Whether the symbol declares a type (listed under `types`).
    fn is_type(self) -> bool {
        matches!(
            self,
            SymbolKind::Struct | SymbolKind::Enum | SymbolKind::Trait | SymbolKind::Type
        )
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolKind::Function => write!(f, "function"),
            SymbolKind::Struct => write!(f, "struct"),
            SymbolKind::Enum => write!(f, "enum"),
            SymbolKind::Trait => write!(f, "trait"),
            SymbolKind::Impl => write!(f, "impl"),
            SymbolKind::Type => write!(f, "type"),
            SymbolKind::Module => write!(f, "module"),
        }
    }
}

/// A declaration found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// 1-indexed.
    pub line: u32,
}

/// Analyzes source trees given as the query input.
#[derive(Debug, Clone)]
pub struct CodeAnalyzerProducer {
    id: String,
    description: String,
    max_files: usize,
    max_file_bytes: usize,
}

impl CodeAnalyzerProducer {
    pub const DEFAULT_ID: &'static str = "code_analyzer";
    pub const DEFAULT_MAX_FILE_BYTES: usize = 50_000;

    /// Analyze at most `max_files` files per query.
    pub fn new(max_files: usize) -> Self {
        Self {
            id: Self::DEFAULT_ID.to_string(),
            description: "Analyzes source code for structure, types, and functions".to_string(),
            max_files,
            max_file_bytes: Self::DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Read at most this many bytes of each file.
    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }
}

impl Producer for CodeAnalyzerProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, input: &str) -> BoxFuture<'_, Result<Finding, ProducerError>> {
        let input = input.trim().to_string();
        Box::pin(async move {
            let id = self.id.clone();
            let (max_files, max_file_bytes) = (self.max_files, self.max_file_bytes);
            tokio::task::spawn_blocking(move || analyze(&id, &input, max_files, max_file_bytes))
                .await
                .map_err(|e| ProducerError::Task(e.to_string()))?
        })
    }
}

/// Per-file analysis result.
struct FileReport {
    path: PathBuf,
    lines: usize,
    symbols: Vec<Symbol>,
}

/// Blocking analysis of `input` as a path.
fn analyze(
    id: &str,
    input: &str,
    max_files: usize,
    max_file_bytes: usize,
) -> Result<Finding, ProducerError> {
    let root = Path::new(input);
    if !root.exists() {
        return Ok(Finding::new(id, format!("Path not found: {input}"))
            .with_fact(Fact::new("error", "path_not_found")));
    }

    let mut errors = Vec::new();
    let files = if root.is_file() {
        if is_supported(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        }
    } else {
        collect_source_files(root, max_files, &mut errors)
    };

    if files.is_empty() {
        return Ok(Finding::new(
            id,
            format!("No supported source files found in: {input}"),
        ));
    }

    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        match read_prefix(&path, max_file_bytes) {
            Ok(content) => {
                let symbols = extract_symbols(&path, &content);
                reports.push(FileReport {
                    lines: content.lines().count(),
                    path,
                    symbols,
                });
            }
            Err(e) => errors.push(format!("{}: {e}", path.display())),
        }
    }
    debug!(
        producer = id,
        files = reports.len(),
        errors = errors.len(),
        "Analyzed source tree"
    );

    Ok(build_finding(id, &reports, &errors))
}

fn build_finding(id: &str, reports: &[FileReport], errors: &[String]) -> Finding {
    let total_lines: usize = reports.iter().map(|r| r.lines).sum();
    let symbols: Vec<&Symbol> = reports.iter().flat_map(|r| &r.symbols).collect();

    let mut per_kind: BTreeMap<SymbolKind, usize> = BTreeMap::new();
    for sym in &symbols {
        *per_kind.entry(sym.kind).or_default() += 1;
    }
    let types: Vec<&str> = symbols
        .iter()
        .filter(|s| s.kind.is_type())
        .map(|s| s.name.as_str())
        .collect();
    let functions: Vec<&str> = symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Function)
        .map(|s| s.name.as_str())
        .collect();

    let mut facts = vec![
        Fact::new("total_files", reports.len().to_string()),
        Fact::new("total_lines", total_lines.to_string()),
        Fact::new("total_symbols", symbols.len().to_string()),
    ];
    facts.extend(
        per_kind
            .iter()
            .map(|(kind, count)| Fact::new(format!("{kind}_count"), count.to_string())),
    );
    if !types.is_empty() {
        facts.push(Fact::new("types", list_names(&types)));
    }
    if !functions.is_empty() {
        facts.push(Fact::new("functions", list_names(&functions)));
    }

    let mut sections: Vec<String> = reports.iter().map(render_report).collect();
    if !errors.is_empty() {
        sections.push(format!("### Errors\n{}", errors.join("\n")));
    }
    let raw_context = sections.join("\n\n");

    let summary = format!(
        "Analyzed {} source files ({total_lines} lines): {} symbols, {} types, {} functions",
        reports.len(),
        symbols.len(),
        types.len(),
        functions.len()
    );

    let tokens = estimate_tokens(&raw_context);
    Finding::new(id, summary)
        .with_facts(facts)
        .with_raw_context(raw_context)
        .with_token_count(tokens)
}

fn list_names(names: &[&str]) -> String {
    names
        .iter()
        .take(MAX_LISTED_NAMES)
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_report(report: &FileReport) -> String {
    let mut out = format!("### {} ({} lines)", report.path.display(), report.lines);
    if report.symbols.is_empty() {
        out.push_str("\n  (no symbols)");
    }
    for sym in &report.symbols {
        out.push_str(&format!("\n  {}:{} {}", sym.line, sym.kind, sym.name));
    }
    out
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

/// Collect up to `max_files` supported files in file-name order.
///
/// Symlinks are not followed. Hidden entries and build output directories
/// are pruned; unreadable entries are recorded in `errors` and skipped.
fn collect_source_files(root: &Path, max_files: usize, errors: &mut Vec<String>) -> Vec<PathBuf> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e.file_name()));

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_supported(entry.path()) => {
                files.push(entry.into_path());
                if files.len() >= max_files {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }
    }
    files
}

fn is_ignored(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|n| n.starts_with('.') || n == "target" || n == "node_modules")
}

/// Read up to `limit` bytes, replacing invalid UTF-8.
fn read_prefix(path: &Path, limit: usize) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut buf = Vec::new();
    file.take(limit as u64).read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ── Language-specific symbol extraction ─────────────────────────────────

const RUST_KEYWORDS: &[(&str, SymbolKind)] = &[
    ("fn ", SymbolKind::Function),
    ("struct ", SymbolKind::Struct),
    ("enum ", SymbolKind::Enum),
    ("trait ", SymbolKind::Trait),
    ("type ", SymbolKind::Type),
    ("mod ", SymbolKind::Module),
];

const TYPESCRIPT_KEYWORDS: &[(&str, SymbolKind)] = &[
    ("function ", SymbolKind::Function),
    ("class ", SymbolKind::Struct),
    ("interface ", SymbolKind::Trait),
    ("type ", SymbolKind::Type),
];

const PYTHON_KEYWORDS: &[(&str, SymbolKind)] = &[
    ("def ", SymbolKind::Function),
    ("class ", SymbolKind::Struct),
];

/// Extract symbols using the rules for the file's extension.
pub fn extract_symbols(path: &Path, content: &str) -> Vec<Symbol> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let mut symbols = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if is_comment(trimmed) {
            continue;
        }
        let found = match ext {
            "rs" => rust_symbol(trimmed),
            "ts" | "tsx" | "js" | "jsx" => keyword_symbol(trimmed, TYPESCRIPT_KEYWORDS),
            "py" => keyword_symbol(trimmed, PYTHON_KEYWORDS),
            "go" => go_symbol(trimmed),
            _ => None,
        };
        if let Some((name, kind)) = found {
            symbols.push(Symbol {
                name,
                kind,
                line: (line_num + 1) as u32,
            });
        }
    }
    symbols
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with("//") || trimmed.starts_with('#') || trimmed.starts_with('*')
}

fn keyword_symbol(line: &str, keywords: &[(&str, SymbolKind)]) -> Option<(String, SymbolKind)> {
    keywords
        .iter()
        .find_map(|(keyword, kind)| extract_after_keyword(line, keyword).map(|name| (name, *kind)))
}

fn rust_symbol(line: &str) -> Option<(String, SymbolKind)> {
    if line.starts_with("impl ") || line.starts_with("impl<") {
        let name = impl_target(line)?;
        return Some((name, SymbolKind::Impl));
    }
    keyword_symbol(line, RUST_KEYWORDS)
}

/// The implemented type of an `impl` line: `impl<T> Trait for Foo<T>` → `Foo`.
fn impl_target(line: &str) -> Option<String> {
    let mut rest = line.trim_start_matches("impl");
    if rest.starts_with('<') {
        let mut depth = 0usize;
        let end = rest.char_indices().find_map(|(i, c)| {
            match c {
                '<' => depth += 1,
                '>' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
            None
        })?;
        rest = &rest[end..];
    }
    if let Some(idx) = rest.find(" for ") {
        rest = &rest[idx + " for ".len()..];
    }
    let name: String = rest
        .trim()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() { None } else { Some(name) }
}

fn go_symbol(line: &str) -> Option<(String, SymbolKind)> {
    if let Some(rest) = line.strip_prefix("func ") {
        // Methods: `func (s *Server) Run()`
        let rest = if rest.starts_with('(') {
            rest.split_once(')').map(|(_, r)| r.trim_start())?
        } else {
            rest
        };
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        return (!name.is_empty()).then_some((name, SymbolKind::Function));
    }
    let name = extract_after_keyword(line, "type ")?;
    let kind = if line.contains(" struct") {
        SymbolKind::Struct
    } else if line.contains(" interface") {
        SymbolKind::Trait
    } else {
        SymbolKind::Type
    };
    Some((name, kind))
}

/// Extract the identifier after a keyword at the start of a declaration.
///
/// The keyword must begin the line or follow a space, so `pub fn run(`
/// matches `fn ` while `define x` does not match `fn `.
fn extract_after_keyword(line: &str, keyword: &str) -> Option<String> {
    let idx = line
        .match_indices(keyword)
        .map(|(i, _)| i)
        .find(|&i| i == 0 || line.as_bytes()[i - 1] == b' ')?;
    let name: String = line[idx + keyword.len()..]
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() { None } else { Some(name) }
}
