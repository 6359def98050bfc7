//! Walks a vault directory, parses front-matter, cleans markdown bodies, and
//! emits `Document`s. Grounded on `vault_reader.py`'s `VaultReader`/`VaultContent`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static WIKI_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("wiki-link regex is valid"));
static INLINE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("inline-link regex is valid"));
static HEADING_OR_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#+\s*").expect("heading regex is valid"));
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold regex is valid"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("italic regex is valid"));
static CODE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("code-span regex is valid"));
static NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+").expect("newline regex is valid"));
static INLINE_HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([a-zA-Z0-9_-]+)").expect("hashtag regex is valid"));
static DATE_IN_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("date regex is valid"));

/// The logical unit read from one Markdown file.
#[derive(Debug, Clone)]
pub struct Document {
    pub relative_path: String,
    pub title: String,
    pub raw_body: String,
    pub cleaned_body: String,
    pub tags: HashSet<String>,
    pub frontmatter: BTreeMap<String, serde_yaml::Value>,
    pub created_date: NaiveDate,
    pub modified_time: DateTime<Utc>,
    pub content_length: usize,
}

impl Document {
    /// Curated summary from front-matter, if present.
    pub fn description(&self) -> Option<&str> {
        self.frontmatter.get("description").and_then(|v| v.as_str())
    }

    /// Text that is actually handed to the encoder: description (if any) prepended
    /// to the cleaned body.
    pub fn embedding_text(&self) -> String {
        match self.description() {
            Some(desc) if !desc.is_empty() => format!("{desc}. {}", self.cleaned_body),
            _ => self.cleaned_body.clone(),
        }
    }
}

pub struct VaultReaderConfig {
    pub include_globs: Vec<String>,
    pub exclude_dir_names: Vec<String>,
}

impl Default for VaultReaderConfig {
    fn default() -> Self {
        Self {
            include_globs: vec!["**/*.md".to_string()],
            exclude_dir_names: vec![
                ".obsidian".to_string(),
                ".trash".to_string(),
                ".git".to_string(),
                "node_modules".to_string(),
                ".venv".to_string(),
                "vendor".to_string(),
            ],
        }
    }
}

pub struct VaultReader {
    vault_root: PathBuf,
    config: VaultReaderConfig,
}

impl VaultReader {
    pub fn new(vault_root: impl Into<PathBuf>, config: VaultReaderConfig) -> Self {
        Self {
            vault_root: vault_root.into(),
            config,
        }
    }

    /// Recursively enumerate markdown files, applying exclusion rules: any path
    /// segment beginning with `.`, or matching one of the configured directory names.
    pub fn discover_files(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for entry in WalkDir::new(&self.vault_root)
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e.path()))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) == Some("md") {
                found.push(entry.path().to_path_buf());
            }
        }
        found.sort();
        found
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.vault_root) else {
            return false;
        };
        for part in relative.components() {
            let part = part.as_os_str().to_string_lossy();
            if part.starts_with('.') && part != ".." {
                return true;
            }
            if self
                .config
                .exclude_dir_names
                .iter()
                .any(|excluded| excluded == part.as_ref())
            {
                return true;
            }
        }
        false
    }

    /// Walk the vault and read every discovered file. Files that cannot be read
    /// or decoded as UTF-8 are logged and skipped — they never abort the walk.
    pub fn walk(&self) -> Vec<Document> {
        self.discover_files()
            .into_iter()
            .filter_map(|path| match self.read_file(&path) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable vault file");
                    None
                }
            })
            .collect()
    }

    pub fn read_file(&self, path: &Path) -> std::io::Result<Document> {
        let raw = std::fs::read_to_string(path)?;
        let modified_time: DateTime<Utc> = path
            .metadata()
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let relative_path = path
            .strip_prefix(&self.vault_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let (frontmatter, body) = parse_frontmatter(&raw);

        let title = frontmatter
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default()
            });

        let tags = collect_tags(&frontmatter);
        let cleaned_body = clean_content(&body);
        let created_date = extract_date(&frontmatter, &relative_path, modified_time);

        Ok(Document {
            content_length: cleaned_body.chars().count(),
            relative_path,
            title,
            raw_body: body,
            cleaned_body,
            tags,
            frontmatter,
            created_date,
            modified_time,
        })
    }

    /// Inline `#hashtag` tokens found in the body — *not* merged into `tags`.
    /// Kept only to mirror the original's `extract_inline_tags` for parity; the
    /// scored path never reads this.
    pub fn extract_inline_tags(content: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        INLINE_HASHTAG
            .captures_iter(content)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }
}

/// Parse a leading `---`-delimited YAML front-matter block. A malformed block
/// is treated as *no* front-matter and the full text is returned as the body.
fn parse_frontmatter(raw: &str) -> (BTreeMap<String, serde_yaml::Value>, String) {
    let Some(rest) = raw.strip_prefix("---") else {
        return (BTreeMap::new(), raw.to_string());
    };
    let Some(end) = rest.find("\n---") else {
        return (BTreeMap::new(), raw.to_string());
    };
    let yaml_block = &rest[..end];
    let body_start = end + 4;
    let body = rest[body_start..].trim_start_matches('\n').to_string();

    match serde_yaml::from_str::<serde_yaml::Value>(yaml_block) {
        Ok(serde_yaml::Value::Mapping(map)) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                if let Some(key) = k.as_str() {
                    out.insert(key.to_string(), v);
                }
            }
            (out, body)
        }
        _ => (BTreeMap::new(), raw.to_string()),
    }
}

fn collect_tags(frontmatter: &BTreeMap<String, serde_yaml::Value>) -> HashSet<String> {
    let mut tags = HashSet::new();
    match frontmatter.get("tags") {
        Some(serde_yaml::Value::Sequence(seq)) => {
            for item in seq {
                if let Some(s) = item.as_str() {
                    tags.insert(s.to_string());
                }
            }
        }
        Some(serde_yaml::Value::String(s)) => {
            tags.insert(s.clone());
        }
        _ => {}
    }
    tags
}

/// Wiki-links reduced to their label, inline links reduced to their label,
/// heading/emphasis/code markers stripped, newlines collapsed to spaces.
fn clean_content(content: &str) -> String {
    let content = WIKI_LINK.replace_all(content, "$1");
    let content = INLINE_LINK.replace_all(&content, "$1");
    let content = HEADING_OR_LIST.replace_all(&content, "");
    let content = BOLD.replace_all(&content, "$1");
    let content = ITALIC.replace_all(&content, "$1");
    let content = CODE_SPAN.replace_all(&content, "$1");
    let content = NEWLINES.replace_all(&content, " ");
    content.trim().to_string()
}

/// `frontmatter.created` if present and parseable; else the `YYYY-MM-DD` pattern
/// embedded in the filename; else the filesystem modification time.
fn extract_date(
    frontmatter: &BTreeMap<String, serde_yaml::Value>,
    relative_path: &str,
    modified_time: DateTime<Utc>,
) -> NaiveDate {
    if let Some(created) = frontmatter.get("created") {
        if let Some(s) = created.as_str() {
            if let Some(d) = parse_known_date_formats(s) {
                return d;
            }
        }
    }
    if let Some(m) = DATE_IN_PATH.captures(relative_path) {
        if let Some(s) = m.get(1) {
            if let Ok(d) = NaiveDate::parse_from_str(s.as_str(), "%Y-%m-%d") {
                return d;
            }
        }
    }
    modified_time.date_naive()
}

fn parse_known_date_formats(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}
