//! Keyword search over a directory of markdown documents.
//!
//! Each `*.md` file is split into sections at `##` and `###` headings. A
//! query is scored per section by case-insensitive term matches; title hits
//! weigh more than body hits.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

use super::Tool;

/// Name the support responder sees.
pub const KNOWLEDGE_TOOL_NAME: &str = "search_knowledge_base";

/// Sections returned per query.
pub const DEFAULT_MAX_RESULTS: usize = 3;

const TITLE_WEIGHT: usize = 2;

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Knowledge directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Failed to read knowledge directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Knowledge base build was interrupted: {0}")]
    Interrupted(String),
}

/// A titled chunk of a knowledge document.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeSection {
    pub title: String,
    pub content: String,
}

/// Parsed sections of every document in a directory.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    sections: Vec<KnowledgeSection>,
}

impl KnowledgeBase {
    /// Load every `*.md` file in `dir`, in file-name order.
    ///
    /// Unreadable files are skipped with a warning.
    pub fn load(dir: &Path) -> Result<Self, KnowledgeError> {
        if !dir.is_dir() {
            return Err(KnowledgeError::MissingDirectory(dir.to_path_buf()));
        }

        let entries = fs::read_dir(dir).map_err(|source| KnowledgeError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        files.sort();

        let mut sections = Vec::new();
        for file in &files {
            match fs::read_to_string(file) {
                Ok(text) => sections.extend(Self::parse_markdown(&text)),
                Err(e) => tracing::warn!(
                    file = %file.display(),
                    error = %e,
                    "Skipping unreadable knowledge file"
                ),
            }
        }

        tracing::info!(
            files = files.len(),
            sections = sections.len(),
            dir = %dir.display(),
            "Loaded knowledge base"
        );
        Ok(Self { sections })
    }

    /// Split one markdown document into sections.
    ///
    /// Text before the first heading and headings with no body are dropped.
    pub fn parse_markdown(text: &str) -> Vec<KnowledgeSection> {
        let mut sections = Vec::new();
        let mut title: Option<String> = None;
        let mut body: Vec<&str> = Vec::new();

        let mut flush = |title: &Option<String>, body: &mut Vec<&str>| {
            if let Some(title) = title {
                let content = body.join("\n").trim().to_string();
                if !content.is_empty() {
                    sections.push(KnowledgeSection {
                        title: title.clone(),
                        content,
                    });
                }
            }
            body.clear();
        };

        for line in text.lines() {
            if line.starts_with("## ") || line.starts_with("### ") {
                flush(&title, &mut body);
                title = Some(line.trim_start_matches('#').trim().to_string());
            } else {
                body.push(line);
            }
        }
        flush(&title, &mut body);

        sections
    }

    pub fn from_sections(sections: Vec<KnowledgeSection>) -> Self {
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Best `limit` sections with a positive score, best first.
    ///
    /// Ties keep document order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(&KnowledgeSection, usize)> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(&KnowledgeSection, usize)> = self
            .sections
            .iter()
            .map(|section| {
                let title = section.title.to_lowercase();
                let content = section.content.to_lowercase();
                let score = terms
                    .iter()
                    .map(|term| {
                        title.matches(term.as_str()).count() * TITLE_WEIGHT
                            + content.matches(term.as_str()).count()
                    })
                    .sum();
                (section, score)
            })
            .filter(|(_, score)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(limit);
        scored
    }
}

/// Lazily built knowledge base for one directory.
///
/// The first lookup builds the index on the blocking pool; concurrent first
/// lookups wait for that one build. A failed build is not cached, so a
/// directory created later is picked up.
#[derive(Debug)]
pub struct KnowledgeIndex {
    dir: PathBuf,
    base: OnceCell<Arc<KnowledgeBase>>,
}

impl KnowledgeIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            base: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn get(&self) -> Result<Arc<KnowledgeBase>, KnowledgeError> {
        let base = self
            .base
            .get_or_try_init(|| async {
                let dir = self.dir.clone();
                let base = tokio::task::spawn_blocking(move || KnowledgeBase::load(&dir))
                    .await
                    .map_err(|e| KnowledgeError::Interrupted(e.to_string()))??;
                Ok::<_, KnowledgeError>(Arc::new(base))
            })
            .await?;
        Ok(Arc::clone(base))
    }
}

/// The `search_knowledge_base` tool.
#[derive(Debug, Clone)]
pub struct KnowledgeTool {
    index: Arc<KnowledgeIndex>,
    max_results: usize,
}

impl KnowledgeTool {
    pub fn new(index: Arc<KnowledgeIndex>) -> Self {
        Self {
            index,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Run a query and format the result for the model.
    pub async fn lookup(&self, query: &str) -> String {
        let base = match self.index.get().await {
            Ok(base) => base,
            Err(e) => {
                tracing::error!(error = %e, "Knowledge base unavailable");
                return format!("The knowledge base could not be loaded ({}).", e);
            }
        };

        if base.is_empty() {
            tracing::warn!(dir = %self.index.dir().display(), "Knowledge base has no content");
            return "The knowledge base has no content.".to_string();
        }

        let hits = base.search(query, self.max_results);
        if hits.is_empty() {
            tracing::info!(query, "No knowledge base matches");
            return format!("No information related to \"{}\" was found.", query);
        }

        tracing::debug!(query, results = hits.len(), "Knowledge base matches");
        let mut out = String::from("## Search results\n");
        for (rank, (section, score)) in hits.iter().enumerate() {
            out.push_str(&format!(
                "\n### {}. {} (relevance: {})\n{}\n",
                rank + 1,
                section.title,
                score,
                section.content
            ));
        }
        out
    }
}

#[async_trait]
impl Tool for KnowledgeTool {
    fn name(&self) -> &str {
        KNOWLEDGE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the support knowledge base (FAQ and policy documents) for information \
         related to the customer's question. Use short keyword queries."
    }

    fn input_schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords describing the information to find"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, input: &BTreeMap<String, JsonValue>) -> String {
        match input.get("query").and_then(|v| v.as_str()) {
            Some(query) => self.lookup(query).await,
            None => "The 'query' argument is required.".to_string(),
        }
    }
}
