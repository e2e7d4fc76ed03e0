/*!
 * Content tree model: Book -> Chapter -> Episode -> Line.
 *
 * Pure data structures with per-node change fingerprints. A Line carries a
 * SHA-256 fingerprint of its source `content`; the `translated` field is only
 * ever valid against the current fingerprint and is invalidated whenever the
 * content changes. No I/O happens in this module.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Creation/update/save timestamps attached to tree nodes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeMeta {
    /// When the node first appeared on the remote source
    pub created_at: Option<DateTime<Utc>>,
    /// When the remote source last updated the node
    pub updated_at: Option<DateTime<Utc>>,
    /// When the node was last persisted locally
    pub saved_at: Option<DateTime<Utc>>,
}

impl TimeMeta {
    /// Mark the node as saved now
    pub fn touch_saved(&mut self) {
        self.saved_at = Some(Utc::now());
    }
}

/// Compute the hex SHA-256 fingerprint of a piece of source text
pub fn content_fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Smallest unit of source/target text in the tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Line {
    /// Source text, immutable unless the remote source text itself changes
    content: String,
    /// Target text; `None` means "not yet translated" and is a valid request
    /// to (re)translate regardless of who set it
    pub translated: Option<String>,
    /// Output of each translator that processed this line, keyed by role name
    #[serde(default)]
    pub candidates: BTreeMap<String, String>,
    /// Fingerprint of `content`, maintained by this type
    fingerprint: String,
}

impl Line {
    /// Create an untranslated line from source text
    pub fn new<S: Into<String>>(content: S) -> Self {
        let content = content.into();
        let fingerprint = content_fingerprint(&content);
        Self {
            content,
            translated: None,
            candidates: BTreeMap::new(),
            fingerprint,
        }
    }

    /// The source text
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The fingerprint of the current source text
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Replace the source text.
    ///
    /// If the new text fingerprints differently, any existing translation is
    /// invalidated so a stale translation can never leak into output.
    /// Returns true when the content actually changed.
    pub fn set_content<S: Into<String>>(&mut self, content: S) -> bool {
        let content = content.into();
        let fingerprint = content_fingerprint(&content);
        if fingerprint == self.fingerprint {
            return false;
        }
        self.content = content;
        self.fingerprint = fingerprint;
        self.translated = None;
        self.candidates.clear();
        true
    }

    /// Record a translator's output for the current content
    pub fn set_translated<S: Into<String>>(&mut self, role_name: &str, text: S) {
        let text = text.into();
        self.candidates.insert(role_name.to_string(), text.clone());
        self.translated = Some(text);
    }

    /// Whether the line is blank source text (never scheduled for translation)
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// An ordered run of lines with a stable source-provided id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    /// Stable identity within the parent chapter, provided by the source
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub title_translated: Option<String>,
    /// Free-text author notes attached to the episode
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub notes_translated: Option<String>,
    /// Where the episode content can be fetched from, when known
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(default)]
    pub time_meta: TimeMeta,
}

impl Episode {
    pub fn new<S: Into<String>>(id: S, title: S) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            title_translated: None,
            notes: String::new(),
            notes_translated: None,
            source_url: None,
            lines: Vec::new(),
            time_meta: TimeMeta::default(),
        }
    }

    /// Whether every non-blank line carries a translation
    pub fn fully_translated(&self) -> bool {
        self.lines
            .iter()
            .filter(|l| !l.is_blank())
            .all(|l| l.translated.is_some())
    }

    /// Render the translated episode as an HTML fragment, falling back to
    /// source text where no translation exists
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "<h3>{}</h3>\n",
            self.title_translated.as_deref().unwrap_or(&self.title)
        ));
        out.push_str(&format!(
            "<p>{}</p>\n<hr>\n",
            self.notes_translated.as_deref().unwrap_or(&self.notes)
        ));
        for line in &self.lines {
            out.push_str(&format!(
                "<p>{}</p>\n",
                line.translated.as_deref().unwrap_or(line.content())
            ));
        }
        out
    }
}

/// An ordered run of episodes with a stable source-provided id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    /// Stable identity within the book, provided by the source
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub title_translated: Option<String>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub time_meta: TimeMeta,
}

impl Chapter {
    pub fn new<S: Into<String>>(id: S, title: S) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            title_translated: None,
            episodes: Vec::new(),
            time_meta: TimeMeta::default(),
        }
    }

    /// Find an episode by its stable id
    pub fn episode(&self, id: &str) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.id == id)
    }

    /// Find an episode by its stable id, mutably
    pub fn episode_mut(&mut self, id: &str) -> Option<&mut Episode> {
        self.episodes.iter_mut().find(|e| e.id == id)
    }

    pub fn fully_translated(&self) -> bool {
        self.episodes.iter().all(|e| e.fully_translated())
    }

    pub fn to_html(&self) -> String {
        let mut out = format!(
            "<h2>{}</h2>\n",
            self.title_translated.as_deref().unwrap_or(&self.title)
        );
        for episode in &self.episodes {
            out.push_str(&episode.to_html());
        }
        out
    }
}

/// Root of the content tree; identity is the source URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub title: String,
    #[serde(default)]
    pub title_translated: Option<String>,
    pub author: String,
    /// Source URL, the durable identity of the book
    pub url: String,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub series_translated: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_translated: Option<String>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub time_meta: TimeMeta,
}

impl Book {
    pub fn new<S: Into<String>>(title: S, author: S, url: S) -> Self {
        Self {
            title: title.into(),
            title_translated: None,
            author: author.into(),
            url: url.into(),
            series: None,
            series_translated: None,
            tags: BTreeSet::new(),
            description: String::new(),
            description_translated: None,
            chapters: Vec::new(),
            time_meta: TimeMeta::default(),
        }
    }

    /// Find a chapter by its stable id
    pub fn chapter(&self, id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    /// Find a chapter by its stable id, mutably
    pub fn chapter_mut(&mut self, id: &str) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.id == id)
    }

    /// Resolve an episode reference to the episode it names
    pub fn resolve(&self, episode_ref: &EpisodeRef) -> Option<&Episode> {
        self.chapter(&episode_ref.chapter_id)?
            .episode(&episode_ref.episode_id)
    }

    /// Resolve an episode reference mutably
    pub fn resolve_mut(&mut self, episode_ref: &EpisodeRef) -> Option<&mut Episode> {
        self.chapter_mut(&episode_ref.chapter_id)?
            .episode_mut(&episode_ref.episode_id)
    }

    /// Resolve a line reference to the line it names
    pub fn resolve_line(&self, line_ref: &LineRef) -> Option<&Line> {
        self.resolve(&line_ref.episode)?.lines.get(line_ref.index)
    }

    pub fn fully_translated(&self) -> bool {
        self.chapters.iter().all(|c| c.fully_translated())
    }

    /// Render the whole translated book as an HTML document body
    pub fn to_html(&self) -> String {
        let mut out = format!(
            "<h1>{}</h1>\n<p>{}</p>\n<hr>\n",
            self.title_translated.as_deref().unwrap_or(&self.title),
            self.description_translated
                .as_deref()
                .unwrap_or(&self.description),
        );
        for chapter in &self.chapters {
            out.push_str(&chapter.to_html());
        }
        out
    }
}

/// Names an episode by its stable id path within a book
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeRef {
    /// Source URL of the owning book
    pub book_url: String,
    pub chapter_id: String,
    pub episode_id: String,
    /// Where the episode content can be fetched from, when the source
    /// structure declared it
    pub source_url: Option<String>,
}

impl EpisodeRef {
    pub fn new(book: &Book, chapter: &Chapter, episode: &Episode) -> Self {
        Self {
            book_url: book.url.clone(),
            chapter_id: chapter.id.clone(),
            episode_id: episode.id.clone(),
            source_url: episode.source_url.clone(),
        }
    }
}

impl std::fmt::Display for EpisodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.book_url, self.chapter_id, self.episode_id)
    }
}

/// Names a single line within an episode by index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineRef {
    pub episode: EpisodeRef,
    /// Position of the line within the episode
    pub index: usize,
}

impl std::fmt::Display for LineRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.episode, self.index)
    }
}
