/*!
 * Durable, buffered persistence for the content tree.
 *
 * One JSON document per book, keyed by source URL, in a flat directory.
 * Writes are buffered in memory and flushed either when the buffer reaches
 * the configured size or on an explicit checkpoint from the orchestrator.
 * A flush replaces the previous snapshot atomically (write-to-temp, then
 * rename), so a crash can lose at most one buffer's worth of work and can
 * never corrupt the prior durable snapshot.
 */

use log::{debug, info};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use crate::book::{Book, EpisodeRef, LineRef, content_fingerprint};
use crate::errors::StoreError;

/// Default store directory name under the user's data directory
const DEFAULT_STORE_DIRNAME: &str = "bookforge";

/// Buffered book store with atomic flushes
#[derive(Clone)]
pub struct BookStore {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    /// Number of buffered upserts that triggers an automatic flush.
    /// Zero or one means every upsert flushes immediately.
    write_buffer_size: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// In-process view of every loaded book, buffered writes included
    books: HashMap<String, Book>,
    /// URLs with buffered changes not yet on disk
    dirty: HashSet<String>,
    /// Upserts since the last flush
    pending_writes: usize,
}

impl BookStore {
    /// Open a store rooted at the given directory, creating it if needed
    pub fn open<P: AsRef<Path>>(dir: P, write_buffer_size: usize) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        info!("Opened book store at {:?}", dir);
        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                write_buffer_size,
                state: Mutex::new(State::default()),
            }),
        })
    }

    /// Default store directory under the user's local data directory
    pub fn default_store_dir() -> Result<PathBuf, StoreError> {
        let base_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| {
                StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "could not determine data directory",
                ))
            })?;
        Ok(base_dir.join(DEFAULT_STORE_DIRNAME))
    }

    /// Path of the document holding the book for this URL
    pub fn document_path(&self, url: &str) -> PathBuf {
        self.inner.dir.join(document_filename(url))
    }

    /// Load the book for a source URL.
    ///
    /// Returns the buffered in-process copy when one exists, otherwise reads
    /// the last flushed snapshot from disk. A snapshot that fails to parse is
    /// `StoreError::Corruption` and is never repaired here.
    pub fn load(&self, url: &str) -> Result<Option<Book>, StoreError> {
        let mut state = self.inner.state.lock();
        if let Some(book) = state.books.get(url) {
            return Ok(Some(book.clone()));
        }

        let path = self.document_path(url);
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path)?;
        let book: Book = serde_json::from_str(&raw).map_err(|e| StoreError::Corruption {
            path: path.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;

        debug!("Loaded book {} from {:?}", url, path);
        state.books.insert(url.to_string(), book.clone());
        Ok(Some(book))
    }

    /// Buffer an updated book, flushing if the buffer is full
    pub fn upsert(&self, mut book: Book) -> Result<(), StoreError> {
        book.time_meta.touch_saved();
        let mut state = self.inner.state.lock();
        state.dirty.insert(book.url.clone());
        state.books.insert(book.url.clone(), book);
        state.pending_writes += 1;

        if state.pending_writes >= self.inner.write_buffer_size {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// Write every buffered change to disk. Idempotent; safe to call after
    /// partial progress or when nothing is dirty.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock();
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut State) -> Result<(), StoreError> {
        if state.dirty.is_empty() {
            state.pending_writes = 0;
            return Ok(());
        }

        // A URL leaves the dirty set only once its snapshot is on disk, so a
        // failed write stays dirty and the next flush retries it
        let dirty: Vec<String> = state.dirty.iter().cloned().collect();
        for url in dirty {
            let book = match state.books.get(&url) {
                Some(book) => book,
                None => {
                    state.dirty.remove(&url);
                    continue;
                }
            };
            let json = serde_json::to_string_pretty(book)
                .map_err(|_| StoreError::Serialize(url.clone()))?;

            let path = self.document_path(&url);
            let mut tmp = NamedTempFile::new_in(&self.inner.dir)?;
            tmp.write_all(json.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            state.dirty.remove(&url);
            debug!("Flushed {} to {:?}", url, path);
        }
        state.pending_writes = 0;
        Ok(())
    }

    /// Number of upserts buffered since the last flush
    pub fn pending_writes(&self) -> usize {
        self.inner.state.lock().pending_writes
    }

    /// References to every non-blank line of the book whose `translated` is
    /// unset, in tree order
    pub fn query_untranslated(&self, url: &str) -> Result<Vec<LineRef>, StoreError> {
        let book = match self.load(url)? {
            Some(book) => book,
            None => return Ok(Vec::new()),
        };

        let mut refs = Vec::new();
        for chapter in &book.chapters {
            for episode in &chapter.episodes {
                let episode_ref = EpisodeRef::new(&book, chapter, episode);
                for (index, line) in episode.lines.iter().enumerate() {
                    if !line.is_blank() && line.translated.is_none() {
                        refs.push(LineRef {
                            episode: episode_ref.clone(),
                            index,
                        });
                    }
                }
            }
        }
        Ok(refs)
    }
}

/// Derive a stable, filesystem-safe document filename from a source URL
fn document_filename(url: &str) -> String {
    let slug: String = url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .chars()
        .take(64)
        .collect();
    format!("{}-{}.json", slug, &content_fingerprint(url)[..12])
}
