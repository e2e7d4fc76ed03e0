/*!
 * Structural diffing between a freshly fetched book skeleton and the stored
 * tree.
 *
 * Node identity is the stable source-provided id; title and position changes
 * are independent metadata updates and never create duplicate nodes. Nodes
 * the remote no longer lists are kept as orphans with a warning, never
 * deleted, so locally edited content survives source-side pagination gaps.
 */

use log::{debug, warn};

use crate::book::{Book, Episode, EpisodeRef, LineRef};

/// What a structure merge found, including which episodes need their content
/// fetched next
#[derive(Debug, Default)]
pub struct StructureChanges {
    /// Episodes present remotely but not stored yet
    pub new_episodes: Vec<EpisodeRef>,
    /// Stored episodes the remote has updated since our last save
    pub updated_episodes: Vec<EpisodeRef>,
    /// Display paths of stored nodes absent from the fetch, kept as-is
    pub orphaned: Vec<String>,
    /// Chapters or episodes whose title changed
    pub renamed: usize,
    /// Chapters or episodes whose position changed
    pub repositioned: usize,
}

impl StructureChanges {
    /// Every episode whose content should be fetched, new first
    pub fn episodes_to_fetch(&self) -> impl Iterator<Item = &EpisodeRef> {
        self.new_episodes.iter().chain(self.updated_episodes.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.new_episodes.is_empty()
            && self.updated_episodes.is_empty()
            && self.orphaned.is_empty()
            && self.renamed == 0
            && self.repositioned == 0
    }
}

/// Whether a stored episode should be refetched based on skeleton timestamps
fn episode_needs_refetch(stored: &Episode, fetched: &Episode) -> bool {
    if stored.lines.is_empty() {
        return true;
    }
    match (fetched.time_meta.updated_at, stored.time_meta.saved_at) {
        (Some(updated), Some(saved)) => updated > saved,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Merge a freshly fetched skeleton into the stored book (or start from the
/// skeleton on a first run), returning the merged tree and the change set.
pub fn merge_structure(stored: Option<Book>, fetched: Book) -> (Book, StructureChanges) {
    let mut changes = StructureChanges::default();

    let mut stored = match stored {
        Some(stored) => stored,
        None => {
            // First run: everything in the skeleton is new
            for chapter in &fetched.chapters {
                for episode in &chapter.episodes {
                    changes
                        .new_episodes
                        .push(EpisodeRef::new(&fetched, chapter, episode));
                }
            }
            debug!(
                "First fetch of {}: {} new episodes",
                fetched.url,
                changes.new_episodes.len()
            );
            return (fetched, changes);
        }
    };

    // Book metadata overwrite; a changed source field invalidates its
    // stale translation
    if stored.title != fetched.title {
        stored.title = fetched.title.clone();
        stored.title_translated = None;
    }
    if stored.description != fetched.description {
        stored.description = fetched.description.clone();
        stored.description_translated = None;
    }
    if stored.series != fetched.series {
        stored.series = fetched.series.clone();
        stored.series_translated = None;
    }
    stored.author = fetched.author.clone();
    stored.tags = fetched.tags.clone();

    let old_chapters = std::mem::take(&mut stored.chapters);
    let mut leftovers: Vec<_> = old_chapters.into_iter().map(Some).collect();

    for (new_pos, fetched_chapter) in fetched.chapters.into_iter().enumerate() {
        let old_entry = leftovers
            .iter_mut()
            .enumerate()
            .find(|(_, c)| c.as_ref().is_some_and(|c| c.id == fetched_chapter.id));

        match old_entry {
            Some((old_pos, slot)) => {
                let mut chapter = slot.take().unwrap_or(fetched_chapter.clone());
                if old_pos != new_pos {
                    changes.repositioned += 1;
                }
                if chapter.title != fetched_chapter.title {
                    chapter.title = fetched_chapter.title.clone();
                    chapter.title_translated = None;
                    changes.renamed += 1;
                }
                merge_chapter_episodes(&stored.url, &mut chapter, fetched_chapter, &mut changes);
                stored.chapters.push(chapter);
            }
            None => {
                for episode in &fetched_chapter.episodes {
                    changes.new_episodes.push(EpisodeRef {
                        book_url: stored.url.clone(),
                        chapter_id: fetched_chapter.id.clone(),
                        episode_id: episode.id.clone(),
                        source_url: episode.source_url.clone(),
                    });
                }
                stored.chapters.push(fetched_chapter);
            }
        }
    }

    // Stored chapters the fetch no longer lists: kept at the end, warned
    for slot in leftovers.into_iter().flatten() {
        let path = format!("{}/{}", stored.url, slot.id);
        warn!(
            "Chapter '{}' ({}) is no longer listed by the source; keeping stored copy",
            slot.title, path
        );
        changes.orphaned.push(path);
        stored.chapters.push(slot);
    }

    (stored, changes)
}

/// Merge the episode lists of one chapter, same identity rules as chapters
fn merge_chapter_episodes(
    book_url: &str,
    chapter: &mut crate::book::Chapter,
    fetched: crate::book::Chapter,
    changes: &mut StructureChanges,
) {
    let old_episodes = std::mem::take(&mut chapter.episodes);
    let mut leftovers: Vec<_> = old_episodes.into_iter().map(Some).collect();

    for (new_pos, fetched_episode) in fetched.episodes.into_iter().enumerate() {
        let old_entry = leftovers
            .iter_mut()
            .enumerate()
            .find(|(_, e)| e.as_ref().is_some_and(|e| e.id == fetched_episode.id));

        let make_ref = |episode: &Episode| EpisodeRef {
            book_url: book_url.to_string(),
            chapter_id: chapter.id.clone(),
            episode_id: episode.id.clone(),
            source_url: episode.source_url.clone(),
        };

        match old_entry {
            Some((old_pos, slot)) => {
                let mut episode = slot.take().unwrap_or(fetched_episode.clone());
                if old_pos != new_pos {
                    changes.repositioned += 1;
                }
                if episode.title != fetched_episode.title {
                    episode.title = fetched_episode.title.clone();
                    episode.title_translated = None;
                    changes.renamed += 1;
                }
                if episode.notes != fetched_episode.notes && !fetched_episode.notes.is_empty() {
                    episode.notes = fetched_episode.notes.clone();
                    episode.notes_translated = None;
                }
                episode.source_url = fetched_episode.source_url.clone();
                if episode.time_meta.created_at.is_none() {
                    episode.time_meta.created_at = fetched_episode.time_meta.created_at;
                }
                episode.time_meta.updated_at = fetched_episode.time_meta.updated_at;

                if episode_needs_refetch(&episode, &fetched_episode) {
                    changes.updated_episodes.push(make_ref(&episode));
                }
                chapter.episodes.push(episode);
            }
            None => {
                changes.new_episodes.push(make_ref(&fetched_episode));
                chapter.episodes.push(fetched_episode);
            }
        }
    }

    for slot in leftovers.into_iter().flatten() {
        let path = format!("{}/{}/{}", book_url, chapter.id, slot.id);
        warn!(
            "Episode '{}' ({}) is no longer listed by the source; keeping stored copy",
            slot.title, path
        );
        changes.orphaned.push(path);
        chapter.episodes.push(slot);
    }
}

/// Merge freshly fetched raw line text into an episode.
///
/// Lines match positionally; an unchanged fingerprint keeps its translation,
/// a changed one is overwritten with `translated` invalidated. Returns how
/// many lines were added or changed.
pub fn merge_content(episode: &mut Episode, raw_lines: Vec<String>) -> usize {
    let mut changed = 0;

    for (index, content) in raw_lines.iter().enumerate() {
        match episode.lines.get_mut(index) {
            Some(line) => {
                if line.set_content(content.clone()) {
                    changed += 1;
                }
            }
            None => {
                episode.lines.push(crate::book::Line::new(content.clone()));
                changed += 1;
            }
        }
    }
    // Content replacement: trailing lines the source no longer has
    if episode.lines.len() > raw_lines.len() {
        episode.lines.truncate(raw_lines.len());
    }
    episode.time_meta.touch_saved();
    changed
}

/// References to every line of the book needing translation: new lines,
/// changed content, or a `translated` manually reset to null.
pub fn pending_lines(book: &Book) -> Vec<LineRef> {
    let mut refs = Vec::new();
    for chapter in &book.chapters {
        for episode in &chapter.episodes {
            let episode_ref = EpisodeRef::new(book, chapter, episode);
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
    refs
}
