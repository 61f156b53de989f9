//! Chapter selection: filtering, ranking and per-chapter deduplication.

use log::debug;
use regex::Regex;

use crate::error::{Error, Result};
use crate::list::ChapterList;
use crate::range::RangeSet;
use crate::types::{ChapterInfo, RankingPolicy};

/// A predicate over one field of a chapter submission.
#[derive(Debug, Clone)]
pub enum ChapterFilter {
    /// Exact match on a normalized language tag.
    Language(String),
    /// Regular expression over the joined group names.
    GroupName { pattern: Regex, negated: bool },
    Volume(RangeSet),
    Chapter(RangeSet),
}

impl ChapterFilter {
    /// Matches chapters whose language is `tag` once it is normalized with
    /// [`normalize_language_tag`]. Catalog tags are already in that form.
    pub fn language(tag: &str) -> Self {
        ChapterFilter::Language(normalize_language_tag(tag))
    }

    /// Compiles a group-name pattern; a leading `!` negates it.
    pub fn group_name(pattern: &str) -> Result<Self> {
        let (negated, body) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        Ok(ChapterFilter::GroupName {
            pattern: Regex::new(body)?,
            negated,
        })
    }

    pub fn volumes(ranges: &str) -> Self {
        ChapterFilter::Volume(RangeSet::parse(ranges))
    }

    pub fn chapters(ranges: &str) -> Self {
        ChapterFilter::Chapter(RangeSet::parse(ranges))
    }

    pub fn matches(&self, chapter: &ChapterInfo) -> bool {
        match self {
            ChapterFilter::Language(tag) => chapter.language == *tag,
            ChapterFilter::GroupName { pattern, negated } => {
                pattern.is_match(&chapter.group_key()) != *negated
            }
            ChapterFilter::Volume(ranges) => ranges.contains(&chapter.volume_identifier),
            ChapterFilter::Chapter(ranges) => ranges.contains(&chapter.identifier),
        }
    }
}

/// Brings a user-supplied language tag into the catalog's form: trimmed,
/// lowercase, with `-` separating subtags (`"pt_BR"` becomes `"pt-br"`).
pub fn normalize_language_tag(tag: &str) -> String {
    tag.trim().to_ascii_lowercase().replace('_', "-")
}

/// Filters, ranks and deduplicates a chapter list.
///
/// All filters must match. Ranking runs on the survivors, local chapters are
/// then moved to the front, one submission is kept per (chapter, volume) pair
/// and the result is sorted by chapter identifier. Fails with
/// [`Error::EmptyResult`] when nothing is left.
pub fn select(
    chapters: ChapterList,
    filters: &[ChapterFilter],
    ranking: RankingPolicy,
) -> Result<ChapterList> {
    let total = chapters.len();
    let filtered = chapters.filter_by(|c| filters.iter().all(|f| f.matches(c)));
    debug!("{} of {} chapters passed the filters", filtered.len(), total);

    let selected = filtered
        .rank(ranking)
        .prefer_local()
        .collapse_by(|c| (c.identifier.clone(), c.volume_identifier.clone()))
        .sort_by_identifier();

    if selected.is_empty() {
        return Err(Error::EmptyResult);
    }
    debug!(
        "Selected {} chapters using '{}' ranking",
        selected.len(),
        ranking
    );
    Ok(selected)
}
