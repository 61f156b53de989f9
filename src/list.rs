//! Ordered chapter lists and the ranking algorithms built on them.
//!
//! Every operation here is order-preserving where it can be: filtering keeps
//! the input order, sorting is stable and collapsing keeps the first element
//! seen per key. Ranking relies on that, since a later stable sort must not
//! undo the preference an earlier one established.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::identifier::Identifier;
use crate::types::{ChapterInfo, RankingPolicy};

/// A flat list of chapter submissions.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChapterList(Vec<ChapterInfo>);

impl ChapterList {
    pub fn new(chapters: Vec<ChapterInfo>) -> Self {
        Self(chapters)
    }

    pub fn into_inner(self) -> Vec<ChapterInfo> {
        self.0
    }

    /// Keeps the chapters matching `predicate`, in input order.
    pub fn filter_by<F>(self, predicate: F) -> Self
    where
        F: Fn(&ChapterInfo) -> bool,
    {
        Self(self.0.into_iter().filter(|c| predicate(c)).collect())
    }

    /// Stable sort; chapters comparing equal keep their relative order.
    pub fn sort_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&ChapterInfo, &ChapterInfo) -> Ordering + Sync,
    {
        self.0.par_sort_by(|a, b| compare(a, b));
        self
    }

    /// Keeps the first chapter seen for every distinct key, in first-seen order.
    pub fn collapse_by<K, F>(self, key: F) -> Self
    where
        K: Eq + Hash,
        F: Fn(&ChapterInfo) -> K,
    {
        let mut seen = std::collections::HashSet::new();
        Self(self.0.into_iter().filter(|c| seen.insert(key(c))).collect())
    }

    /// Stable sort by chapter identifier.
    pub fn sort_by_identifier(self) -> Self {
        self.sort_by(|a, b| a.identifier.cmp(&b.identifier))
    }

    /// Orders submissions so the preferred one for each chapter comes first.
    ///
    /// Ties keep their current order, which for a freshly fetched list is the
    /// catalog's feed order.
    pub fn rank(self, policy: RankingPolicy) -> Self {
        match policy {
            RankingPolicy::Newest => self.sort_by(|a, b| b.published.cmp(&a.published)),
            RankingPolicy::NewestGroup => {
                let earliest = self.group_aggregate(|acc: Option<DateTime<Utc>>, c| {
                    Some(acc.map_or(c.published, |t| t.min(c.published)))
                });
                self.sort_by(|a, b| earliest[&b.group_key()].cmp(&earliest[&a.group_key()]))
            }
            RankingPolicy::Views => self.sort_by(|a, b| b.views.cmp(&a.views)),
            RankingPolicy::ViewsGroup => {
                let views = self.group_aggregate(|acc: u64, c| acc.saturating_add(c.views));
                self.sort_by(|a, b| views[&b.group_key()].cmp(&views[&a.group_key()]))
            }
            RankingPolicy::Most => {
                let counts = self.group_aggregate(|acc: usize, _| acc + 1);
                self.sort_by(|a, b| counts[&b.group_key()].cmp(&counts[&a.group_key()]))
            }
        }
    }

    /// Moves locally loaded chapters ahead of catalog ones, keeping each
    /// side's order, so collapsing prefers them.
    pub fn prefer_local(self) -> Self {
        self.sort_by(|a, b| b.is_local().cmp(&a.is_local()))
    }

    /// Adjacent pairs of an identifier-sorted list with a numeric gap between
    /// them. Counting starts at chapter 0, so missing leading chapters show up
    /// as a gap from 0. Special identifiers are skipped.
    pub fn discontinuities(&self) -> Vec<(Identifier, Identifier)> {
        let mut gaps = Vec::new();
        let mut last = Identifier::numeric(0, 0);
        for id in self.0.iter().map(|c| &c.identifier).filter(|id| id.is_numeric()) {
            if !last.matches(id) && !last.is_next(id) {
                gaps.push((last, id.clone()));
            }
            last = id.clone();
        }
        gaps
    }

    fn group_aggregate<T, F>(&self, fold: F) -> HashMap<String, T>
    where
        T: Default + Clone,
        F: Fn(T, &ChapterInfo) -> T,
    {
        let mut totals: HashMap<String, T> = HashMap::new();
        for chapter in &self.0 {
            let entry = totals.entry(chapter.group_key()).or_default();
            *entry = fold(entry.clone(), chapter);
        }
        totals
    }
}

impl Deref for ChapterList {
    type Target = [ChapterInfo];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<ChapterInfo>> for ChapterList {
    fn from(chapters: Vec<ChapterInfo>) -> Self {
        Self(chapters)
    }
}

impl FromIterator<ChapterInfo> for ChapterList {
    fn from_iter<I: IntoIterator<Item = ChapterInfo>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ChapterList {
    type Item = ChapterInfo;
    type IntoIter = std::vec::IntoIter<ChapterInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChapterList {
    type Item = &'a ChapterInfo;
    type IntoIter = std::slice::Iter<'a, ChapterInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
