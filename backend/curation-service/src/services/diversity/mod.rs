use crate::config::{CurationConfig, KindTable};
use crate::models::{ContentKind, CuratedItem};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

/// Diversity Layer - constrained selection and kind rebalancing
///
/// Both passes take an immutable scored list and return a new list, so they
/// can be tested without the scoring stage.
pub struct DiversityLayer {
    max_per_author_kind: usize, // per (author, kind) admission cap
    max_kind_share: f64,        // share of the working pool one kind may take
    target_mix: KindTable,
    set_size: usize,
}

/// Outcome of the constrained selection pass
#[derive(Debug, Clone, Default)]
pub struct DiversitySelection {
    pub kept: Vec<CuratedItem>,
    pub author_capped: usize,
    pub kind_capped: usize,
}

/// Newest first; equal timestamps resolve by id
pub fn newest_first(a: &CuratedItem, b: &CuratedItem) -> Ordering {
    b.item
        .created_at
        .cmp(&a.item.created_at)
        .then_with(|| a.item.id.cmp(&b.item.id))
}

/// Highest score first; equal scores resolve by id
pub fn best_score_first(a: &CuratedItem, b: &CuratedItem) -> Ordering {
    b.final_score
        .partial_cmp(&a.final_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.item.id.cmp(&b.item.id))
}

impl DiversityLayer {
    pub fn new(config: &CurationConfig) -> Self {
        Self {
            max_per_author_kind: config.max_per_author_kind,
            max_kind_share: config.max_kind_share,
            target_mix: config.target_mix.clone(),
            set_size: config.curated_set_size,
        }
    }

    /// Admission cap for a single kind given the working pool size (at least 1)
    pub fn kind_cap(&self, pool_size: usize) -> usize {
        ((pool_size as f64 * self.max_kind_share).floor() as usize).max(1)
    }

    /// Walk newest-first and admit items until an author/kind or kind cap is hit
    pub fn select(&self, pool: &[CuratedItem]) -> DiversitySelection {
        let kind_cap = self.kind_cap(pool.len());

        let mut walk: Vec<&CuratedItem> = pool.iter().collect();
        walk.sort_by(|a, b| newest_first(a, b));

        let mut per_author_kind: HashMap<(Uuid, ContentKind), usize> = HashMap::new();
        let mut per_kind: HashMap<ContentKind, usize> = HashMap::new();
        let mut selection = DiversitySelection::default();

        for candidate in walk {
            let key = (candidate.item.author_id, candidate.item.kind);
            let author_count = per_author_kind.get(&key).copied().unwrap_or(0);
            if author_count >= self.max_per_author_kind {
                selection.author_capped += 1;
                continue;
            }

            let kind_count = per_kind.get(&candidate.item.kind).copied().unwrap_or(0);
            if kind_count >= kind_cap {
                selection.kind_capped += 1;
                continue;
            }

            per_author_kind.insert(key, author_count + 1);
            per_kind.insert(candidate.item.kind, kind_count + 1);
            selection.kept.push(candidate.clone());
        }

        selection
    }

    /// Re-partition toward the target mix, fill with best leftovers, present newest-first
    pub fn rebalance(&self, kept: &[CuratedItem]) -> Vec<CuratedItem> {
        let size = kept.len().min(self.set_size);

        let mut by_kind: HashMap<ContentKind, Vec<&CuratedItem>> = HashMap::new();
        for item in kept {
            by_kind.entry(item.item.kind).or_default().push(item);
        }

        let mut chosen: Vec<&CuratedItem> = Vec::with_capacity(size);
        let mut leftovers: Vec<&CuratedItem> = Vec::new();

        for kind in ContentKind::ALL {
            let Some(mut items) = by_kind.remove(&kind) else {
                continue;
            };
            items.sort_by(|a, b| best_score_first(a, b));

            // Epsilon keeps exact products such as 45 * 0.6 from flooring down a slot
            let quota = (size as f64 * self.target_mix.get(kind) + 1e-9).floor() as usize;
            let take = quota.min(items.len());
            leftovers.extend(items.drain(take..));
            chosen.extend(items);
        }

        leftovers.sort_by(|a, b| best_score_first(a, b));
        let open_slots = size.saturating_sub(chosen.len());
        chosen.extend(leftovers.into_iter().take(open_slots));

        let mut rebalanced: Vec<CuratedItem> = chosen.into_iter().cloned().collect();
        rebalanced.sort_by(newest_first);
        rebalanced
    }
}
