//! In-memory breakdown index over marker counts.
//!
//! Answers "how many items in this section have N intros and M credits"
//! without touching the library database. Populated from one
//! section-overview query per section at startup, then maintained by a
//! delta per committed mutation. Shifts never change marker types, so they
//! never touch the cache.
//!
//! Readers are aggregate queries and tolerate the brief window between a
//! transaction committing and its delta landing; the numbers are
//! statistical, not transactional.

use cuemark_media::{MarkerType, OverviewEntry};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tokio::sync::RwLock;

/// An item's `(intros, credits)` pair packed into one machine word,
/// credits in the high half. The packed integer is an implementation
/// detail; everything outside this crate sees the unpacked pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackedBucket(u32);

impl PackedBucket {
    pub(crate) fn pack(intros: u16, credits: u16) -> Self {
        Self((u32::from(credits) << 16) | u32::from(intros))
    }

    pub fn intros(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub fn credits(&self) -> u16 {
        (self.0 >> 16) as u16
    }
}

/// Buckets order by the raw word: credits-major, then intros. Deterministic
/// is all that matters here.
impl Display for PackedBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{},{}", self.intros(), self.credits())
    }
}

/// Per-item marker counts: the intro/credits bucket plus a commercial
/// count. Commercials contribute to per-item totals but stay out of the
/// `(intros, credits)` breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCounts {
    pub(crate) bucket: PackedBucket,
    pub(crate) commercials: u32,
}

impl ItemCounts {
    pub(crate) fn adjust(&mut self, kind: MarkerType, delta: i32) {
        let apply = |count: u32| -> u32 {
            match count.checked_add_signed(delta) {
                Some(next) => next,
                None => {
                    tracing::warn!(kind = %kind, delta, "breakdown count underflow; clamping to zero");
                    0
                },
            }
        };
        match kind {
            MarkerType::Intro => {
                self.bucket = PackedBucket::pack(apply(u32::from(self.bucket.intros())) as u16, self.bucket.credits());
            },
            MarkerType::Credits => {
                self.bucket = PackedBucket::pack(self.bucket.intros(), apply(u32::from(self.bucket.credits())) as u16);
            },
            MarkerType::Commercial => self.commercials = apply(self.commercials),
        }
    }

    /// Total markers on the item, commercials included.
    pub fn total(&self) -> u64 {
        u64::from(self.bucket.intros()) + u64::from(self.bucket.credits()) + u64::from(self.commercials)
    }
}

/// Aggregate statistics over a set of items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakdown {
    items: u64,
    buckets: BTreeMap<PackedBucket, u64>,
    totals: BTreeMap<u64, u64>,
    intros: BTreeMap<u16, u64>,
    credits: BTreeMap<u16, u64>,
    total_intros: u64,
    total_credits: u64,
    total_commercials: u64,
    items_with_markers: u64,
    items_with_intros: u64,
    items_with_credits: u64,
}

impl Breakdown {
    pub(crate) fn from_counts<'a>(counts: impl Iterator<Item = &'a ItemCounts>) -> Self {
        let mut breakdown = Self::default();
        for item in counts {
            breakdown.add_item(item);
        }
        breakdown
    }

    fn add_item(&mut self, counts: &ItemCounts) {
        let (intros, credits) = (counts.bucket.intros(), counts.bucket.credits());
        self.items += 1;
        *self.buckets.entry(counts.bucket).or_default() += 1;
        *self.totals.entry(counts.total()).or_default() += 1;
        *self.intros.entry(intros).or_default() += 1;
        *self.credits.entry(credits).or_default() += 1;
        self.total_intros += u64::from(intros);
        self.total_credits += u64::from(credits);
        self.total_commercials += u64::from(counts.commercials);
        if counts.total() > 0 {
            self.items_with_markers += 1;
        }
        if intros > 0 {
            self.items_with_intros += 1;
        }
        if credits > 0 {
            self.items_with_credits += 1;
        }
    }

    /// Item count per distinct `(intros, credits)` combination.
    pub fn buckets(&self) -> &BTreeMap<PackedBucket, u64> {
        &self.buckets
    }

    /// Item count per total marker count (commercials included).
    pub fn collapsed_buckets(&self) -> &BTreeMap<u64, u64> {
        &self.totals
    }

    /// Item count per intro count.
    pub fn intro_buckets(&self) -> &BTreeMap<u16, u64> {
        &self.intros
    }

    /// Item count per credits count.
    pub fn credits_buckets(&self) -> &BTreeMap<u16, u64> {
        &self.credits
    }

    pub fn items(&self) -> u64 {
        self.items
    }

    pub fn total_intros(&self) -> u64 {
        self.total_intros
    }

    pub fn total_credits(&self) -> u64 {
        self.total_credits
    }

    pub fn total_markers(&self) -> u64 {
        self.total_intros + self.total_credits + self.total_commercials
    }

    pub fn items_with_markers(&self) -> u64 {
        self.items_with_markers
    }

    pub fn items_with_intros(&self) -> u64 {
        self.items_with_intros
    }

    pub fn items_with_credits(&self) -> u64 {
        self.items_with_credits
    }
}

/// Fold a section overview into per-item counts.
pub(crate) fn counts_from_overview(entries: &[OverviewEntry]) -> HashMap<i64, ItemCounts> {
    let mut counts: HashMap<i64, ItemCounts> = HashMap::new();
    for entry in entries {
        let item = counts.entry(entry.parent_id).or_default();
        // Entries with no type are markerless leaves; they still claim a slot.
        if let Some(kind) = entry.kind
            && let Ok(delta) = i32::try_from(entry.count)
        {
            item.adjust(kind, delta);
        }
    }
    counts
}

/// The breakdown index: section → item → counts, behind one
/// reader/writer lock.
#[derive(Debug, Default)]
pub struct MarkerCache {
    sections: RwLock<HashMap<i64, HashMap<i64, ItemCounts>>>,
}

impl MarkerCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replace one section's counts from a fresh overview scan.
    pub(crate) async fn load_section(&self, section_id: i64, entries: &[OverviewEntry]) {
        let counts = counts_from_overview(entries);
        self.sections.write().await.insert(section_id, counts);
    }

    /// Apply a post-commit mutation delta.
    pub(crate) async fn delta(&self, section_id: i64, parent_id: i64, kind: MarkerType, delta: i32) {
        let mut sections = self.sections.write().await;
        sections.entry(section_id).or_default().entry(parent_id).or_default().adjust(kind, delta);
    }

    /// Aggregate over a whole section.
    pub(crate) async fn breakdown(&self, section_id: i64) -> Breakdown {
        let sections = self.sections.read().await;
        match sections.get(&section_id) {
            Some(counts) => Breakdown::from_counts(counts.values()),
            None => Breakdown::default(),
        }
    }

    /// Aggregate over a subset of a section's items (show or season
    /// roll-up: a show's breakdown is the sum of its episodes').
    pub(crate) async fn breakdown_for(&self, section_id: i64, parents: &[i64]) -> Breakdown {
        let sections = self.sections.read().await;
        let Some(counts) = sections.get(&section_id) else {
            return Breakdown::default();
        };
        let zero = ItemCounts::default();
        Breakdown::from_counts(parents.iter().map(|id| counts.get(id).unwrap_or(&zero)))
    }

    #[cfg(test)]
    pub(crate) async fn snapshot(&self, section_id: i64) -> HashMap<i64, ItemCounts> {
        self.sections.read().await.get(&section_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(3, 1)]
    #[case(u16::MAX, u16::MAX)]
    fn test_pack_unpack(#[case] intros: u16, #[case] credits: u16) {
        let bucket = PackedBucket::pack(intros, credits);
        assert_eq!(bucket.intros(), intros);
        assert_eq!(bucket.credits(), credits);
    }

    #[test]
    fn test_bucket_display_is_intros_comma_credits() {
        assert_eq!(PackedBucket::pack(2, 1).to_string(), "2,1");
    }

    #[test]
    fn test_adjust_underflow_clamps() {
        let mut counts = ItemCounts::default();
        counts.adjust(MarkerType::Intro, -1);
        assert_eq!(counts.bucket.intros(), 0);
    }

    #[tokio::test]
    async fn test_delta_moves_items_between_buckets() {
        let cache = MarkerCache::new();
        cache.load_section(1, &[]).await;
        cache.delta(1, 1000, MarkerType::Intro, 1).await;
        cache.delta(1, 1000, MarkerType::Credits, 1).await;
        cache.delta(1, 1001, MarkerType::Intro, 1).await;

        let breakdown = cache.breakdown(1).await;
        assert_eq!(breakdown.items(), 2);
        assert_eq!(breakdown.total_intros(), 2);
        assert_eq!(breakdown.total_credits(), 1);
        assert_eq!(breakdown.buckets()[&PackedBucket::pack(1, 1)], 1);
        assert_eq!(breakdown.buckets()[&PackedBucket::pack(1, 0)], 1);
    }

    #[tokio::test]
    async fn test_commercials_count_in_totals_but_not_buckets() {
        let cache = MarkerCache::new();
        cache.delta(1, 1000, MarkerType::Commercial, 2).await;
        let breakdown = cache.breakdown(1).await;
        assert_eq!(breakdown.total_markers(), 2);
        assert_eq!(breakdown.items_with_markers(), 1);
        assert_eq!(breakdown.buckets()[&PackedBucket::pack(0, 0)], 1);
        assert_eq!(breakdown.collapsed_buckets()[&2], 1);
    }

    #[tokio::test]
    async fn test_breakdown_for_rolls_up_a_subset() {
        let cache = MarkerCache::new();
        cache.delta(1, 1000, MarkerType::Intro, 1).await;
        cache.delta(1, 1001, MarkerType::Intro, 1).await;
        cache.delta(1, 2000, MarkerType::Intro, 1).await;
        let rollup = cache.breakdown_for(1, &[1000, 1001]).await;
        assert_eq!(rollup.items(), 2);
        assert_eq!(rollup.total_intros(), 2);
    }
}
