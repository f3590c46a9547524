use std::ops::AddAssign;

/// Counters for one harvesting run. Per-agency workers each keep their own
/// and the stage sums them at the end.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub agencies: u32,
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub items_found: u32,
    pub inserted: u32,
    pub already_stored: u32,
    /// Fetched but not a document, or no text could be extracted.
    pub skipped: u32,
    pub failed: u32,
}

impl AddAssign for HarvestStats {
    fn add_assign(&mut self, other: Self) {
        self.agencies += other.agencies;
        self.pages_fetched += other.pages_fetched;
        self.pages_failed += other.pages_failed;
        self.items_found += other.items_found;
        self.inserted += other.inserted;
        self.already_stored += other.already_stored;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl std::fmt::Display for HarvestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "agencies {}, pages {} ({} failed), items {}, inserted {}, already stored {}, skipped {}, failed {}",
            self.agencies,
            self.pages_fetched,
            self.pages_failed,
            self.items_found,
            self.inserted,
            self.already_stored,
            self.skipped,
            self.failed
        )
    }
}
