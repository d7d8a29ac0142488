use async_trait::async_trait;
use chalet_core::{RepoError, RepoResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// Half-open stay interval `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, AvailabilityError> {
        if check_out <= check_in {
            return Err(AvailabilityError::InvalidRange { check_in, check_out });
        }
        Ok(Self { check_in, check_out })
    }

    /// Two stays conflict iff each one starts before the other ends.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    /// Billable nights, never less than one.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days().max(1)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

/// Proof that a range was committed to a listing's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationToken {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved(ReservationToken),
    Conflict { existing: Uuid, range: DateRange },
}

/// Where committed (pending or confirmed) stays are read from when a
/// calendar is first touched or refreshed.
#[async_trait]
pub trait CommittedRanges: Send + Sync {
    async fn committed_ranges(&self, listing_id: Uuid) -> RepoResult<Vec<(Uuid, DateRange)>>;
}

/// Committed stays of one listing.
///
/// Reservations made here stay `local` until [`ListingCalendar::settle`] is
/// called once they are persisted; hydration keeps local entries, so a
/// refresh never drops a reservation storage has not seen yet.
#[derive(Debug)]
pub struct ListingCalendar {
    listing_id: Uuid,
    hydrated: bool,
    by_start: BTreeMap<(NaiveDate, Uuid), DateRange>,
    by_id: HashMap<Uuid, DateRange>,
    local: HashSet<Uuid>,
}

impl ListingCalendar {
    pub fn new(listing_id: Uuid) -> Self {
        Self {
            listing_id,
            hydrated: false,
            by_start: BTreeMap::new(),
            by_id: HashMap::new(),
            local: HashSet::new(),
        }
    }

    pub fn listing_id(&self) -> Uuid {
        self.listing_id
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Replaces the contents with what storage reports.
    pub fn hydrate(&mut self, committed: impl IntoIterator<Item = (Uuid, DateRange)>) {
        let unsettled: Vec<(Uuid, DateRange)> = self
            .local
            .iter()
            .filter_map(|id| self.by_id.get(id).map(|range| (*id, *range)))
            .collect();

        self.by_start.clear();
        self.by_id.clear();
        for (id, range) in committed {
            self.insert(id, range);
        }
        for (id, range) in unsettled {
            if !self.by_id.contains_key(&id) {
                self.insert(id, range);
            }
        }
        self.hydrated = true;
    }

    /// Marks a reservation as persisted; from now on storage is authoritative for it.
    pub fn settle(&mut self, id: &Uuid) {
        self.local.remove(id);
    }

    /// Forces the next lock to re-read storage.
    pub fn invalidate(&mut self) {
        self.hydrated = false;
    }

    pub fn find_conflict(&self, range: &DateRange) -> Option<(Uuid, DateRange)> {
        // Only stays starting before `range` ends can overlap it.
        self.by_start
            .range(..(range.check_out, Uuid::nil()))
            .rev()
            .find(|(_, committed)| committed.overlaps(range))
            .map(|((_, id), committed)| (*id, *committed))
    }

    pub fn is_available(&self, range: &DateRange) -> bool {
        self.find_conflict(range).is_none()
    }

    pub fn reserve(&mut self, id: Uuid, range: DateRange) -> ReserveOutcome {
        if let Some((existing, committed)) = self.find_conflict(&range) {
            return ReserveOutcome::Conflict { existing, range: committed };
        }
        self.insert(id, range);
        self.local.insert(id);
        ReserveOutcome::Reserved(ReservationToken {
            id,
            listing_id: self.listing_id,
            range,
        })
    }

    pub fn release(&mut self, id: &Uuid) -> Option<DateRange> {
        self.local.remove(id);
        let range = self.by_id.remove(id)?;
        self.by_start.remove(&(range.check_in, *id));
        Some(range)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.by_id.contains_key(id)
    }

    /// Committed stays intersecting `window`, ordered by check-in.
    pub fn overlapping(&self, window: &DateRange) -> Vec<(Uuid, DateRange)> {
        self.by_start
            .range(..(window.check_out, Uuid::nil()))
            .filter(|(_, committed)| committed.overlaps(window))
            .map(|((_, id), committed)| (*id, *committed))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn insert(&mut self, id: Uuid, range: DateRange) {
        self.by_start.insert((range.check_in, id), range);
        self.by_id.insert(id, range);
    }
}

/// Exclusive, hydrated access to one listing's calendar. Dropping it lets the
/// next writer in.
pub struct CalendarGuard {
    inner: OwnedMutexGuard<ListingCalendar>,
}

impl Deref for CalendarGuard {
    type Target = ListingCalendar;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for CalendarGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// Per-listing view of committed stays.
///
/// Writers to the same listing are serialized by a lock keyed by listing id;
/// different listings never contend. Calendars are derived from storage on
/// first use and re-read whenever an in-memory conflict is found, so storage
/// stays the source of truth.
pub struct AvailabilityIndex {
    source: Arc<dyn CommittedRanges>,
    calendars: StdMutex<HashMap<Uuid, Arc<Mutex<ListingCalendar>>>>,
    lock_timeout: Duration,
}

impl AvailabilityIndex {
    pub fn new(source: Arc<dyn CommittedRanges>, lock_timeout: Duration) -> Self {
        Self {
            source,
            calendars: StdMutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Waits (bounded) for the listing's writer lock.
    pub async fn lock(&self, listing_id: Uuid) -> Result<CalendarGuard, AvailabilityError> {
        let slot = self.slot(listing_id);
        let inner = tokio::time::timeout(self.lock_timeout, slot.lock_owned())
            .await
            .map_err(|_| {
                warn!(%listing_id, waited_ms = self.lock_timeout.as_millis() as u64, "calendar lock timed out");
                AvailabilityError::Timeout {
                    listing_id,
                    waited: self.lock_timeout,
                }
            })?;

        let mut guard = CalendarGuard { inner };
        if !guard.is_hydrated() {
            self.refresh(&mut guard).await?;
        }
        Ok(guard)
    }

    /// Re-reads committed stays from storage.
    pub async fn refresh(&self, guard: &mut CalendarGuard) -> Result<(), AvailabilityError> {
        let listing_id = guard.listing_id();
        let committed = self.source.committed_ranges(listing_id).await?;
        debug!(%listing_id, committed = committed.len(), "calendar hydrated");
        guard.hydrate(committed);
        Ok(())
    }

    /// Check-and-insert on an already locked calendar. A conflict is confirmed
    /// against storage before being reported.
    pub async fn reserve_in(
        &self,
        guard: &mut CalendarGuard,
        id: Uuid,
        range: DateRange,
    ) -> Result<ReserveOutcome, AvailabilityError> {
        match guard.reserve(id, range) {
            ReserveOutcome::Conflict { .. } => {
                self.refresh(guard).await?;
                Ok(guard.reserve(id, range))
            }
            reserved => Ok(reserved),
        }
    }

    pub async fn reserve(&self, listing_id: Uuid, range: DateRange) -> Result<ReserveOutcome, AvailabilityError> {
        let mut guard = self.lock(listing_id).await?;
        self.reserve_in(&mut guard, Uuid::new_v4(), range).await
    }

    /// Returns whether the reservation was present.
    pub async fn release(&self, listing_id: Uuid, reservation_id: Uuid) -> Result<bool, AvailabilityError> {
        let mut guard = self.lock(listing_id).await?;
        Ok(guard.release(&reservation_id).is_some())
    }

    pub async fn is_available(&self, listing_id: Uuid, range: DateRange) -> Result<bool, AvailabilityError> {
        let guard = self.lock(listing_id).await?;
        Ok(guard.is_available(&range))
    }

    /// Committed stays intersecting `window`. May lag behind other instances.
    pub async fn committed(&self, listing_id: Uuid, window: DateRange) -> Result<Vec<DateRange>, AvailabilityError> {
        let guard = self.lock(listing_id).await?;
        Ok(guard.overlapping(&window).into_iter().map(|(_, r)| r).collect())
    }

    fn slot(&self, listing_id: Uuid) -> Arc<Mutex<ListingCalendar>> {
        let mut calendars = self.calendars.lock().unwrap_or_else(PoisonError::into_inner);
        calendars
            .entry(listing_id)
            .or_insert_with(|| Arc::new(Mutex::new(ListingCalendar::new(listing_id))))
            .clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Invalid date range: check-out {check_out} must be after check-in {check_in}")]
    InvalidRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },

    #[error("Timed out after {waited:?} waiting for listing {listing_id}")]
    Timeout {
        listing_id: Uuid,
        waited: Duration,
    },

    #[error(transparent)]
    Backend(#[from] RepoError),
}

impl From<AvailabilityError> for chalet_core::CoreError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::InvalidRange { .. } => chalet_core::CoreError::Validation(err.to_string()),
            AvailabilityError::Timeout { .. } => chalet_core::CoreError::Timeout(err.to_string()),
            AvailabilityError::Backend(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn range(from: u32, to: u32) -> DateRange {
        DateRange::new(d(from), d(to)).unwrap()
    }

    #[derive(Default)]
    struct FixedRanges(StdMutex<Vec<(Uuid, DateRange)>>);

    impl FixedRanges {
        fn set(&self, ranges: Vec<(Uuid, DateRange)>) {
            *self.0.lock().unwrap() = ranges;
        }
    }

    #[async_trait]
    impl CommittedRanges for FixedRanges {
        async fn committed_ranges(&self, _listing_id: Uuid) -> RepoResult<Vec<(Uuid, DateRange)>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    #[test]
    fn test_range_validation() {
        assert!(DateRange::new(d(4), d(4)).is_err());
        assert!(DateRange::new(d(4), d(1)).is_err());
        assert_eq!(range(1, 4).nights(), 3);
    }

    #[test]
    fn test_half_open_overlap() {
        // Back-to-back stays share the turnover day.
        assert!(!range(1, 4).overlaps(&range(4, 6)));
        assert!(!range(4, 6).overlaps(&range(1, 4)));
        assert!(range(1, 4).overlaps(&range(3, 5)));
        assert!(range(1, 10).overlaps(&range(3, 5)));
        assert!(range(3, 5).overlaps(&range(1, 10)));
    }

    #[test]
    fn test_calendar_lifecycle() {
        let listing_id = Uuid::new_v4();
        let mut calendar = ListingCalendar::new(listing_id);
        let first = Uuid::new_v4();

        assert!(matches!(calendar.reserve(first, range(1, 4)), ReserveOutcome::Reserved(_)));
        match calendar.reserve(Uuid::new_v4(), range(3, 5)) {
            ReserveOutcome::Conflict { existing, range: r } => {
                assert_eq!(existing, first);
                assert_eq!(r, range(1, 4));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert!(matches!(calendar.reserve(Uuid::new_v4(), range(4, 6)), ReserveOutcome::Reserved(_)));

        assert_eq!(calendar.release(&first), Some(range(1, 4)));
        assert!(calendar.is_available(&range(1, 4)));
        assert_eq!(calendar.len(), 1);
    }

    #[test]
    fn test_conflict_found_behind_short_stay() {
        let mut calendar = ListingCalendar::new(Uuid::new_v4());
        calendar.hydrate(vec![(Uuid::new_v4(), range(1, 20)), (Uuid::new_v4(), range(2, 3))]);

        assert!(!calendar.is_available(&range(10, 12)));
    }

    #[test]
    fn test_hydrate_keeps_unsettled_reservations() {
        let mut calendar = ListingCalendar::new(Uuid::new_v4());
        let pending = Uuid::new_v4();
        let persisted = Uuid::new_v4();
        assert!(matches!(calendar.reserve(pending, range(1, 3)), ReserveOutcome::Reserved(_)));
        assert!(matches!(calendar.reserve(persisted, range(5, 7)), ReserveOutcome::Reserved(_)));
        calendar.settle(&persisted);

        // Storage has neither: the settled one was cancelled elsewhere.
        calendar.hydrate(Vec::new());

        assert!(calendar.contains(&pending));
        assert!(!calendar.contains(&persisted));
    }

    #[test]
    fn test_overlapping_window() {
        let mut calendar = ListingCalendar::new(Uuid::new_v4());
        calendar.hydrate(vec![
            (Uuid::new_v4(), range(1, 3)),
            (Uuid::new_v4(), range(5, 8)),
            (Uuid::new_v4(), range(20, 22)),
        ]);

        let hits: Vec<DateRange> = calendar.overlapping(&range(2, 6)).into_iter().map(|(_, r)| r).collect();
        assert_eq!(hits, vec![range(1, 3), range(5, 8)]);
    }

    #[tokio::test]
    async fn test_index_hydrates_from_source() {
        let source = Arc::new(FixedRanges::default());
        source.set(vec![(Uuid::new_v4(), range(10, 12))]);
        let index = AvailabilityIndex::new(source, Duration::from_millis(200));
        let listing_id = Uuid::new_v4();

        assert!(!index.is_available(listing_id, range(11, 13)).await.unwrap());
        assert!(index.is_available(listing_id, range(12, 13)).await.unwrap());
    }

    #[tokio::test]
    async fn test_conflict_is_rechecked_against_source() {
        let source = Arc::new(FixedRanges::default());
        let stale = Uuid::new_v4();
        source.set(vec![(stale, range(1, 4))]);
        let index = AvailabilityIndex::new(source.clone(), Duration::from_millis(200));
        let listing_id = Uuid::new_v4();
        assert!(!index.is_available(listing_id, range(1, 4)).await.unwrap());

        // Released by another instance; the cached calendar still has it.
        source.set(vec![]);
        let outcome = index.reserve(listing_id, range(1, 4)).await.unwrap();
        assert!(matches!(outcome, ReserveOutcome::Reserved(_)));
    }

    #[tokio::test]
    async fn test_concurrent_reserves_admit_one() {
        let index = Arc::new(AvailabilityIndex::new(Arc::new(FixedRanges::default()), Duration::from_secs(2)));
        let listing_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for offset in 0..8 {
            let index = index.clone();
            // All requests cover the 5th.
            let r = range(1 + offset % 4, 6 + offset % 3);
            handles.push(tokio::spawn(async move { index.reserve(listing_id, r).await }));
        }

        let mut reserved = 0;
        for handle in handles {
            if let ReserveOutcome::Reserved(_) = handle.await.unwrap().unwrap() {
                reserved += 1;
            }
        }
        assert_eq!(reserved, 1);
    }

    #[tokio::test]
    async fn test_lock_times_out() {
        let index = AvailabilityIndex::new(Arc::new(FixedRanges::default()), Duration::from_millis(50));
        let listing_id = Uuid::new_v4();

        let _held = index.lock(listing_id).await.unwrap();
        let err = index.reserve(listing_id, range(1, 2)).await.unwrap_err();
        assert!(matches!(err, AvailabilityError::Timeout { .. }));

        // Other listings are unaffected.
        assert!(index.is_available(Uuid::new_v4(), range(1, 2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_reopens_range() {
        let index = AvailabilityIndex::new(Arc::new(FixedRanges::default()), Duration::from_millis(200));
        let listing_id = Uuid::new_v4();

        let token = match index.reserve(listing_id, range(1, 4)).await.unwrap() {
            ReserveOutcome::Reserved(token) => token,
            other => panic!("expected reservation, got {:?}", other),
        };
        assert!(index.release(listing_id, token.id).await.unwrap());
        assert!(!index.release(listing_id, token.id).await.unwrap());
        assert!(index.is_available(listing_id, range(1, 4)).await.unwrap());
    }
}
