// Read-through memoization of listing store lookups for online queries
use crate::listing::{Listing, ListingId};
use crate::store::ListingStore;
use crate::Result;
use ahash::AHashMap;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Listings keyed by id, shared as `Arc` so hits and misses hand out the same data.
///
/// Lookups go to a sharded map; store calls happen with no shard locked, and results are
/// inserted only if absent, so concurrent queries filling the same entry agree on it.
#[derive(Debug, Default)]
pub struct ListingCache {
    entries: DashMap<ListingId, Arc<Listing>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ListingCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[inline]
    fn lookup(&self, id: ListingId) -> Option<Arc<Listing>> {
        self.entries.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn insert_if_absent(&self, listing: Listing) -> Arc<Listing> {
        let id = listing.id;
        Arc::clone(self.entries.entry(id).or_insert_with(|| Arc::new(listing)).value())
    }

    pub fn get_through<S: ListingStore + ?Sized>(&self, store: &S, id: ListingId) -> Result<Arc<Listing>> {
        if let Some(hit) = self.lookup(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let listing = store.get(id)?;
        Ok(self.insert_if_absent(listing))
    }

    /// Same contract as `ListingStore::get_many`: request order, unknown ids omitted.
    pub fn get_many_through<S: ListingStore + ?Sized>(
        &self,
        store: &S,
        ids: &[ListingId],
    ) -> Result<Vec<Arc<Listing>>> {
        let mut found: Vec<Option<Arc<Listing>>> = ids.iter().map(|id| self.lookup(*id)).collect();
        let missing: Vec<ListingId> = ids
            .iter()
            .zip(&found)
            .filter(|(_, hit)| hit.is_none())
            .map(|(id, _)| *id)
            .collect();
        self.hits.fetch_add((ids.len() - missing.len()) as u64, Ordering::Relaxed);
        self.misses.fetch_add(missing.len() as u64, Ordering::Relaxed);

        if !missing.is_empty() {
            let fetched: AHashMap<ListingId, Arc<Listing>> = store
                .get_many(&missing)?
                .into_iter()
                .map(|listing| (listing.id, self.insert_if_absent(listing)))
                .collect();
            for (slot, id) in found.iter_mut().zip(ids) {
                if slot.is_none() {
                    *slot = fetched.get(id).cloned();
                }
            }
        }

        Ok(found.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryListingStore;
    use std::sync::atomic::AtomicUsize;

    /// Counts store round trips.
    struct CountingStore {
        inner: MemoryListingStore,
        calls: AtomicUsize,
    }

    impl ListingStore for CountingStore {
        fn get(&self, id: ListingId) -> Result<Listing> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(id)
        }
        fn get_many(&self, ids: &[ListingId]) -> Result<Vec<Listing>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_many(ids)
        }
        fn get_all_ids(&self) -> Result<Vec<ListingId>> {
            self.inner.get_all_ids()
        }
        fn put_batch(&self, listings: &[Listing]) -> Result<()> {
            self.inner.put_batch(listings)
        }
    }

    fn store() -> CountingStore {
        CountingStore {
            inner: MemoryListingStore::from_listings(
                (1..=4).map(|i| Listing::new(i, 50.0 * i as f64, "Queens", "Ridgewood", 40.7, -73.9)),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_hit_equals_miss() {
        let store = store();
        let cache = ListingCache::new();
        let miss = cache.get_through(&store, 2).unwrap();
        let hit = cache.get_through(&store, 2).unwrap();
        assert_eq!(*miss, *hit);
        assert_eq!(*hit, store.inner.get(2).unwrap());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn test_get_many_through_keeps_order_and_skips_unknown() {
        let store = store();
        let cache = ListingCache::new();
        cache.get_through(&store, 3).unwrap();

        let got: Vec<_> = cache
            .get_many_through(&store, &[4, 9, 3, 1])
            .unwrap()
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(got, vec![4, 3, 1]);
        assert_eq!(cache.len(), 3);

        store.calls.store(0, Ordering::SeqCst);
        cache.get_many_through(&store, &[1, 3, 4]).unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_not_found_is_not_cached() {
        let store = store();
        let cache = ListingCache::new();
        assert!(cache.get_through(&store, 42).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_population() {
        let store = Arc::new(store());
        let cache = Arc::new(ListingCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_many_through(store.as_ref(), &[1, 2, 3, 4]).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), 4);
        }
        assert_eq!(cache.len(), 4);
    }
}
