use crate::listing::{Listing, ListingId};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key-value persistence for listings, keyed by id.
///
/// Calls may block; the engine never holds a lock of its own across them.
pub trait ListingStore: Send + Sync {
    /// `Error::NotFound` when the id is unknown.
    fn get(&self, id: ListingId) -> Result<Listing>;

    /// Unknown ids are silently omitted.
    fn get_many(&self, ids: &[ListingId]) -> Result<Vec<Listing>>;

    fn get_all_ids(&self) -> Result<Vec<ListingId>>;

    /// Upsert by id. A single call is all-or-nothing.
    fn put_batch(&self, listings: &[Listing]) -> Result<()>;

    /// Ids whose effective price (price lifted to at least 1) lies in
    /// `[min_price, max_price]`. Stores without a price index may return a superset,
    /// which the default does by returning every id.
    fn candidate_ids(&self, min_price: f64, max_price: f64) -> Result<Vec<ListingId>> {
        let _ = (min_price, max_price);
        self.get_all_ids()
    }
}

impl<S: ListingStore + ?Sized> ListingStore for Arc<S> {
    fn get(&self, id: ListingId) -> Result<Listing> {
        (**self).get(id)
    }

    fn get_many(&self, ids: &[ListingId]) -> Result<Vec<Listing>> {
        (**self).get_many(ids)
    }

    fn get_all_ids(&self) -> Result<Vec<ListingId>> {
        (**self).get_all_ids()
    }

    fn put_batch(&self, listings: &[Listing]) -> Result<()> {
        (**self).put_batch(listings)
    }

    fn candidate_ids(&self, min_price: f64, max_price: f64) -> Result<Vec<ListingId>> {
        (**self).candidate_ids(min_price, max_price)
    }
}

/// In-process store, ordered by id.
#[derive(Debug, Default)]
pub struct MemoryListingStore {
    listings: RwLock<BTreeMap<ListingId, Listing>>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_listings(listings: impl IntoIterator<Item = Listing>) -> Self {
        Self {
            listings: RwLock::new(listings.into_iter().map(|l| (l.id, l)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.listings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.read().is_empty()
    }
}

impl ListingStore for MemoryListingStore {
    fn get(&self, id: ListingId) -> Result<Listing> {
        self.listings
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    fn get_many(&self, ids: &[ListingId]) -> Result<Vec<Listing>> {
        let listings = self.listings.read();
        Ok(ids.iter().filter_map(|id| listings.get(id).cloned()).collect())
    }

    fn get_all_ids(&self) -> Result<Vec<ListingId>> {
        Ok(self.listings.read().keys().copied().collect())
    }

    fn put_batch(&self, listings: &[Listing]) -> Result<()> {
        let mut map = self.listings.write();
        for listing in listings {
            map.insert(listing.id, listing.clone());
        }
        Ok(())
    }

    fn candidate_ids(&self, min_price: f64, max_price: f64) -> Result<Vec<ListingId>> {
        Ok(self
            .listings
            .read()
            .values()
            .filter(|l| {
                let price = l.effective_price();
                // non-finite prices are left for validation to reject
                !price.is_finite() || (price >= min_price && price <= max_price)
            })
            .map(|l| l.id)
            .collect())
    }
}
