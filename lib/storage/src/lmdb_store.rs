// LMDB-backed listing store
use anyhow::Context;
use heed::byteorder::BE;
use heed::types::{Bytes, DecodeIgnore, U64};
use heed::{Database, Env, EnvOpenOptions};
use serde::Deserialize;
use staysim_core::{Error, Listing, ListingId, ListingStore, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const DB_LISTINGS: &str = "listings";
const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024 * 1024; // 10GB

/// Leading fields of an encoded [`Listing`]. bincode reads them off the front of a record
/// and ignores the rest, so `id` and `price` must stay the first two `Listing` fields.
#[derive(Deserialize)]
struct PriceHeader {
    id: ListingId,
    price: f64,
}

/// Listings keyed by big-endian id, so iteration order is ascending id order.
/// Values are bincode-encoded [`Listing`] records.
pub struct LmdbListingStore {
    env: Arc<Env>,
    listings_db: Database<U64<BE>, Bytes>,
}

impl LmdbListingStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size<P: AsRef<Path>>(path: P, map_size: usize) -> Result<Self> {
        let path = path.as_ref();
        Self::open_env(path, map_size).map_err(unavailable)
    }

    fn open_env(path: &Path, map_size: usize) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating {}", path.display()))?;

        let env = Arc::new(unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(4)
                .open(path)?
        });

        let mut wtxn = env.write_txn()?;
        let listings_db = env.create_database(&mut wtxn, Some(DB_LISTINGS))?;
        wtxn.commit()?;

        info!("Opened listing store at {}", path.display());
        Ok(Self { env, listings_db })
    }

    pub fn len(&self) -> Result<u64> {
        let count = || -> anyhow::Result<u64> {
            let rtxn = self.env.read_txn()?;
            Ok(self.listings_db.len(&rtxn)?)
        };
        count().map_err(unavailable)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn get_raw(&self, ids: &[ListingId]) -> anyhow::Result<Vec<(ListingId, Vec<u8>)>> {
        let rtxn = self.env.read_txn()?;
        let mut found = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(bytes) = self.listings_db.get(&rtxn, &id)? {
                found.push((id, bytes.to_vec()));
            }
        }
        Ok(found)
    }

    fn put_raw(&self, records: &[(ListingId, Vec<u8>)]) -> anyhow::Result<()> {
        let mut wtxn = self.env.write_txn()?;
        for (id, bytes) in records {
            self.listings_db.put(&mut wtxn, id, bytes)?;
        }
        wtxn.commit()?;
        Ok(())
    }

    fn ids_in_price_range(&self, min_price: f64, max_price: f64) -> anyhow::Result<Vec<ListingId>> {
        let rtxn = self.env.read_txn()?;
        let mut ids = Vec::new();
        for entry in self.listings_db.iter(&rtxn)? {
            let (_, bytes) = entry?;
            let header: PriceHeader = bincode::deserialize(bytes)?;
            let price = header.price.max(1.0);
            if !price.is_finite() || (price >= min_price && price <= max_price) {
                ids.push(header.id);
            }
        }
        Ok(ids)
    }

    fn ids_raw(&self) -> anyhow::Result<Vec<ListingId>> {
        let rtxn = self.env.read_txn()?;
        let mut ids = Vec::new();
        for entry in self.listings_db.remap_data_type::<DecodeIgnore>().iter(&rtxn)? {
            let (id, ()) = entry?;
            ids.push(id);
        }
        Ok(ids)
    }
}

impl ListingStore for LmdbListingStore {
    fn get(&self, id: ListingId) -> Result<Listing> {
        match self.get_raw(&[id]).map_err(unavailable)?.pop() {
            Some((_, bytes)) => decode(&bytes),
            None => Err(Error::NotFound(id)),
        }
    }

    fn get_many(&self, ids: &[ListingId]) -> Result<Vec<Listing>> {
        self.get_raw(ids)
            .map_err(unavailable)?
            .iter()
            .map(|(_, bytes)| decode(bytes))
            .collect()
    }

    fn get_all_ids(&self) -> Result<Vec<ListingId>> {
        self.ids_raw().map_err(unavailable)
    }

    /// Full key scan that decodes only each record's price.
    fn candidate_ids(&self, min_price: f64, max_price: f64) -> Result<Vec<ListingId>> {
        self.ids_in_price_range(min_price, max_price)
            .map_err(unavailable)
    }

    /// All listings go in one write transaction: either every record lands or none does.
    fn put_batch(&self, listings: &[Listing]) -> Result<()> {
        let records = listings
            .iter()
            .map(|listing| Ok((listing.id, encode(listing)?)))
            .collect::<Result<Vec<_>>>()?;
        self.put_raw(&records).map_err(unavailable)?;
        debug!("Wrote {} listings", records.len());
        Ok(())
    }
}

fn encode(listing: &Listing) -> Result<Vec<u8>> {
    bincode::serialize(listing).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Listing> {
    bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
}

fn unavailable(e: anyhow::Error) -> Error {
    Error::StoreUnavailable(format!("{:#}", e))
}
