//! Facade (C10): orchestrates the store and the query pipeline for the
//! four operations the HTTP layer calls — add, remove, list, query.
//!
//! Per-id mutual exclusion is modeled the way the teacher shares a lock
//! map for session state: a `DashMap<String, Arc<RwLock<()>>>` handed out
//! per dataset id. Add/remove take the write guard; list/query take the
//! read guard scoped to the one id a request touches.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock as AsyncRwLock;

use crate::error::Error;
use crate::ingest::geocode::Geocoder;
use crate::ingest::{rooms, sections};
use crate::model::{self, Dataset, DatasetKind, Row};
use crate::query::project::{self, Source};
use crate::query::transform;
use crate::query::validate::{self, Query};
use crate::store::Store;

pub struct Facade {
    store: Store,
    geocoder: Geocoder,
    locks: DashMap<String, Arc<AsyncRwLock<()>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub id: String,
    pub kind: &'static str,
    #[serde(rename = "numRows")]
    pub num_rows: usize,
}

impl Facade {
    pub fn new(store: Store, geocoder: Geocoder) -> Self {
        Facade { store, geocoder, locks: DashMap::new() }
    }

    fn lock_for(&self, id: &str) -> Arc<AsyncRwLock<()>> {
        self.locks.entry(id.to_string()).or_insert_with(|| Arc::new(AsyncRwLock::new(()))).clone()
    }

    /// Validates `id`, asserts non-existence, dispatches to the matching
    /// ingester, saves the result, and returns the sorted list of ids now
    /// in the store. On ingest failure the store is left untouched.
    pub async fn add_dataset(&self, id: &str, kind: DatasetKind, payload_base64: &str) -> Result<Vec<String>, Error> {
        model::validate_id(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.write().await;

        if self.store.exists(id) {
            return Err(Error::InvalidContent(format!("dataset '{id}' already exists")));
        }

        let store = self.store.clone();
        let geocoder_base = self.geocoder.base_url().to_string();
        let id_owned = id.to_string();
        let payload = payload_base64.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), Error> {
            let rows: Vec<Row> = match kind {
                DatasetKind::Sections => sections::ingest(&payload)?,
                DatasetKind::Rooms => {
                    let geocoder = Geocoder::new(geocoder_base);
                    rooms::ingest(&payload, &geocoder)?
                }
            };
            let dataset = Dataset::new(id_owned, kind, rows)?;
            store.save(&dataset)
        })
        .await
        .map_err(|e| Error::Internal(format!("ingest task panicked: {e}")))??;

        self.list_ids_sorted()
    }

    pub async fn remove_dataset(&self, id: &str) -> Result<String, Error> {
        model::validate_id(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.write().await;
        self.store.delete(id)?;
        Ok(id.to_string())
    }

    /// Enumerates the store, then loads each id under its own read guard so
    /// a `remove_dataset` racing between the enumeration and the load can
    /// only ever make a dataset vanish from the result, never fail the
    /// whole call — a transient `NotFound` here means "removed after we
    /// listed it", not a real error.
    pub async fn list_datasets(&self) -> Result<Vec<DatasetSummary>, Error> {
        let ids = self.store.list_ids()?;
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let lock = self.lock_for(&id);
            let _guard = lock.read().await;
            match self.store.load(&id) {
                Ok(dataset) => summaries.push(DatasetSummary {
                    id: dataset.id,
                    kind: dataset.kind.as_str(),
                    num_rows: dataset.rows.len(),
                }),
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(summaries)
    }

    pub async fn perform_query(&self, query_json: &Value) -> Result<Vec<Value>, Error> {
        let dataset_id = validate::resolve_dataset_id(query_json)
            .map_err(|_| Error::InvalidQuery("query does not reference exactly one dataset".into()))?;

        let lock = self.lock_for(&dataset_id);
        let _guard = lock.read().await;

        let store = self.store.clone();
        let query_json = query_json.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<Value>, Error> {
            let dataset =
                store.load(&dataset_id).map_err(|_| Error::InvalidQuery(format!("no such dataset '{dataset_id}'")))?;

            let query: Query = Query::parse(&query_json, &dataset_id, dataset.kind)?;

            let filtered: Vec<Row> = dataset
                .rows
                .into_iter()
                .filter(|row| crate::query::filter::evaluate(&query.where_node, row))
                .collect();

            match &query.transform {
                Some(t) => {
                    let grouped = transform::apply(t, &filtered)?;
                    project::finish(Source::Grouped(&grouped), &query.columns, &query.order)
                }
                None => project::finish(Source::Rows(&filtered), &query.columns, &query.order),
            }
        })
        .await
        .map_err(|e| Error::Internal(format!("query task panicked: {e}")))?
    }

    fn list_ids_sorted(&self) -> Result<Vec<String>, Error> {
        let mut ids = self.store.list_ids()?;
        ids.sort();
        Ok(ids)
    }
}
