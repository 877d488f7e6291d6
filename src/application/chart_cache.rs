// Bounded memo of finished chart datasets, kept outside the aggregation engine
use crate::application::chart_service::ChartProfile;
use crate::domain::metric::MetricKind;
use crate::domain::time::DateRange;
use crate::domain::timeline::ChartDataset;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// Identifies one aggregation run. The reading count stands in for the
/// fetched data itself: a refetch that returns more rows misses the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartCacheKey {
    pub node_id: i64,
    pub comparison_node_id: Option<i64>,
    pub metric: MetricKind,
    pub profile: ChartProfile,
    pub range: DateRange,
    pub reading_count: usize,
}

#[derive(Default)]
struct CacheEntries {
    datasets: HashMap<ChartCacheKey, Arc<ChartDataset>>,
    insertion_order: VecDeque<ChartCacheKey>,
}

/// Evicts the oldest entry once `capacity` is reached. A capacity of zero
/// disables caching.
pub struct ChartCache {
    capacity: usize,
    entries: Mutex<CacheEntries>,
}

impl ChartCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(CacheEntries::default()),
        }
    }

    pub fn get(&self, key: &ChartCacheKey) -> Option<Arc<ChartDataset>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.datasets.get(key).cloned()
    }

    pub fn insert(&self, key: ChartCacheKey, dataset: Arc<ChartDataset>) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.datasets.insert(key.clone(), dataset).is_some() {
            return;
        }
        entries.insertion_order.push_back(key);
        while entries.insertion_order.len() > self.capacity {
            if let Some(oldest) = entries.insertion_order.pop_front() {
                entries.datasets.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .datasets
            .len()
    }
}
