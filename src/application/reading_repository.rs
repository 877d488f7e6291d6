// Repository trait for raw readings and the reference catalog
use crate::domain::reading::{Catalog, Reading};
use crate::domain::time::LocalWindow;
use async_trait::async_trait;

#[async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Raw readings of one node inside a local wall-clock window, at most `limit` rows
    async fn fetch_readings(
        &self,
        node_id: i64,
        window: &LocalWindow,
        limit: usize,
    ) -> anyhow::Result<Vec<Reading>>;

    /// Sensor, type, metric and location tables used for labelling
    async fn fetch_catalog(&self) -> anyhow::Result<Catalog>;
}
