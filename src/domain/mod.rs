// Domain layer - the pure aggregation engine and its data model
pub mod aggregation;
pub mod comparison;
pub mod error;
pub mod granularity;
pub mod metric;
pub mod reading;
pub mod selection;
pub mod series;
pub mod statistics;
pub mod time;
pub mod timeline;
