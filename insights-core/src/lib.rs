//! Tenant-scoped insights aggregation engine.
//!
//! Builds one parameterized, staged PostgreSQL query per request, groups the
//! returned rows into per-dimension time series and caches the shaped pages.

pub mod assembler;
pub mod cache;
pub mod error;
pub mod executor;
pub mod filter;
pub mod interval;
pub mod redis_store;
pub mod relation;
pub mod search;
pub mod service;
pub mod shaper;
pub mod sql;
pub mod task_queue;

pub use cache::{CacheSettings, CacheStore, InsightsCache, MemoryCacheStore};
pub use error::InsightsError;
pub use executor::{PgQueryExecutor, QueryExecutor};
pub use filter::{GroupDimension, InsightsFilter, Interval, Metric, OrderMetric, SortOrder};
pub use redis_store::RedisCacheStore;
pub use search::{SearchExpression, SearchField, SearchOperator};
pub use service::{InsightsRequest, InsightsService, QueryPlan};
pub use shaper::{Datapoint, GroupedSeries, InsightsPage};
pub use sql::{SqlParam, SqlQuery};
pub use task_queue::{TaskQueue, TaskQueueConfig};
