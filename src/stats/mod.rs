pub mod export;
pub mod query;
pub mod summary;
pub mod types;

pub use query::{countries, SortOrder, StatsPage, StatsQuery, DEFAULT_PAGE_SIZE};
pub use summary::{DashboardSummary, LastRequest};
pub use types::{PurchaseItem, StatisticRecord, RECURRING_USER};
