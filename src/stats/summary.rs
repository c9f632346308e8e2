//! Dashboard headline counters derived from the raw statistics array.

use super::types::StatisticRecord;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// The most recent visit, shown as "<entry> desde <country> (<ip>)".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LastRequest {
    pub entry_time: String,
    pub country: String,
    pub ip: String,
}

impl fmt::Display for LastRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} desde {} ({})", self.entry_time, self.country, self.ip)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_requests: usize,
    pub unique_users: usize,
    pub recurring_users: usize,
    pub last_request: Option<LastRequest>,
}

impl DashboardSummary {
    pub fn from_records(records: &[StatisticRecord]) -> Self {
        let unique_ips: HashSet<&str> = records.iter().map(|r| r.ip.as_str()).collect();
        let last_request = records.last().map(|r| LastRequest {
            entry_time: r.entry_time.clone(),
            country: r.country.clone(),
            ip: r.ip.clone(),
        });

        Self {
            total_requests: records.len(),
            unique_users: unique_ips.len(),
            recurring_users: records.iter().filter(|r| r.is_recurring()).count(),
            last_request,
        }
    }
}
