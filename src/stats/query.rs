//! Search / filter / sort / pagination pipeline over statistics records.

use super::types::StatisticRecord;
use itertools::Itertools;

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    DateAsc,
    #[default]
    DateDesc,
}

#[derive(Debug, Clone, Default)]
pub struct StatsQuery {
    /// Case-insensitive substring match against ip, country and affiliate
    pub search: Option<String>,
    /// Exact country filter
    pub country: Option<String>,
    pub sort: SortOrder,
    /// 1-based; out-of-range pages clamp to the valid range
    pub page: usize,
    /// 0 falls back to [`DEFAULT_PAGE_SIZE`]
    pub per_page: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsPage {
    pub items: Vec<StatisticRecord>,
    pub page: usize,
    pub total_pages: usize,
    pub total_matched: usize,
}

impl StatsQuery {
    pub fn matches(&self, record: &StatisticRecord) -> bool {
        if let Some(needle) = self.search.as_deref() {
            let needle = needle.to_lowercase();
            if !needle.is_empty() {
                let hit = record.ip.to_lowercase().contains(&needle)
                    || record.country.to_lowercase().contains(&needle)
                    || record.affiliate.to_lowercase().contains(&needle);
                if !hit {
                    return false;
                }
            }
        }
        if let Some(country) = self.country.as_deref() {
            if !country.is_empty() && record.country != country {
                return false;
            }
        }
        true
    }

    /// Filter and date-sort without paginating; the CSV export shares this.
    pub fn filter_and_sort(&self, records: &[StatisticRecord]) -> Vec<StatisticRecord> {
        let mut filtered: Vec<StatisticRecord> = records
            .iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();

        filtered.sort_by_key(|r| r.entry_timestamp_millis());
        if self.sort == SortOrder::DateDesc {
            filtered.reverse();
        }
        filtered
    }

    pub fn run(&self, records: &[StatisticRecord]) -> StatsPage {
        let filtered = self.filter_and_sort(records);
        let per_page = if self.per_page == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.per_page
        };

        let total_matched = filtered.len();
        let total_pages = (total_matched.div_ceil(per_page)).max(1);
        let page = self.page.clamp(1, total_pages);

        let items = filtered
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        StatsPage {
            items,
            page,
            total_pages,
            total_matched,
        }
    }
}

/// Sorted unique country list for the filter dropdown; blanks excluded.
pub fn countries(records: &[StatisticRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.country.as_str())
        .filter(|c| !c.is_empty())
        .unique()
        .sorted()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(ip: &str, entry: &str, country: &str, affiliate: &str) -> StatisticRecord {
        StatisticRecord {
            ip: ip.to_string(),
            entry_time: entry.to_string(),
            country: country.to_string(),
            affiliate: affiliate.to_string(),
            ..Default::default()
        }
    }

    fn dataset() -> Vec<StatisticRecord> {
        vec![
            record("1.1.1.1", "2026-08-01T10:00:00Z", "Cuba", "ACME"),
            record("2.2.2.2", "2026-08-02T10:00:00Z", "España", ""),
            record("3.3.3.3", "2026-08-03T10:00:00Z", "Cuba", "Beta"),
            record("10.0.0.9", "2026-08-04T10:00:00Z", "México", "ACME"),
        ]
    }

    #[test]
    fn search_matches_ip_country_and_affiliate() {
        let q = StatsQuery {
            search: Some("acme".to_string()),
            ..Default::default()
        };
        let page = q.run(&dataset());
        assert_eq!(page.total_matched, 2);
        assert!(page.items.iter().all(|r| r.affiliate == "ACME"));

        let q = StatsQuery {
            search: Some("esPAÑ".to_string()),
            ..Default::default()
        };
        assert_eq!(q.run(&dataset()).total_matched, 1);
    }

    #[test]
    fn country_filter_is_exact() {
        let q = StatsQuery {
            country: Some("Cuba".to_string()),
            ..Default::default()
        };
        let page = q.run(&dataset());
        assert_eq!(page.total_matched, 2);
        assert!(page.items.iter().all(|r| r.country == "Cuba"));
    }

    #[test]
    fn default_sort_is_newest_first() {
        let q = StatsQuery::default();
        let page = q.run(&dataset());
        assert_eq!(page.items[0].ip, "10.0.0.9");
        assert_eq!(page.items.last().unwrap().ip, "1.1.1.1");

        let asc = StatsQuery {
            sort: SortOrder::DateAsc,
            ..Default::default()
        };
        assert_eq!(asc.run(&dataset()).items[0].ip, "1.1.1.1");
    }

    #[test]
    fn pagination_clamps_and_splits() {
        let q = StatsQuery {
            sort: SortOrder::DateAsc,
            per_page: 3,
            page: 2,
            ..Default::default()
        };
        let page = q.run(&dataset());
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].ip, "10.0.0.9");

        // Page far past the end clamps to the last page
        let q = StatsQuery {
            per_page: 3,
            page: 99,
            ..Default::default()
        };
        assert_eq!(q.run(&dataset()).page, 2);

        // Page 0 clamps to 1
        let q = StatsQuery {
            per_page: 3,
            page: 0,
            ..Default::default()
        };
        assert_eq!(q.run(&dataset()).page, 1);
    }

    #[test]
    fn empty_dataset_yields_single_empty_page() {
        let page = StatsQuery::default().run(&[]);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.page, 1);
        assert!(page.items.is_empty());
    }

    #[test]
    fn countries_are_unique_sorted_and_non_empty() {
        let mut data = dataset();
        data.push(record("4.4.4.4", "2026-08-05T10:00:00Z", "", ""));
        assert_eq!(countries(&data), vec!["Cuba", "España", "México"]);
    }
}
