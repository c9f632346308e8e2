//! CSV export of the filtered statistics view. Column set and order match
//! what the dashboard has always produced, with the purchases column
//! JSON-encoded.

use super::query::StatsQuery;
use super::types::StatisticRecord;
use crate::error::Result;
use chrono::Utc;
use std::io;

pub const CSV_HEADERS: [&str; 8] = [
    "fecha_hora_entrada",
    "ip",
    "pais",
    "origen",
    "afiliado",
    "tipo_usuario",
    "precio_compra_total",
    "compras",
];

/// Write the records matching `query` (same filter/sort pipeline as the
/// paginated view) as CSV.
pub fn write_csv<W: io::Write>(
    records: &[StatisticRecord],
    query: &StatsQuery,
    out: W,
) -> Result<usize> {
    let filtered = query.filter_and_sort(records);

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_HEADERS)?;
    for record in &filtered {
        writer.write_record(&[
            record.entry_time.clone(),
            record.ip.clone(),
            record.country.clone(),
            record.origin.clone(),
            record.affiliate.clone(),
            record.user_type.clone(),
            record.total_purchase_amount.to_string(),
            serde_json::to_string(&record.purchases)?,
        ])?;
    }
    writer.flush()?;
    Ok(filtered.len())
}

pub fn export_to_path(
    records: &[StatisticRecord],
    query: &StatsQuery,
    path: &str,
) -> Result<usize> {
    let file = std::fs::File::create(path)?;
    let exported = write_csv(records, query, file)?;
    log::info!("Exported {} statistics rows to {}", exported, path);
    Ok(exported)
}

/// Default export filename, dated like the dashboard download.
pub fn default_export_filename() -> String {
    format!("estadisticas_export_{}.csv", Utc::now().format("%Y-%m-%d"))
}
