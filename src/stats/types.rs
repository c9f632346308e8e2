//! Wire-format model for the statistics endpoints. Field names on the wire
//! are Spanish; several purchase fields have historical aliases that must
//! keep deserializing.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// `tipo_usuario` value marking a returning visitor.
pub const RECURRING_USER: &str = "Recurrente";

/// One line item inside a visit's `compras` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurchaseItem {
    #[serde(
        rename = "nombre",
        alias = "producto",
        alias = "title",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        rename = "cantidad",
        alias = "quantity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub quantity: Option<u64>,
    #[serde(
        rename = "precio",
        alias = "price",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<f64>,
}

impl PurchaseItem {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Producto")
    }

    pub fn units(&self) -> u64 {
        self.quantity.unwrap_or(1)
    }

    /// Unit price, falling back to the record-level purchase total.
    pub fn unit_price(&self, record_total: f64) -> f64 {
        self.price.unwrap_or(record_total)
    }
}

/// One visit/session entry as returned by the statistics endpoints.
/// Every field is defaulted: the backend has emitted partial records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticRecord {
    #[serde(default)]
    pub ip: String,
    #[serde(rename = "fecha_hora_entrada", default)]
    pub entry_time: String,
    #[serde(rename = "pais", default)]
    pub country: String,
    #[serde(rename = "origen", default)]
    pub origin: String,
    #[serde(rename = "afiliado", default)]
    pub affiliate: String,
    #[serde(rename = "tipo_usuario", default)]
    pub user_type: String,
    #[serde(rename = "compras", default)]
    pub purchases: Vec<PurchaseItem>,
    #[serde(rename = "precio_compra_total", default)]
    pub total_purchase_amount: f64,
    #[serde(
        rename = "tiempo_promedio_pagina",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub avg_time_on_page_secs: Option<f64>,
    #[serde(
        rename = "duracion_sesion_segundos",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub session_duration_secs: Option<f64>,
    #[serde(rename = "navegador", default)]
    pub browser: String,
    #[serde(rename = "sistema_operativo", default)]
    pub operating_system: String,
}

impl StatisticRecord {
    /// A record with at least one purchase is an order candidate.
    pub fn has_purchases(&self) -> bool {
        !self.purchases.is_empty()
    }

    pub fn is_recurring(&self) -> bool {
        self.user_type == RECURRING_USER
    }

    /// Identity used by reconciliation: exact `(ip, entry_time)` pair.
    /// Two visits from the same IP at the same timestamp are indistinguishable.
    pub fn order_key(&self) -> (&str, &str) {
        (&self.ip, &self.entry_time)
    }

    /// Time on page, falling back to the session duration.
    pub fn time_on_page_secs(&self) -> f64 {
        self.avg_time_on_page_secs
            .or(self.session_duration_secs)
            .unwrap_or(0.0)
    }

    /// Parsed entry timestamp. The backend has written both RFC 3339 and
    /// plain `YYYY-MM-DD HH:MM:SS` values over time.
    pub fn entry_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.entry_time)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&self.entry_time, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|n| Utc.from_utc_datetime(&n))
            })
    }

    /// Millisecond timestamp for sorting; unparseable values sort as epoch 0.
    pub fn entry_timestamp_millis(&self) -> i64 {
        self.entry_timestamp()
            .map(|t| t.timestamp_millis())
            .unwrap_or(0)
    }
}
