use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::parcels::repo::Parcel;

#[derive(Debug, Deserialize)]
pub struct CreateParcelRequest {
    pub sender_name: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    /// Optional; generated when absent.
    pub tracking_number: Option<String>,
    pub origin_city: Option<String>,
    pub destination_city: Option<String>,
    pub shipping_cost: Option<Decimal>,
    pub additional_fees: Option<Decimal>,
    pub total_value: Option<Decimal>,
    pub payment_method: Option<String>,
    pub parcel_type: Option<String>,
    pub weight_category: Option<String>,
    pub image_path: Option<String>,
    /// Accepted for wire compatibility, ignored: new parcels always start as
    /// RECEIVED.
    #[allow(dead_code)]
    pub status: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub received_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub estimated_delivery_at: Option<OffsetDateTime>,
}

/// Patch body for PUT /parcels/:id. Absent fields are left untouched;
/// `id` and `tracking_number` are accepted but ignored.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateParcelRequest {
    #[allow(dead_code)]
    pub id: Option<Uuid>,
    #[allow(dead_code)]
    pub tracking_number: Option<String>,
    pub sender_name: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub status: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub received_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub delivered_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct ParcelResponse {
    pub id: Uuid,
    pub sender_name: Option<String>,
    pub recipient_name: String,
    pub recipient_email: Option<String>,
    pub tracking_number: String,
    pub origin_city: Option<String>,
    pub destination_city: Option<String>,
    pub shipping_cost: Option<Decimal>,
    pub additional_fees: Option<Decimal>,
    pub total_value: Option<Decimal>,
    pub payment_method: Option<String>,
    pub parcel_type: Option<String>,
    pub weight_category: Option<String>,
    pub image_path: Option<String>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub delivered_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub estimated_delivery_at: Option<OffsetDateTime>,
}

impl From<Parcel> for ParcelResponse {
    fn from(p: Parcel) -> Self {
        Self {
            id: p.id,
            sender_name: p.sender_name,
            recipient_name: p.recipient_name,
            recipient_email: p.recipient_email,
            tracking_number: p.tracking_number,
            origin_city: p.origin_city,
            destination_city: p.destination_city,
            shipping_cost: p.shipping_cost,
            additional_fees: p.additional_fees,
            total_value: p.total_value,
            payment_method: p.payment_method,
            parcel_type: p.parcel_type,
            weight_category: p.weight_category,
            image_path: p.image_path,
            status: p.status,
            received_at: p.received_at,
            delivered_at: p.delivered_at,
            estimated_delivery_at: p.estimated_delivery_at,
        }
    }
}

/// One slice of an ordered result set plus enough metadata to page through it.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, page: i64, size: i64, total_elements: i64) -> Self {
        let total_pages = if size > 0 {
            (total_elements + size - 1) / size
        } else {
            0
        };
        Self {
            content,
            page,
            size,
            total_elements,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_sort_dir")]
    pub sort_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusFilterQuery {
    pub status: String,
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

#[derive(Debug, Deserialize)]
pub struct TrackingQuery {
    pub number: String,
}

fn default_page_size() -> i64 {
    5
}

fn default_sort_by() -> String {
    "received_at".into()
}

fn default_sort_dir() -> String {
    "desc".into()
}
