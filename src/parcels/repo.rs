use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

/// Closed set of parcel lifecycle states. Stored as text; unknown strings are
/// rejected at the API boundary, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParcelStatus {
    Received,
    InTransit,
    InStorage,
    Delivered,
    Returned,
    FailedDelivery,
}

impl ParcelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::InTransit => "IN_TRANSIT",
            Self::InStorage => "IN_STORAGE",
            Self::Delivered => "DELIVERED",
            Self::Returned => "RETURNED",
            Self::FailedDelivery => "FAILED_DELIVERY",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "RECEIVED" => Ok(Self::Received),
            "IN_TRANSIT" => Ok(Self::InTransit),
            "IN_STORAGE" => Ok(Self::InStorage),
            "DELIVERED" => Ok(Self::Delivered),
            "RETURNED" => Ok(Self::Returned),
            "FAILED_DELIVERY" => Ok(Self::FailedDelivery),
            other => Err(AppError::validation(format!(
                "Unknown parcel status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Parcel {
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
    pub received_at: OffsetDateTime,
    pub delivered_at: Option<OffsetDateTime>,
    pub estimated_delivery_at: Option<OffsetDateTime>,
}

/// Fields fixed at insert time; everything mutable goes through `update`.
#[derive(Debug)]
pub struct NewParcel {
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
    pub status: ParcelStatus,
    pub received_at: OffsetDateTime,
    pub estimated_delivery_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Maps an API sort field to a column. Returning the column from a fixed
/// table keeps caller input out of the generated SQL.
pub fn sort_column(field: &str) -> Option<&'static str> {
    Some(match field {
        "id" => "id",
        "sender_name" => "sender_name",
        "recipient_name" => "recipient_name",
        "recipient_email" => "recipient_email",
        "tracking_number" => "tracking_number",
        "origin_city" => "origin_city",
        "destination_city" => "destination_city",
        "shipping_cost" => "shipping_cost",
        "additional_fees" => "additional_fees",
        "total_value" => "total_value",
        "status" => "status",
        "received_at" => "received_at",
        "delivered_at" => "delivered_at",
        "estimated_delivery_at" => "estimated_delivery_at",
        _ => return None,
    })
}

const COLUMNS: &str = "id, sender_name, recipient_name, recipient_email, tracking_number, \
     origin_city, destination_city, shipping_cost, additional_fees, total_value, \
     payment_method, parcel_type, weight_category, image_path, status, \
     received_at, delivered_at, estimated_delivery_at";

pub async fn insert(db: &PgPool, new: &NewParcel) -> Result<Parcel, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO parcels (id, sender_name, recipient_name, recipient_email, tracking_number,
                             origin_city, destination_city, shipping_cost, additional_fees, total_value,
                             payment_method, parcel_type, weight_category, image_path, status,
                             received_at, estimated_delivery_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING {COLUMNS}
        "#
    );
    sqlx::query_as::<_, Parcel>(&sql)
        .bind(Uuid::new_v4())
        .bind(&new.sender_name)
        .bind(&new.recipient_name)
        .bind(&new.recipient_email)
        .bind(&new.tracking_number)
        .bind(&new.origin_city)
        .bind(&new.destination_city)
        .bind(new.shipping_cost)
        .bind(new.additional_fees)
        .bind(new.total_value)
        .bind(&new.payment_method)
        .bind(&new.parcel_type)
        .bind(&new.weight_category)
        .bind(&new.image_path)
        .bind(new.status.as_str())
        .bind(new.received_at)
        .bind(new.estimated_delivery_at)
        .fetch_one(db)
        .await
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<Parcel>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM parcels WHERE id = $1");
    sqlx::query_as::<_, Parcel>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_by_tracking_number(
    db: &PgPool,
    tracking_number: &str,
) -> Result<Option<Parcel>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM parcels WHERE tracking_number = $1");
    sqlx::query_as::<_, Parcel>(&sql)
        .bind(tracking_number)
        .fetch_optional(db)
        .await
}

/// Persists the mutable fields of an already-loaded parcel. `id` and
/// `tracking_number` are never part of the SET list.
pub async fn update(db: &PgPool, parcel: &Parcel) -> Result<Parcel, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE parcels
        SET sender_name = $2, recipient_name = $3, recipient_email = $4,
            status = $5, received_at = $6, delivered_at = $7
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    );
    sqlx::query_as::<_, Parcel>(&sql)
        .bind(parcel.id)
        .bind(&parcel.sender_name)
        .bind(&parcel.recipient_name)
        .bind(&parcel.recipient_email)
        .bind(&parcel.status)
        .bind(parcel.received_at)
        .bind(parcel.delivered_at)
        .fetch_one(db)
        .await
}

/// Returns the number of rows removed (0 when the id is unknown).
pub async fn delete_by_id(db: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM parcels WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count(db: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM parcels")
        .fetch_one(db)
        .await
}

pub async fn count_by_status(db: &PgPool, status: ParcelStatus) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM parcels WHERE status = $1")
        .bind(status.as_str())
        .fetch_one(db)
        .await
}

pub async fn find_page(
    db: &PgPool,
    sort_col: &'static str,
    sort_dir: SortDir,
    limit: i64,
    offset: i64,
) -> Result<Vec<Parcel>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM parcels ORDER BY {} {} LIMIT $1 OFFSET $2",
        sort_col,
        sort_dir.as_sql()
    );
    sqlx::query_as::<_, Parcel>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
}

pub async fn find_page_by_status(
    db: &PgPool,
    status: ParcelStatus,
    limit: i64,
    offset: i64,
) -> Result<Vec<Parcel>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM parcels WHERE status = $1 ORDER BY received_at DESC LIMIT $2 OFFSET $3"
    );
    sqlx::query_as::<_, Parcel>(&sql)
        .bind(status.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
}
