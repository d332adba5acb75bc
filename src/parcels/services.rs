use rust_decimal::Decimal;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{is_unique_violation, AppError};
use crate::parcels::dto::{CreateParcelRequest, Page, UpdateParcelRequest};
use crate::parcels::repo::{self, NewParcel, Parcel, ParcelStatus, SortDir};

/// `PM` + the first 8 hex chars of a v4 UUID, upper-cased. Collisions are
/// not checked here; the unique index on tracking_number is the backstop.
pub(crate) fn generate_tracking_number() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("PM{}", id[..8].to_uppercase())
}

fn require_non_negative(name: &str, value: Option<Decimal>) -> Result<(), AppError> {
    if let Some(v) = value {
        if v < Decimal::ZERO {
            return Err(AppError::validation(format!(
                "{} must not be negative",
                name
            )));
        }
    }
    Ok(())
}

fn validate_draft(req: &CreateParcelRequest) -> Result<String, AppError> {
    let recipient_name = req
        .recipient_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("recipient_name is required"))?;
    require_non_negative("shipping_cost", req.shipping_cost)?;
    require_non_negative("additional_fees", req.additional_fees)?;
    require_non_negative("total_value", req.total_value)?;
    Ok(recipient_name.to_string())
}

/// Decides what a tracking-number collision on insert means: a
/// caller-supplied number is a hard conflict, a generated one is retried
/// with a fresh number while retries remain, and a second collision
/// exhausts the single retry.
fn next_tracking_attempt(
    caller_supplied: bool,
    retries_left: u8,
    current: &str,
) -> Result<String, AppError> {
    if caller_supplied {
        Err(AppError::Conflict(format!(
            "Tracking number already in use: {}",
            current
        )))
    } else if retries_left == 0 {
        Err(AppError::Conflict(
            "Could not allocate a unique tracking number".into(),
        ))
    } else {
        Ok(generate_tracking_number())
    }
}

pub async fn create_parcel(db: &PgPool, req: CreateParcelRequest) -> Result<Parcel, AppError> {
    let recipient_name = validate_draft(&req)?;

    let supplied = req
        .tracking_number
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    let caller_supplied_tracking = supplied.is_some();
    let tracking_number = supplied.unwrap_or_else(generate_tracking_number);

    let mut new = NewParcel {
        sender_name: req.sender_name,
        recipient_name,
        recipient_email: req.recipient_email,
        tracking_number,
        origin_city: req.origin_city,
        destination_city: req.destination_city,
        shipping_cost: req.shipping_cost,
        additional_fees: req.additional_fees,
        total_value: req.total_value,
        payment_method: req.payment_method,
        parcel_type: req.parcel_type,
        weight_category: req.weight_category,
        image_path: req.image_path,
        // Caller-supplied status is ignored: every parcel starts RECEIVED.
        status: ParcelStatus::Received,
        received_at: req.received_at.unwrap_or_else(OffsetDateTime::now_utc),
        estimated_delivery_at: req.estimated_delivery_at,
    };

    let mut retries_left: u8 = 1;
    loop {
        match repo::insert(db, &new).await {
            Ok(parcel) => {
                info!(parcel_id = %parcel.id, tracking_number = %parcel.tracking_number,
                    recipient = %parcel.recipient_name, "parcel created");
                return Ok(parcel);
            }
            Err(e) if is_unique_violation(&e) => {
                debug!(tracking_number = %new.tracking_number, "tracking number collision");
                new.tracking_number = next_tracking_attempt(
                    caller_supplied_tracking,
                    retries_left,
                    &new.tracking_number,
                )?;
                retries_left -= 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Copies the caller-supplied mutable fields onto an existing parcel.
/// `id` and `tracking_number` in the patch are ignored by construction.
fn apply_patch(
    parcel: &mut Parcel,
    patch: UpdateParcelRequest,
    now: OffsetDateTime,
) -> Result<(), AppError> {
    if let Some(sender_name) = patch.sender_name {
        parcel.sender_name = Some(sender_name);
    }
    if let Some(recipient_name) = patch.recipient_name {
        parcel.recipient_name = recipient_name;
    }
    if let Some(recipient_email) = patch.recipient_email {
        parcel.recipient_email = Some(recipient_email);
    }
    if let Some(received_at) = patch.received_at {
        parcel.received_at = received_at;
    }
    if let Some(delivered_at) = patch.delivered_at {
        parcel.delivered_at = Some(delivered_at);
    }
    if let Some(status) = patch.status {
        let status = ParcelStatus::parse(&status)?;
        parcel.status = status.as_str().to_string();
        // Delivery through the free-form path still stamps the timestamp.
        if status == ParcelStatus::Delivered && parcel.delivered_at.is_none() {
            parcel.delivered_at = Some(now);
        }
    }
    Ok(())
}

/// Free-form update used for administrative correction. Deliberately applies
/// no transition guard; the guarded path is `confirm_delivery`.
pub async fn update_parcel(
    db: &PgPool,
    id: Uuid,
    patch: UpdateParcelRequest,
) -> Result<Parcel, AppError> {
    let mut parcel = repo::find_by_id(db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Parcel not found with id: {}", id)))?;

    apply_patch(&mut parcel, patch, OffsetDateTime::now_utc())?;

    let updated = repo::update(db, &parcel).await?;
    info!(parcel_id = %updated.id, status = %updated.status, "parcel updated");
    Ok(updated)
}

fn check_delivery_transition(status: &str) -> Result<(), AppError> {
    if status == ParcelStatus::Delivered.as_str() {
        return Err(AppError::InvalidState(
            "Parcel is already delivered".into(),
        ));
    }
    if status != ParcelStatus::InTransit.as_str() {
        return Err(AppError::InvalidState(format!(
            "Parcel must be in transit to be marked as delivered. Current status: {}",
            status
        )));
    }
    Ok(())
}

/// Courier-facing delivery confirmation: the only transition this path allows
/// is IN_TRANSIT -> DELIVERED.
pub async fn confirm_delivery(db: &PgPool, id: Uuid) -> Result<Parcel, AppError> {
    let mut parcel = repo::find_by_id(db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Parcel not found with id: {}", id)))?;

    check_delivery_transition(&parcel.status)?;

    parcel.status = ParcelStatus::Delivered.as_str().to_string();
    parcel.delivered_at = Some(OffsetDateTime::now_utc());

    let updated = repo::update(db, &parcel).await?;
    info!(parcel_id = %updated.id, tracking_number = %updated.tracking_number, "parcel delivered");
    Ok(updated)
}

pub async fn get_parcel(db: &PgPool, id: Uuid) -> Result<Parcel, AppError> {
    repo::find_by_id(db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Parcel not found with id: {}", id)))
}

pub async fn get_by_tracking_number(db: &PgPool, number: &str) -> Result<Parcel, AppError> {
    repo::find_by_tracking_number(db, number)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("Parcel not found with tracking number: {}", number))
        })
}

pub async fn delete_parcel(db: &PgPool, id: Uuid) -> Result<(), AppError> {
    let removed = repo::delete_by_id(db, id).await?;
    if removed == 0 {
        return Err(AppError::not_found(format!(
            "Parcel not found with id: {}",
            id
        )));
    }
    info!(parcel_id = %id, "parcel deleted");
    Ok(())
}

fn validate_paging(page: i64, size: i64) -> Result<(), AppError> {
    if page < 0 {
        return Err(AppError::validation("page must not be negative"));
    }
    if size < 1 {
        return Err(AppError::validation("size must be at least 1"));
    }
    Ok(())
}

/// Row offset for a zero-based page, or `None` when `page * size` exceeds
/// `i64`. Such a page is past the end of any result set, which the
/// pagination contract answers with an empty page rather than an error.
fn page_offset(page: i64, size: i64) -> Option<i64> {
    page.checked_mul(size)
}

pub async fn list_parcels(
    db: &PgPool,
    page: i64,
    size: i64,
    sort_by: &str,
    sort_dir: &str,
) -> Result<Page<Parcel>, AppError> {
    validate_paging(page, size)?;
    let sort_col = repo::sort_column(sort_by)
        .ok_or_else(|| AppError::validation(format!("Unknown sort field: {}", sort_by)))?;
    let dir = SortDir::parse(sort_dir);

    let total = repo::count(db).await?;
    // An out-of-range page yields an empty slice, not an error.
    let rows = match page_offset(page, size) {
        Some(offset) => repo::find_page(db, sort_col, dir, size, offset).await?,
        None => Vec::new(),
    };
    debug!(page, size, total, "parcel page fetched");
    Ok(Page::new(rows, page, size, total))
}

pub async fn list_parcels_by_status(
    db: &PgPool,
    status: &str,
    page: i64,
    size: i64,
) -> Result<Page<Parcel>, AppError> {
    validate_paging(page, size)?;
    let status = ParcelStatus::parse(status)?;

    let total = repo::count_by_status(db, status).await?;
    let rows = match page_offset(page, size) {
        Some(offset) => repo::find_page_by_status(db, status, size, offset).await?,
        None => Vec::new(),
    };
    Ok(Page::new(rows, page, size, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn draft(recipient: Option<&str>) -> CreateParcelRequest {
        CreateParcelRequest {
            sender_name: None,
            recipient_name: recipient.map(String::from),
            recipient_email: None,
            tracking_number: None,
            origin_city: None,
            destination_city: None,
            shipping_cost: None,
            additional_fees: None,
            total_value: None,
            payment_method: None,
            parcel_type: None,
            weight_category: None,
            image_path: None,
            status: None,
            received_at: None,
            estimated_delivery_at: None,
        }
    }

    fn parcel(status: ParcelStatus) -> Parcel {
        let now = OffsetDateTime::now_utc();
        Parcel {
            id: Uuid::new_v4(),
            sender_name: Some("Depot West".into()),
            recipient_name: "Asha".into(),
            recipient_email: None,
            tracking_number: "PM1A2B3C4D".into(),
            origin_city: None,
            destination_city: None,
            shipping_cost: None,
            additional_fees: None,
            total_value: None,
            payment_method: None,
            parcel_type: None,
            weight_category: None,
            image_path: None,
            status: status.as_str().to_string(),
            received_at: now - Duration::hours(2),
            delivered_at: None,
            estimated_delivery_at: None,
        }
    }

    #[test]
    fn tracking_numbers_match_the_published_shape() {
        for _ in 0..100 {
            let t = generate_tracking_number();
            assert_eq!(t.len(), 10);
            assert!(t.starts_with("PM"));
            assert!(t[2..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn tracking_numbers_are_not_repeated_in_practice() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_tracking_number()));
        }
    }

    #[test]
    fn draft_requires_a_recipient_name() {
        assert!(matches!(
            validate_draft(&draft(None)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_draft(&draft(Some("   "))),
            Err(AppError::Validation(_))
        ));
        assert_eq!(validate_draft(&draft(Some(" Asha "))).unwrap(), "Asha");
    }

    #[test]
    fn draft_rejects_negative_money() {
        let mut req = draft(Some("Asha"));
        req.shipping_cost = Some(Decimal::new(-250, 2));
        assert!(matches!(
            validate_draft(&req),
            Err(AppError::Validation(_))
        ));

        let mut req = draft(Some("Asha"));
        req.total_value = Some(Decimal::ZERO);
        assert!(validate_draft(&req).is_ok());
    }

    #[test]
    fn patch_never_touches_id_or_tracking_number() {
        let mut p = parcel(ParcelStatus::Received);
        let original_id = p.id;
        let patch = UpdateParcelRequest {
            id: Some(Uuid::new_v4()),
            tracking_number: Some("PMXXXXXXXX".into()),
            sender_name: Some("Depot East".into()),
            ..Default::default()
        };
        apply_patch(&mut p, patch, OffsetDateTime::now_utc()).unwrap();
        assert_eq!(p.id, original_id);
        assert_eq!(p.tracking_number, "PM1A2B3C4D");
        assert_eq!(p.sender_name.as_deref(), Some("Depot East"));
    }

    #[test]
    fn patch_defaults_delivered_at_when_status_becomes_delivered() {
        let mut p = parcel(ParcelStatus::InTransit);
        let now = OffsetDateTime::now_utc();
        let patch = UpdateParcelRequest {
            status: Some("DELIVERED".into()),
            ..Default::default()
        };
        apply_patch(&mut p, patch, now).unwrap();
        assert_eq!(p.status, "DELIVERED");
        assert_eq!(p.delivered_at, Some(now));
        assert!(p.delivered_at.unwrap() >= p.received_at);
    }

    #[test]
    fn patch_keeps_an_explicit_delivered_at() {
        let mut p = parcel(ParcelStatus::InTransit);
        let explicit = OffsetDateTime::now_utc() - Duration::minutes(30);
        let patch = UpdateParcelRequest {
            status: Some("DELIVERED".into()),
            delivered_at: Some(explicit),
            ..Default::default()
        };
        apply_patch(&mut p, patch, OffsetDateTime::now_utc()).unwrap();
        assert_eq!(p.delivered_at, Some(explicit));
    }

    #[test]
    fn patch_allows_free_status_edits() {
        // Administrative corrections are unguarded by design, even backwards.
        let mut p = parcel(ParcelStatus::Delivered);
        p.delivered_at = Some(OffsetDateTime::now_utc());
        let patch = UpdateParcelRequest {
            status: Some("RECEIVED".into()),
            ..Default::default()
        };
        apply_patch(&mut p, patch, OffsetDateTime::now_utc()).unwrap();
        assert_eq!(p.status, "RECEIVED");
    }

    #[test]
    fn patch_rejects_unknown_status() {
        let mut p = parcel(ParcelStatus::Received);
        let patch = UpdateParcelRequest {
            status: Some("LOST_IN_SPACE".into()),
            ..Default::default()
        };
        let err = apply_patch(&mut p, patch, OffsetDateTime::now_utc()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        // a failed patch leaves the row untouched
        assert_eq!(p.status, "RECEIVED");
    }

    #[test]
    fn delivery_confirmation_requires_in_transit() {
        let err = check_delivery_transition("DELIVERED").unwrap_err();
        assert!(err.to_string().contains("already delivered"));

        for status in ["RECEIVED", "IN_STORAGE", "RETURNED", "FAILED_DELIVERY"] {
            let err = check_delivery_transition(status).unwrap_err();
            assert!(matches!(err, AppError::InvalidState(_)));
            assert!(err.to_string().contains("must be in transit"));
        }

        assert!(check_delivery_transition("IN_TRANSIT").is_ok());
    }

    #[test]
    fn supplied_tracking_collision_is_a_hard_conflict() {
        let err = next_tracking_attempt(true, 1, "PMCUSTOM01").unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(err.to_string().contains("PMCUSTOM01"));
    }

    #[test]
    fn generated_tracking_collision_is_retried_with_a_fresh_number() {
        let next = next_tracking_attempt(false, 1, "PM1A2B3C4D").unwrap();
        assert!(next.starts_with("PM"));
        assert_eq!(next.len(), 10);
    }

    #[test]
    fn second_generated_collision_exhausts_the_retry() {
        let err = next_tracking_attempt(false, 0, "PM1A2B3C4D").unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(err.to_string().contains("unique tracking number"));
    }

    #[test]
    fn huge_page_numbers_mean_an_empty_page_not_an_overflow() {
        assert_eq!(page_offset(0, 5), Some(0));
        assert_eq!(page_offset(5, 10), Some(50));
        // i64::MAX * 10 has no representable offset; the caller returns an
        // empty page instead of querying.
        assert_eq!(page_offset(i64::MAX, 10), None);
        assert_eq!(page_offset(i64::MAX / 2, 3), None);
    }

    #[test]
    fn paging_bounds_are_validated() {
        assert!(validate_paging(0, 1).is_ok());
        assert!(validate_paging(5, 10).is_ok());
        assert!(matches!(
            validate_paging(-1, 10),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_paging(0, 0),
            Err(AppError::Validation(_))
        ));
    }
}
