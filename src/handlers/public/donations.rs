use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::id::EntityType;
use crate::models::DonationView;

/// GET /donations/{id} - donor-facing view for the success screen
pub async fn get_donation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DonationView>> {
    if !EntityType::Donation.is_valid_id(&id) {
        return Err(AppError::BadRequest(msg::INVALID_DONATION_ID.into()));
    }

    let conn = state.db.get()?;
    let donation = queries::get_donation_by_id(&conn, &id)?.or_not_found(msg::DONATION_NOT_FOUND)?;

    Ok(Json(DonationView::from(&donation)))
}
