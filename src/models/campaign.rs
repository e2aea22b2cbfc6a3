use serde::Serialize;

use crate::payments::format_cents;

#[derive(Debug, Clone, Serialize)]
pub struct Campaign {
    pub id: String,
    pub parish_id: String,
    pub title: String,
    pub goal_cents: i64,
    /// Running total of paid donations, kept in step with status changes.
    pub current_cents: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Campaign {
    pub fn current_amount(&self) -> String {
        format_cents(self.current_cents)
    }
}

#[derive(Debug, Clone)]
pub struct CreateCampaign {
    pub parish_id: String,
    pub title: String,
    pub goal_cents: i64,
}
