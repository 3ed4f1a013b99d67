use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::status::{
    CopyCondition, CopyStatus, OrderItemStatus, OrderStatus, PayoutTaskStatus,
};

// --- Accounts ---

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, display_name: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            display_name,
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }
}

// --- Catalog ---

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Publisher {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Artist {
    pub id: Uuid,
    pub name: String,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Series {
    pub id: Uuid,
    pub name: String,
    pub publisher_id: Option<Uuid>,
    pub start_year: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Title {
    pub id: Uuid,
    pub name: String,
    pub series_id: Option<Uuid>,
    pub publisher_id: Option<Uuid>,
    pub issue_number: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Artist credit on a title, joined with the artist's name.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TitleCredit {
    pub artist_id: Uuid,
    pub artist_name: String,
    pub role: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ComicCopy {
    pub id: Uuid,
    pub title_id: Uuid,
    pub owner_id: Uuid,
    pub condition: CopyCondition,
    pub notes: Option<String>,
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub status: CopyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A copy joined with its title name, as needed for checkout line items.
#[derive(Debug, Clone, FromRow)]
pub struct ListedCopy {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title_name: String,
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub status: CopyStatus,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Orders ---

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub checkout_session_id: Option<String>,
    #[serde(skip_serializing)]
    pub payment_intent_id: Option<String>,
    pub total_amount: i64,
    pub currency: String,
    pub reference: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub copy_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub title_name: String,
    pub price: i64,
    pub currency: String,
    pub status: OrderItemStatus,
    pub buyer_confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PayoutTask {
    pub id: Uuid,
    pub order_id: Uuid,
    pub seller_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: PayoutTaskStatus,
    pub payment_information: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
