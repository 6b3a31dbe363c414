// libs/pharmacy-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Units credited on restock approval when a medicine has no configured
/// reorder quantity.
pub const DEFAULT_RESTOCK_QUANTITY: i32 = 50;

// ==============================================================================
// MEDICINE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestockEntry {
    pub date: DateTime<Utc>,
    pub quantity: i32,
    pub total_amount: f64,
    pub bill_no: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Restocked,
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Restocked => write!(f, "restocked"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medicine {
    pub id: Uuid,
    pub name: String,
    pub stock: i32,
    pub reorder_level: i32,
    #[serde(default)]
    pub reorder_quantity: Option<i32>,
    #[serde(default)]
    pub supplier_price: Option<f64>,
    #[serde(default)]
    pub restock_history: Vec<RestockEntry>,
    #[serde(default)]
    pub last_restocked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reorder_request: Option<DateTime<Utc>>,
    pub notification_status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Medicine {
    pub fn is_below_reorder_level(&self) -> bool {
        self.stock <= self.reorder_level
    }

    /// Units credited when a restock approval is redeemed.
    pub fn restock_amount(&self) -> i32 {
        self.reorder_quantity.unwrap_or(DEFAULT_RESTOCK_QUANTITY)
    }
}

// ==============================================================================
// REORDER MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Supplier lead time driving the expected delivery date.
    pub fn lead_time_days(&self) -> i64 {
        match self {
            Urgency::High => 2,
            Urgency::Medium => 5,
            Urgency::Low => 7,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Low => write!(f, "low"),
            Urgency::Medium => write!(f, "medium"),
            Urgency::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReorderStatus {
    Pending,
    Approved,
    Completed,
    Cancelled,
}

impl ReorderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReorderStatus::Completed | ReorderStatus::Cancelled)
    }
}

impl fmt::Display for ReorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReorderStatus::Pending => write!(f, "pending"),
            ReorderStatus::Approved => write!(f, "approved"),
            ReorderStatus::Completed => write!(f, "completed"),
            ReorderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderHistoryEntry {
    pub status: String,
    pub date: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub notes: Option<String>,
}

/// A restock request raised when a medicine crosses its reorder threshold.
/// At most one pending request exists per medicine at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub id: Uuid,
    pub medicine_id: Uuid,
    pub quantity: i32,
    pub urgency: Urgency,
    pub status: ReorderStatus,
    pub expected_delivery: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<ReorderHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// ORDER MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub medicine_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderLine>,
    pub total_amount: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMedicineRequest {
    pub name: String,
    pub stock: i32,
    pub reorder_level: i32,
    pub reorder_quantity: Option<i32>,
    pub supplier_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMedicineRequest {
    pub name: Option<String>,
    pub stock: Option<i32>,
    pub reorder_level: Option<i32>,
    pub reorder_quantity: Option<i32>,
    pub supplier_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReorderStatusRequest {
    pub status: ReorderStatus,
    pub notes: Option<String>,
}

/// One line of the low-stock report.
#[derive(Debug, Clone, Serialize)]
pub struct LowStockItem {
    pub medicine: Medicine,
    pub urgency: Urgency,
    pub suggested_quantity: i32,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum PharmacyError {
    #[error("Medicine not found")]
    MedicineNotFound,

    #[error("Reorder request not found")]
    ReorderNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid restock token")]
    InvalidToken,

    #[error("Restock token expired")]
    TokenExpired,

    #[error("Restock token already redeemed")]
    TokenConsumed,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: ReorderStatus,
        to: ReorderStatus,
    },

    #[error("Insufficient stock for {medicine}")]
    InsufficientStock { medicine: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}
