use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use motodesk_core::{DomainError, DomainResult, MobileNumber};

use crate::quotation::require_text;

/// How the counter sale was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Cash,
    Upi,
    Card,
}

/// One line of a minor sale: a spare part or accessory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinorSaleItem {
    pub part_no: String,
    pub description: String,
    pub quantity: u32,
    /// Price in whole rupees.
    pub unit_price: u64,
}

impl MinorSaleItem {
    pub fn line_total(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

/// Over-the-counter sale of parts and accessories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinorSale {
    pub bill_no: String,
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<MobileNumber>,
    pub items: Vec<MinorSaleItem>,
    pub payment_mode: PaymentMode,
    #[serde(default)]
    pub discount: u64,
    pub created_at: DateTime<Utc>,
}

impl MinorSale {
    pub fn validate(&self) -> DomainResult<()> {
        require_text("bill number", &self.bill_no)?;
        require_text("branch", &self.branch)?;

        if self.items.is_empty() {
            return Err(DomainError::validation("a minor sale needs at least one item"));
        }
        for (idx, item) in self.items.iter().enumerate() {
            let line = idx + 1;
            if item.part_no.trim().is_empty() && item.description.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "item {line}: part number or description is required"
                )));
            }
            if item.quantity == 0 {
                return Err(DomainError::validation(format!("item {line}: quantity must be positive")));
            }
            if item.unit_price == 0 {
                return Err(DomainError::validation(format!("item {line}: unit price must be positive")));
            }
        }

        if self.discount > self.gross_total() {
            return Err(DomainError::validation(format!(
                "discount {} exceeds bill amount {}",
                self.discount,
                self.gross_total()
            )));
        }
        Ok(())
    }

    pub fn gross_total(&self) -> u64 {
        self.items
            .iter()
            .map(MinorSaleItem::line_total)
            .fold(0u64, u64::saturating_add)
    }

    /// Amount collected: gross total less discount.
    pub fn total(&self) -> u64 {
        self.gross_total().saturating_sub(self.discount)
    }
}
