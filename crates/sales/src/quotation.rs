use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use motodesk_core::{DomainError, DomainResult, MobileNumber, ValueObject};

const SERIAL_CODE_LEN: usize = 6;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Quotation serial number: `Q-<BRANCH>-<CODE>`, e.g. `Q-BYD-AB12CD`.
///
/// `BRANCH` is the three-letter branch code, `CODE` six uppercase
/// alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QuotationSerial(String);

impl ValueObject for QuotationSerial {}

impl QuotationSerial {
    /// Fresh serial for a branch.
    pub fn generate(branch_code: &str) -> DomainResult<Self> {
        let branch = normalize_branch_code(branch_code)?;
        let code: String = Uuid::new_v4()
            .as_bytes()
            .iter()
            .take(SERIAL_CODE_LEN)
            .map(|b| char::from(ALPHABET[*b as usize % ALPHABET.len()]))
            .collect();
        Ok(Self(format!("Q-{branch}-{code}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn branch_code(&self) -> &str {
        &self.0[2..5]
    }
}

fn normalize_branch_code(code: &str) -> DomainResult<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(DomainError::validation(format!(
            "branch code must be three letters, got {code:?}"
        )));
    }
    Ok(code)
}

impl FromStr for QuotationSerial {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_uppercase();
        let invalid = || DomainError::validation(format!("invalid quotation serial {s:?}"));

        let mut parts = s.split('-');
        let (Some("Q"), Some(branch), Some(code), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        normalize_branch_code(branch).map_err(|_| invalid())?;
        if code.len() != SERIAL_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }
        Ok(Self(s))
    }
}

impl TryFrom<String> for QuotationSerial {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QuotationSerial> for String {
    fn from(value: QuotationSerial) -> Self {
        value.0
    }
}

impl core::fmt::Display for QuotationSerial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A vehicle quotation handed to a walk-in customer.
///
/// Prices are whole rupees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    pub serial_no: QuotationSerial,
    pub branch: String,
    pub customer_name: String,
    pub mobile: MobileNumber,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colour: Option<String>,
    pub ex_showroom_price: u64,
    pub on_road_price: u64,
    pub executive: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Quotation {
    /// Check everything the form must get right before the quotation may be saved.
    pub fn validate(&self) -> DomainResult<()> {
        require_text("customer name", &self.customer_name)?;
        require_text("model", &self.model)?;
        require_text("branch", &self.branch)?;
        require_text("executive", &self.executive)?;

        if self.ex_showroom_price == 0 {
            return Err(DomainError::validation("ex-showroom price must be positive"));
        }
        if self.on_road_price < self.ex_showroom_price {
            return Err(DomainError::validation(format!(
                "on-road price {} is below ex-showroom price {}",
                self.on_road_price, self.ex_showroom_price
            )));
        }
        Ok(())
    }

    /// Registration, insurance and other charges on top of ex-showroom.
    pub fn on_road_charges(&self) -> u64 {
        self.on_road_price.saturating_sub(self.ex_showroom_price)
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(())
}
