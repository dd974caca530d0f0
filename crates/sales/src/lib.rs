//! Dealership sales documents: quotations and minor (counter) sales.
//!
//! This crate contains the business rules for the documents staff save from
//! the showroom floor, implemented purely as deterministic domain logic (no IO,
//! no HTTP, no storage). Delivery is the outbox crate's job.

pub mod minor_sale;
pub mod quotation;

pub use minor_sale::{MinorSale, MinorSaleItem, PaymentMode};
pub use quotation::{Quotation, QuotationSerial};
