//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence so route handlers stay
//! focused on request parsing, auth and status mapping.

pub mod availability;
pub mod catalog;
pub mod checkout;
pub mod constraint;
pub mod customer_type;
pub mod payment;
pub mod session;
pub mod station;
pub mod working_hours;
