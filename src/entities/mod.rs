//! Entity module - Contains the SeaORM entity definitions for the database.
//! The month ledger is a single table: each row holds one month with its
//! serialized snapshot history, close snapshot and optimistic-lock version.

pub mod month;

pub use month::{Column as MonthColumn, Entity as Month, Model as MonthModel};
