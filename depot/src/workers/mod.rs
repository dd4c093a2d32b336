//! Background workers

pub mod reporter;
