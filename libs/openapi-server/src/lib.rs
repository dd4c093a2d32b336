//! OpenAPI server models for the cidepot status API

pub mod models;
