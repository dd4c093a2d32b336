//! Integration tests for cidepot

mod fixtures;

mod test_blue_green;
mod test_deploy;
mod test_ledger;
mod test_metrics;
