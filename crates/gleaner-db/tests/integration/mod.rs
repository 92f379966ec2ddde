mod common;
mod record_tests;
mod target_tests;
