mod common;
mod listing_tests;
mod search_tests;
