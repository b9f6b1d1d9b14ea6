//! Integration tests for the crawl engine

mod common;
mod engine_tests;
mod http_tests;
