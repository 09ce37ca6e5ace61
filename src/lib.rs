// Library for tests to access modules

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod match_repo;
pub mod models;
pub mod person;
pub mod rollup;
pub mod stats_repo;
