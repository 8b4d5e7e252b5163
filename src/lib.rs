// Library exports for Photoshare
// This allows integration tests and external code to use Photoshare modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod photos;
pub mod routes;
pub mod state;
pub mod storage;
pub mod users;
pub mod validation;
pub mod votes;
