pub mod extractor;
pub mod jwt;
pub mod models;
pub mod password;
pub mod routes;
pub mod service;
