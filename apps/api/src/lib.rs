pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod llm_client;
pub mod models;
pub mod parser;
pub mod routes;
pub mod state;
