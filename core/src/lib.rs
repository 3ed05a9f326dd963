pub mod codec;
pub mod coordinator;
pub mod db;
pub mod equipment;
pub mod error;
pub mod models;
pub mod records;
pub mod service;
