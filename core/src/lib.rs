pub mod chat;
pub mod db;
pub mod estimation;
pub mod models;
pub mod picker;
pub mod quota;
pub mod report;
pub mod service;
