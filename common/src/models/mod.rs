pub mod activity;
pub mod error;
pub mod event;
pub mod project;
pub mod service;
