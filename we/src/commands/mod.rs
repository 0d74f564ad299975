mod activities;
pub mod common;
mod curl;
mod deploy;
mod dev;
mod env;
mod generate;
mod link;
mod list;
mod metrics;
mod run;
mod unlink;
