pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod flow;
pub mod logging;
pub mod observer;
pub mod store;
pub mod webdriver;
