pub mod compress;
pub mod config;
pub mod convert;
pub mod domain;
pub mod download;
pub mod error;
pub mod fs_util;
pub mod mapping;
pub mod pipeline;
pub mod runner;
pub mod toolkit;
