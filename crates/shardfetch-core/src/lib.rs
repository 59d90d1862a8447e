pub mod config;
pub mod logging;

pub mod checksum;
pub mod downloader;
pub mod extract;
pub mod fs_utils;
pub mod monitor;
pub mod retry;
