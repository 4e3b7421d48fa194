// Uploads images and videos to X and publishes posts that reference them.

pub mod commands;
pub mod config;
pub mod errors;
pub mod publisher;
pub mod security;
pub mod server;
pub mod staging;
pub mod tweet;
pub mod uploader;
