pub mod app_paths;
pub mod config;
pub mod db;
pub mod project_settings;
