pub mod bot;
pub mod config;
pub mod error;
pub mod linker;
pub mod pipeline;
pub mod services;
pub mod sources;
pub mod telegram;
pub mod text;
