pub mod app_state;
pub mod config;
pub mod crypto;
pub mod handlers;
pub mod models;
pub mod server;
pub mod stores;

pub use app_state::AppState;
pub use config::Config;
pub use server::run_server;

#[cfg(test)]
mod test_support;
