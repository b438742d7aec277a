pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod time;

#[cfg(test)]
pub mod test_support;
