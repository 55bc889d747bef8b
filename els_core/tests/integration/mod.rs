mod common;
mod config_loading;
mod properties;
mod sync_scenarios;
