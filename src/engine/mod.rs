pub mod error;
pub mod models;
pub mod bot_strategy;
pub mod simulator;
pub mod completion;
pub mod persona;
pub mod scenarios;
pub mod arena;
pub mod export;
pub mod analysis;
