pub mod checkpoint;
pub mod config;
pub mod context;
pub mod controller;
pub mod discovery;
pub mod errors;
pub mod gates;
pub mod init;
pub mod journal;
pub mod lock;
pub mod logging;
pub mod model;
pub mod task;
pub mod ui;
pub mod util;
pub mod verify;
