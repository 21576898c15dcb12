// GoPiGo runtime: text commands in, controller board frames out

pub mod command;
pub mod config;
pub mod device;
pub mod http;
pub mod logging;
pub mod messages;
pub mod runtime;
