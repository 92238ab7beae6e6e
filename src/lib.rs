extern crate bytes;
#[macro_use]
extern crate async_trait;

pub mod gateway_error;
pub mod config;
pub mod listener;
pub mod logging;

pub mod scgi {
    pub mod defs;
    pub mod decode;
    pub mod encode;
    pub mod input;
    pub mod request;
    pub mod environment;
    pub mod executor;
    pub mod output;
    pub mod error_reply;
    pub mod connection;
}
