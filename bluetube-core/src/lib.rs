#![doc = "bluetube-core: playlist processing and delivery pipeline."]

//! Everything that decides *what* happens lives here: the playlist store, the
//! profile resolver, feed parsing, selection, fan-out and the
//! download → convert → deliver driver. Terminal, network and process access
//! are reached only through the traits in [`contract`].

pub mod cache;
pub mod config;
pub mod contract;
pub mod convert;
pub mod delta;
pub mod deliver;
pub mod download;
pub mod error;
pub mod fanout;
pub mod feed;
pub mod model;
pub mod pipeline;
pub mod profiles;
pub mod staging;
pub mod store;
pub mod synchronise;
