//! Route handlers

pub mod live;
pub mod reports;
pub mod video;
