pub mod error;
pub mod consts;
pub mod config;
pub mod tile;
pub mod grid;
pub mod view;
pub mod correlation;
pub mod search;
pub mod compute;
pub mod align;
pub mod io;
pub mod stitch;
pub mod optimize;
