pub mod fee;
pub mod live;
pub mod logging;
pub mod registry;
pub mod swap;
