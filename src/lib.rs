pub mod config;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod imu;
pub mod init;
pub mod io;
pub mod sync;

pub use config::InitConfig;
pub use error::{InitError, InitResult};
pub use init::{Initialization, Initializer, InitialState};
pub use sync::Synchronizer;
