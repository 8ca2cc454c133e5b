pub mod calibration;
pub mod frame;
pub mod models;
pub mod overlay;
pub mod pointer;
pub mod queue;
pub mod session;
pub mod settings;
