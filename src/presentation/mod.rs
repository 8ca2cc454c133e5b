pub mod app;
pub mod overlay;
