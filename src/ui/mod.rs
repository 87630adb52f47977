pub mod app;
pub mod display;
pub mod menu;
pub mod picker;
pub mod render;
