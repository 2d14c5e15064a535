extern crate nalgebra_glm as glm;

pub mod collections;
pub mod config;
pub mod errors;
pub mod nicegpu;
pub mod render;
pub mod safesync;
pub mod softgpu;
pub mod typeygpu;
pub mod utils;
