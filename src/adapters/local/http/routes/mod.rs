pub mod camera;
pub mod delivery;
