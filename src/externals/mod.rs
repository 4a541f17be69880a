pub mod camera;
pub mod control;
pub mod radio;
pub mod sensors;
pub mod subscribers;
