pub mod broadcast;
pub mod capture;
