pub mod attendance;
pub mod error;
pub mod events;
pub mod ports;
pub mod repo;
pub mod rollcall;
pub mod service;
pub mod shifts;
pub mod zones;
