pub mod geocode;
pub mod rooms;
pub mod sections;
