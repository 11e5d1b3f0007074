pub mod params;
pub mod tb;
