pub mod adapters;
pub mod converters;
pub mod destinations;
pub mod steps;
