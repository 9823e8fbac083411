pub mod geo;
pub mod ingest;
pub mod render;
pub mod reshape;
