pub mod geojson_source;

pub use geojson_source::GeoJsonSource;
