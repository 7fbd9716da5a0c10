pub mod geo_ops;
pub mod wkb_codec;
