pub mod file;

pub use file::SymphoniaDecoder;
