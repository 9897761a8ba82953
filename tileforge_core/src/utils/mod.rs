mod compression;

pub use compression::{compress_gzip, decompress_gzip, is_gzip_compressed};
