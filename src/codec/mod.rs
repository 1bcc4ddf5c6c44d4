pub mod data;
pub mod row;

pub use row::{decode_row, encode_row, read_row, write_row};
