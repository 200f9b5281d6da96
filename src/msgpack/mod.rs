pub mod decode;
pub mod encode;
mod value;

pub use decode::{DecodeError, Decoder, MAX_DEPTH, ReadResult, Reader};
pub use encode::{Bin, Encode, Encoder};
pub use value::{ArrView, BinView, ExtView, Family, MapView, StrView, Value};

#[cfg(test)]
mod decode_test;
