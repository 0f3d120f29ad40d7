//! Audio file I/O.

pub mod wav;

pub use wav::{read_wav, write_wav};
