pub mod ema;

pub use ema::{Crossing, Ema, EmaCross};
