/// Building blocks shared by the SRGAN networks.
pub mod blocks;

mod discriminator;
mod fsrcnn;
mod generator;
mod vgg;

pub use discriminator::*;
pub use fsrcnn::*;
pub use generator::*;
pub use vgg::*;
