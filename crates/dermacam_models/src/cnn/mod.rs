//! CNN models for lesion images.

mod dermnet;

pub use dermnet::{ConvBlock, DermNet, DermNetConfig, CHANNEL_MEAN, CHANNEL_STD};
