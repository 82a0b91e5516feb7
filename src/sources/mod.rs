pub mod reddit;
mod source;

pub use source::{MediaAsset, MediaKind, Post, PostKind};
