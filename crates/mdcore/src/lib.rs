pub mod markdown;
pub mod tags;

pub use markdown::inline_blocks;
pub use tags::extract_tags;
