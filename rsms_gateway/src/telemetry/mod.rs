pub mod reissue;
pub mod ring;

pub use reissue::ReissueQueue;
pub use ring::RetentionRing;
