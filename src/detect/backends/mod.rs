pub mod seeta;
pub mod stub;

pub use seeta::SeetaDetector;
pub use stub::StubDetector;
