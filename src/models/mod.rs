// Data models for corpus images, pose observations, and published pipeline state

pub mod frame;
pub mod pipeline;
pub mod pose;
