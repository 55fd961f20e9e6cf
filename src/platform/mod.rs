// Platform integrations for inference backends

pub mod pose;
