pub mod model;
pub mod scheduler;
pub mod sounds;
pub mod storage;
pub mod trigger;
