pub mod backup;
pub mod clock;
pub mod connect;
pub mod error;
pub mod launch;
pub mod lifecycle;
pub mod mods;
pub mod rest_api;
pub mod storage;
pub mod supervisor;
pub mod world_settings;
