//! Foundation utilities shared by the engine and the binaries

pub mod logging;
