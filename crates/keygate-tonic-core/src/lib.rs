#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so downstream crates can access `keygate` via
// `keygate_tonic_core::keygate`
pub use keygate;

/// Generated protobuf messages and gRPC service bindings.
pub mod proto {
    pub mod user {
        tonic::include_proto!("user");
    }

    pub mod system {
        tonic::include_proto!("system");
    }
}

/// Encoded file descriptor set for both packages, served by gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("keygate_descriptor");
