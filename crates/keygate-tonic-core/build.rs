/// Builds the gRPC client and server code for `user.proto` and `system.proto`.
///
/// The `content` field of `system.FileChunk` is generated as `Bytes` instead
/// of `Vec<u8>` so file chunks can be handed to the encoder without an extra
/// copy. The encoded descriptor set is written next to the generated code for
/// the reflection service.
///
/// Generated code is included via:
///
/// ```rust,ignore
/// pub mod user {
///     tonic::include_proto!("user");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("keygate_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .bytes([".system.FileChunk.content"])
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(
            config,
            &["proto/user.proto", "proto/system.proto"],
            &["proto"],
        )
        .unwrap();
}
