/// Builds the gRPC client and server code for `proto/userhub.proto` using
/// `tonic-prost-build`.
///
/// The `data` field of `UploadChunk` is generated as `bytes::Bytes` instead of
/// `Vec<u8>` so that upload chunks are handed to the aggregator without an
/// extra copy.
///
/// A file descriptor set is written to `OUT_DIR` so the server can register
/// it with `tonic-reflection`.
///
/// # Panics
///
/// Panics if code generation fails (for example when `protoc` is missing).
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("userhub_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .bytes([".userhub.v1.UploadChunk.data"])
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/userhub.proto"], &["proto"])
        .unwrap();
}
