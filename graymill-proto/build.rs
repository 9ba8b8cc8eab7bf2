//! Build script for generating the Graymill protocol buffer code.

use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Proto files live at the workspace root
    let proto_root = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?)
        .parent()
        .unwrap()
        .join("proto");

    tonic_build::configure()
        // The server stub is used by test doubles standing in for the
        // remote filter service
        .build_server(true)
        .build_client(true)
        // Suppress clippy warnings for generated code
        .type_attribute(
            ".",
            "#[allow(clippy::all, clippy::pedantic, clippy::nursery)]",
        )
        .server_attribute(
            ".",
            "#[allow(clippy::all, clippy::pedantic, clippy::nursery)]",
        )
        .client_attribute(
            ".",
            "#[allow(clippy::all, clippy::pedantic, clippy::nursery)]",
        )
        .compile_protos(
            &[proto_root.join("graymill/v1/video_filter.proto")],
            &[proto_root],
        )?;

    Ok(())
}
