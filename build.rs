fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Point prost at a bundled protoc when one isn't on PATH.
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            unsafe {
                std::env::set_var("PROTOC", protoc);
            }
        }
    }
    tonic_prost_build::compile_protos("proto/sim.proto")?;
    Ok(())
}
