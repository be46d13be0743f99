// Build provenance reported by `chanprims version --extended`.
fn main() {
    for (source, exported) in [
        ("TARGET", "CHANPRIMS_BUILD_TARGET"),
        ("PROFILE", "CHANPRIMS_BUILD_PROFILE"),
    ] {
        if let Ok(value) = std::env::var(source) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={source}");
    }
}
