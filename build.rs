fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Version and build time, logged by the binary at startup
    built::write_built_file().expect("Failed to acquire build-time information");
}
