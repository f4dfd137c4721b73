use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // version metadata shows up in the DLL's properties dialog; nothing to do for other targets
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    let mut res = winresource::WindowsResource::new();
    res.set("FileDescription", "Sensible Tempering SKSE plugin");
    res.set("ProductName", "Sensible Tempering");
    res.set("OriginalFilename", "SensibleTempering.dll");
    if let Err(e) = res.compile() {
        panic!("Failed to compile Windows resources: {}", e);
    }
}
