//! Build script for AimLens.Runner
//! Embeds Windows resource metadata

fn main() {
    #[cfg(windows)]
    {
        let mut res = winresource::WindowsResource::new();
        res.set("FileDescription", "AimLens.Runner");
        res.set("ProductName", "AimLens");
        res.set("InternalName", "AimLens.Runner");
        res.set("OriginalFilename", "AimLens_Runner.exe");
        res.set("CompanyName", "AimLens");
        res.set("LegalCopyright", "Copyright © 2026");

        if let Err(e) = res.compile() {
            println!("cargo:warning=Failed to compile Windows resources: {}", e);
        }
    }
}
