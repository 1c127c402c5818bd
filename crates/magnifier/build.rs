//! Build script for AimLens.Magnifier
//! Embeds Windows resource metadata

fn main() {
    #[cfg(windows)]
    {
        let mut res = winresource::WindowsResource::new();
        res.set("FileDescription", "AimLens.Magnifier");
        res.set("ProductName", "AimLens");
        res.set("InternalName", "AimLens.Magnifier");
        res.set("OriginalFilename", "AimLens_Magnifier.exe");
        res.set("CompanyName", "AimLens");
        res.set("LegalCopyright", "Copyright © 2026");

        if let Err(e) = res.compile() {
            println!("cargo:warning=Failed to compile Windows resources: {}", e);
        }
    }
}
