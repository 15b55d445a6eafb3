use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

// Must match `PlatformTag::as_str`.
const TAGS: [&str; 3] = ["x86", "x64", "arm64"];

fn main() {
    // Embed every native library found under `native/<tag>/` as
    // `<crate>.NativeLibraries.<tag>.<file name>`. A missing directory just
    // means no payload for that tag; provisioning reports it at run time.
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let namespace = env::var("CARGO_PKG_NAME").expect("CARGO_PKG_NAME");

    println!("cargo:rerun-if-env-changed=SCORELINK_NATIVE_DIR");
    let native_dir = env::var_os("SCORELINK_NATIVE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| manifest_dir.join("native"));
    println!("cargo:rerun-if-changed={}", native_dir.display());

    let mut table = String::from("pub static EMBEDDED: &[(&str, &[u8])] = &[\n");
    let mut count = 0;
    for tag in TAGS {
        let dir = native_dir.join(tag);
        println!("cargo:rerun-if-changed={}", dir.display());
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            println!("cargo:rerun-if-changed={}", path.display());
            writeln!(
                table,
                "    ({:?}, include_bytes!({:?})),",
                format!("{namespace}.NativeLibraries.{tag}.{name}"),
                path.display().to_string()
            )
            .expect("write to String");
            count += 1;
        }
    }
    table.push_str("];\n");

    if count == 0 {
        println!(
            "cargo:warning=No native payloads under {}; engines will fail to provision",
            native_dir.display()
        );
    }
    fs::write(out_dir.join("native_payloads.rs"), table).expect("write native_payloads.rs");
}
