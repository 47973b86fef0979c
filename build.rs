// build.rs

fn main() {
    // Generate build info. Outside a git checkout the git values fall back
    // to placeholders instead of failing the build.
    if let Err(e) = vergen::EmitBuilder::builder()
        .all_build()
        .all_git()
        .emit()
    {
        println!("cargo:warning=Unable to generate build info: {e}");
    }
}
