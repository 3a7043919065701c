fn main() {
    slint_build::compile("ui/puzzle.slint").expect("failed to compile puzzle.slint");
    println!("cargo:rerun-if-changed=ui/puzzle.slint");
}
