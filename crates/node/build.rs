use std::process::Command;

fn gen_version() {
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
    {
        if let Ok(git_short_hash) = String::from_utf8(output.stdout) {
            let git_short_hash = git_short_hash.trim();
            if !git_short_hash.is_empty() {
                println!("cargo:rustc-env=GIT_SHORT_HASH={git_short_hash}");
            }
        }
    }
}

fn main() {
    gen_version();
}
