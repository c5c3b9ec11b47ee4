//! Build script for netsimpler
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! for `netsimpler --version`.

fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
