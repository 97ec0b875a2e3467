//! Build script for fwprobe
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! that the binary logs at startup.

fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
