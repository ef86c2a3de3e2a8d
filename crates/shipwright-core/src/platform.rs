//! Build platform strings (`os/arch`).

/// The platform of the machine running the build, e.g. `linux/amd64`.
pub fn host_platform() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    };
    format!("{}/{}", os, arch)
}

/// Image tag suffix for a platform: `linux/amd64` -> `linux_amd64`.
pub fn tag_suffix(platform: &str) -> String {
    platform.replace('/', "_")
}

/// File name slug for a platform: `linux/amd64` -> `linux-amd64`.
pub fn file_slug(platform: &str) -> String {
    platform.replace('/', "-")
}
