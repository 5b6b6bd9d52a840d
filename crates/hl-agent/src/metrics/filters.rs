//! Which disks and interfaces count toward host totals

/// Mount points that never hold host data
const EXCLUDED_MOUNT_PREFIXES: &[&str] = &[
    "/tmp",
    "/var/tmp",
    "/dev/shm",
    "/run",
    "/var/lib/containers/",
    "/var/lib/docker/",
];

/// Memory-backed, network and layered filesystems
const EXCLUDED_FS_PREFIXES: &[&str] = &[
    "tmpfs", "devtmpfs", "nfs", "cifs", "smb", "vboxsf", "9p", "fuse", "overlay",
];

/// Loopback, bridge and container interfaces
const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "br", "cni", "docker", "podman", "flannel", "veth", "virbr", "vmbr",
];

/// Whether a mounted filesystem is local storage worth counting.
///
/// The root mount always counts, even on loop-backed container roots.
pub fn is_physical_disk(mount_point: &str, fs_type: &str, device: &str) -> bool {
    if mount_point == "/" {
        return true;
    }

    let mount_point = mount_point.to_lowercase();
    if EXCLUDED_MOUNT_PREFIXES
        .iter()
        .any(|prefix| mount_point.starts_with(prefix))
    {
        return false;
    }

    let fs_type = fs_type.to_lowercase();
    if EXCLUDED_FS_PREFIXES
        .iter()
        .any(|prefix| fs_type.starts_with(prefix))
    {
        return false;
    }

    !device.starts_with("/dev/loop")
}

/// Whether an interface is virtual and left out of traffic totals
pub fn is_virtual_interface(name: &str) -> bool {
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_always_counts() {
        assert!(is_physical_disk("/", "overlay", "/dev/loop3"));
    }

    #[test]
    fn test_excluded_disks() {
        assert!(!is_physical_disk("/run/user/1000", "ext4", "/dev/sda1"));
        assert!(!is_physical_disk("/mnt/share", "nfs4", "server:/export"));
        assert!(!is_physical_disk("/snap/core/1", "squashfs", "/dev/loop0"));
        assert!(!is_physical_disk("/var/lib/docker/overlay2/x", "ext4", "/dev/sda1"));
        assert!(is_physical_disk("/home", "ext4", "/dev/nvme0n1p2"));
    }

    #[test]
    fn test_virtual_interfaces() {
        assert!(is_virtual_interface("lo"));
        assert!(is_virtual_interface("docker0"));
        assert!(is_virtual_interface("veth12ab"));
        assert!(!is_virtual_interface("eth0"));
        assert!(!is_virtual_interface("enp3s0"));
    }
}
