//! fstab mount-option edits
//!
//! Both helpers are line rewrites for `rewrite_config_lines`: they return
//! `Some(new_line)` only for entries that need the option.

use autotweak_common::config_edit::is_comment;

/// Option that is added to every eligible mount
pub const NOATIME: &str = "noatime";

/// Compression option for btrfs mounts
pub const BTRFS_COMPRESSION: &str = "compress=zstd:3";

struct Entry<'a> {
    fields: Vec<&'a str>,
}

impl<'a> Entry<'a> {
    /// Non-comment line with at least device, mount point, type and options
    fn parse(line: &'a str) -> Option<Self> {
        if line.trim().is_empty() || is_comment(line) {
            return None;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return None;
        }
        Some(Self { fields })
    }

    fn fs_type(&self) -> &str {
        self.fields[2]
    }

    fn options(&self) -> std::str::Split<'a, char> {
        self.fields[3].split(',')
    }

    fn with_option(&self, option: &str) -> String {
        let mut fields: Vec<String> = self.fields.iter().map(|f| f.to_string()).collect();
        fields[3] = format!("{},{}", fields[3], option);
        fields.join("\t")
    }
}

/// Add `noatime` unless the entry already sets an atime policy
///
/// swap entries are left alone.
pub fn add_noatime(line: &str) -> Option<String> {
    let entry = Entry::parse(line)?;
    if entry.fs_type() == "swap" {
        return None;
    }
    if entry
        .options()
        .any(|o| o == NOATIME || o == "relatime" || o == "strictatime")
    {
        return None;
    }
    Some(entry.with_option(NOATIME))
}

/// Add zstd compression to btrfs entries without a compression option
pub fn add_btrfs_compression(line: &str) -> Option<String> {
    let entry = Entry::parse(line)?;
    if entry.fs_type() != "btrfs" {
        return None;
    }
    if entry
        .options()
        .any(|o| o.starts_with("compress=") || o.starts_with("compress-force="))
    {
        return None;
    }
    Some(entry.with_option(BTRFS_COMPRESSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noatime_on_defaults() {
        assert_eq!(
            add_noatime("UUID=abc / ext4 defaults 0 1").as_deref(),
            Some("UUID=abc\t/\text4\tdefaults,noatime\t0\t1")
        );
    }

    #[test]
    fn test_noatime_respects_existing_policy() {
        assert!(add_noatime("/dev/sda1 /boot vfat rw,relatime 0 2").is_none());
        assert!(add_noatime("/dev/sda2 /home ext4 noatime 0 2").is_none());
    }

    #[test]
    fn test_noatime_skips_comments_swap_and_short_lines() {
        assert!(add_noatime("# /dev/sda1 / ext4 defaults 0 1").is_none());
        assert!(add_noatime("/dev/sda3 none swap sw 0 0").is_none());
        assert!(add_noatime("tmpfs /tmp tmpfs").is_none());
        assert!(add_noatime("").is_none());
    }

    #[test]
    fn test_btrfs_compression() {
        assert_eq!(
            add_btrfs_compression("UUID=x / btrfs subvol=@,defaults 0 0").as_deref(),
            Some("UUID=x\t/\tbtrfs\tsubvol=@,defaults,compress=zstd:3\t0\t0")
        );
        assert!(add_btrfs_compression("UUID=x / btrfs compress=lzo 0 0").is_none());
        assert!(add_btrfs_compression("UUID=y /home ext4 defaults 0 2").is_none());
    }
}
