//! Reading platform markers from the running system

use std::path::Path;

use boardio_core::board::PlatformMarkers;

use crate::sysfs::read_optional;

const DMI_BOARD_NAME: &str = "/sys/devices/virtual/dmi/id/board_name";
const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";
const CMDLINE: &str = "/proc/cmdline";

/// Where markers are read from
#[derive(Debug, Clone)]
pub(crate) struct MarkerSources<'a> {
    pub board_name: &'a Path,
    pub device_tree_model: &'a Path,
    pub cmdline: &'a Path,
}

impl Default for MarkerSources<'static> {
    fn default() -> Self {
        Self {
            board_name: Path::new(DMI_BOARD_NAME),
            device_tree_model: Path::new(DEVICE_TREE_MODEL),
            cmdline: Path::new(CMDLINE),
        }
    }
}

/// Read DMI board name, device-tree model and kernel command line
pub(crate) fn read(sources: &MarkerSources<'_>) -> PlatformMarkers {
    let markers = PlatformMarkers {
        board_name: read_optional(sources.board_name).filter(|s| !s.is_empty()),
        device_tree_model: read_optional(sources.device_tree_model).filter(|s| !s.is_empty()),
        cmdline: read_optional(sources.cmdline),
    };
    log::debug!(
        "linux: markers board_name={:?} model={:?}",
        markers.board_name,
        markers.device_tree_model
    );
    markers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_present_markers_and_skips_missing() {
        let dir = std::env::temp_dir().join(format!("boardio-markers-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let model = dir.join("model");
        let cmdline = dir.join("cmdline");
        std::fs::write(&model, "Raspberry Pi 3 Model B Rev 1.2\0").unwrap();
        std::fs::write(&cmdline, "console=ttyS0 root=/dev/mmcblk0p2\n").unwrap();

        let markers = read(&MarkerSources {
            board_name: &dir.join("board_name"),
            device_tree_model: &model,
            cmdline: &cmdline,
        });
        assert_eq!(markers.board_name, None);
        assert_eq!(
            markers.device_tree_model.as_deref(),
            Some("Raspberry Pi 3 Model B Rev 1.2")
        );
        assert_eq!(
            markers.cmdline.as_deref(),
            Some("console=ttyS0 root=/dev/mmcblk0p2")
        );
    }
}
