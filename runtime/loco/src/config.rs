// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2023 Takashi Sakamoto

use {
    dionaudio_loco_protocols::{ConfigDataOperation, EndpointHandle},
    glib::{Error, FileError},
    std::{
        fs,
        path::{Path, PathBuf},
    },
    tracing::debug,
};

/// Configuration data of the sound node in flattened device tree. The kernel exposes the tree
/// as a hierarchy of directories and property files.
#[derive(Debug, Clone)]
pub struct DeviceTreeConfig {
    base: PathBuf,
    node: PathBuf,
}

const SOUND_NODE_NAME: &str = "sound";
const COMPATIBLE_PROP_NAME: &str = "compatible";
const PHANDLE_PROP_NAMES: &[&str] = &["phandle", "linux,phandle"];

impl DeviceTreeConfig {
    /// Detect the sound node under the base directory of flattened device tree. Absence of
    /// the node means that no configuration data is available and static defaults apply.
    pub fn detect(base: &Path) -> Option<Self> {
        let node = base.join(SOUND_NODE_NAME);
        if node.is_dir() {
            Some(DeviceTreeConfig {
                base: base.to_path_buf(),
                node,
            })
        } else {
            None
        }
    }

    /// The list of compatible tags of the sound node.
    pub fn compatible(&self) -> Result<Vec<String>, Error> {
        let raw = fs::read(self.node.join(COMPATIBLE_PROP_NAME)).map_err(|err| {
            let msg = format!("Fail to read compatible property: {}", err);
            Error::new(FileError::Noent, &msg)
        })?;

        let entries = raw
            .split(|&b| b == 0)
            .filter(|entry| entry.len() > 0)
            .map(|entry| String::from_utf8_lossy(entry).to_string())
            .collect();

        Ok(entries)
    }

    fn read_phandle_cell(&self, prop_name: &str) -> Option<u32> {
        let raw = fs::read(self.node.join(prop_name)).ok()?;
        if raw.len() < 4 {
            return None;
        }
        let mut cell = [0; 4];
        cell.copy_from_slice(&raw[..4]);
        Some(u32::from_be_bytes(cell))
    }

    fn node_has_phandle(dir: &Path, phandle: u32) -> bool {
        PHANDLE_PROP_NAMES.iter().any(|prop_name| {
            fs::read(dir.join(prop_name))
                .ok()
                .filter(|raw| raw.len() >= 4)
                .map(|raw| {
                    let mut cell = [0; 4];
                    cell.copy_from_slice(&raw[..4]);
                    u32::from_be_bytes(cell) == phandle
                })
                .unwrap_or(false)
        })
    }

    fn find_node_by_phandle(dir: &Path, phandle: u32) -> Option<PathBuf> {
        let entries = fs::read_dir(dir).ok()?;

        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            if Self::node_has_phandle(&path, phandle) {
                return Some(path);
            }

            if let Some(path) = Self::find_node_by_phandle(&path, phandle) {
                return Some(path);
            }
        }

        None
    }
}

impl ConfigDataOperation for DeviceTreeConfig {
    fn read_endpoint_reference(&self, prop_name: &str) -> Option<EndpointHandle> {
        let phandle = self.read_phandle_cell(prop_name)?;

        let path = Self::find_node_by_phandle(&self.base, phandle)?;
        let node_path = path
            .strip_prefix(&self.base)
            .map(|relative| format!("/{}", relative.display()))
            .ok()?;

        debug!(prop_name, phandle, node_path = node_path.as_str());

        Some(EndpointHandle(node_path))
    }

    fn read_boolean_property(&self, prop_name: &str) -> bool {
        // A boolean property in the tree is an empty cell; the presence alone is true.
        self.node.join(prop_name).exists()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn build_tree(name: &str) -> PathBuf {
        let base = std::env::temp_dir().join(format!("{}-{}", name, std::process::id()));
        let sound = base.join("sound");
        fs::create_dir_all(&sound).unwrap();
        fs::write(
            sound.join("compatible"),
            b"dionaudio,dionaudio-loco-v2\0".to_vec(),
        )
        .unwrap();

        let i2s = base.join("soc").join("i2s@7e203000");
        fs::create_dir_all(&i2s).unwrap();
        fs::write(i2s.join("phandle"), 0x1cu32.to_be_bytes().to_vec()).unwrap();
        fs::write(sound.join("i2s-controller"), 0x1cu32.to_be_bytes().to_vec()).unwrap();

        base
    }

    #[test]
    fn sound_node_detection() {
        let base = build_tree("loco-detection");

        assert!(DeviceTreeConfig::detect(&base).is_some());
        assert!(DeviceTreeConfig::detect(&base.join("soc")).is_none());

        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn compatible_tags() {
        let base = build_tree("loco-compatible");
        let config = DeviceTreeConfig::detect(&base).unwrap();

        assert_eq!(
            config.compatible().unwrap(),
            vec!["dionaudio,dionaudio-loco-v2".to_string()]
        );

        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn endpoint_reference_resolution() {
        let base = build_tree("loco-endpoint");
        let config = DeviceTreeConfig::detect(&base).unwrap();

        let handle = config.read_endpoint_reference("i2s-controller").unwrap();
        assert_eq!(handle, EndpointHandle("/soc/i2s@7e203000".to_string()));

        assert_eq!(config.read_endpoint_reference("spi-controller"), None);

        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn boolean_property_presence() {
        let base = build_tree("loco-boolean");
        let config = DeviceTreeConfig::detect(&base).unwrap();

        assert_eq!(
            config.read_boolean_property("dionaudio,24db_digital_gain"),
            false
        );

        fs::write(base.join("sound").join("dionaudio,24db_digital_gain"), b"").unwrap();
        assert_eq!(
            config.read_boolean_property("dionaudio,24db_digital_gain"),
            true
        );

        fs::remove_dir_all(&base).unwrap();
    }
}
