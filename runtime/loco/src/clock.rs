// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2023 Takashi Sakamoto

use {
    dionaudio_loco_protocols::{DaiClockOperation, DaiLinkDescriptor, EndpointHandle},
    glib::{Error, FileError},
    std::{
        fs, io,
        path::{Path, PathBuf},
    },
    tracing::debug,
};

/// The endpoint of host interface which accepts the ratio of bit clock against frame clock,
/// by the attribute in sysfs of its platform device.
#[derive(Debug, Clone)]
pub struct ClockRatioEndpoint {
    attr_path: PathBuf,
}

const BCLK_RATIO_ATTR_NAME: &str = "bclk_ratio";

/// Name of platform device populated from the node of device tree; the unit address comes
/// before the node name.
fn platform_device_name(node_name: &str) -> String {
    match node_name.split_once('@') {
        Some((name, unit_address)) => format!("{}.{}", unit_address, name),
        None => node_name.to_string(),
    }
}

fn file_error_from_io(err: &io::Error) -> FileError {
    match err.kind() {
        io::ErrorKind::NotFound => FileError::Noent,
        io::ErrorKind::PermissionDenied => FileError::Acces,
        _ => FileError::Io,
    }
}

impl ClockRatioEndpoint {
    /// Derive the directory of platform device for the host interface of the link; either
    /// from the endpoint resolved out of configuration data, or from the static name.
    pub fn from_link(link: &DaiLinkDescriptor, sysfs_root: &Path) -> Result<Self, Error> {
        let device_dir = if let Some(EndpointHandle(node_path)) = &link.host_endpoint {
            let mut dir = sysfs_root.to_path_buf();
            let mut components = node_path.trim_start_matches('/').split('/').peekable();
            while let Some(component) = components.next() {
                if components.peek().is_some() {
                    dir.push(component);
                } else {
                    dir.push(platform_device_name(component));
                }
            }
            dir
        } else if let Some(name) = &link.cpu_dai_name {
            sysfs_root.join(name)
        } else {
            let msg = "The link has no endpoint for host interface";
            return Err(Error::new(FileError::Inval, msg));
        };

        Ok(ClockRatioEndpoint {
            attr_path: device_dir.join(BCLK_RATIO_ATTR_NAME),
        })
    }
}

impl DaiClockOperation for ClockRatioEndpoint {
    fn set_bclk_ratio(&mut self, ratio: u32) -> Result<(), Error> {
        fs::write(&self.attr_path, format!("{}\n", ratio))
            .map(|_| debug!(path = %self.attr_path.display(), ratio))
            .map_err(|err| {
                let msg = format!("Fail to write {}: {}", self.attr_path.display(), err);
                Error::new(file_error_from_io(&err), &msg)
            })
    }
}
