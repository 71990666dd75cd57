// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2023 Takashi Sakamoto

use {
    dionaudio_loco_protocols::{deserialize_sample_format, SampleFormat, StreamParameters},
    glib::{Error, FileError},
    std::{fs, path::PathBuf},
};

const CLOSED_LITERAL: &str = "closed";
const FORMAT_LINE_PREFIX: &str = "format: ";

/// Parse the state of PCM substream expressed in its procfs node. The node expresses the
/// parameters of the running stream line by line, or the single literal when closed.
pub fn parse_substream_params(text: &str) -> Result<Option<StreamParameters>, Error> {
    if text.trim() == CLOSED_LITERAL {
        return Ok(None);
    }

    let name = text
        .lines()
        .find_map(|line| line.strip_prefix(FORMAT_LINE_PREFIX))
        .ok_or_else(|| {
            let msg = "The state of substream includes no line for sample format";
            Error::new(FileError::Inval, msg)
        })?;

    let mut format = SampleFormat::default();
    deserialize_sample_format(&mut format, name.trim())?;

    Ok(Some(StreamParameters::from(format)))
}

/// Monitor for the playback substream of the link. Each edge from closed state to running
/// state yields the parameters of the stream exactly once.
#[derive(Debug)]
pub struct SubstreamMonitor {
    path: PathBuf,
    opened: bool,
}

impl SubstreamMonitor {
    pub fn new(card_id: u32) -> Self {
        let path = PathBuf::from(format!("/proc/asound/card{}/pcm0p/sub0/hw_params", card_id));
        SubstreamMonitor {
            path,
            opened: false,
        }
    }

    pub fn poll(&mut self) -> Result<Option<StreamParameters>, Error> {
        let text = fs::read_to_string(&self.path).map_err(|err| {
            let msg = format!("Fail to read {}: {}", self.path.display(), err);
            Error::new(FileError::Noent, &msg)
        })?;

        match parse_substream_params(&text)? {
            Some(params) => {
                if !self.opened {
                    self.opened = true;
                    Ok(Some(params))
                } else {
                    Ok(None)
                }
            }
            None => {
                self.opened = false;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const RUNNING_STATE: &str = "access: RW_INTERLEAVED
format: S32_LE
subformat: STD
channels: 2
rate: 44100 (44100/1)
period_size: 1024
buffer_size: 4096
";

    #[test]
    fn closed_substream() {
        assert_eq!(parse_substream_params("closed\n").unwrap(), None);
    }

    #[test]
    fn running_substream() {
        let params = parse_substream_params(RUNNING_STATE).unwrap().unwrap();
        assert_eq!(params.physical_width, 32);
    }

    #[test]
    fn malformed_substream_state() {
        assert!(parse_substream_params("access: RW_INTERLEAVED\n").is_err());
        assert!(parse_substream_params("format: FLOAT_LE\n").is_err());
    }

    #[test]
    fn open_edge_detection() {
        let dir = std::env::temp_dir().join(format!("loco-substream-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("hw_params");

        let mut monitor = SubstreamMonitor {
            path: path.clone(),
            opened: false,
        };

        fs::write(&path, "closed\n").unwrap();
        assert_eq!(monitor.poll().unwrap(), None);

        fs::write(&path, RUNNING_STATE).unwrap();
        let params = monitor.poll().unwrap().unwrap();
        assert_eq!(params.physical_width, 32);

        // The stream keeps running; no further edge.
        assert_eq!(monitor.poll().unwrap(), None);

        fs::write(&path, "closed\n").unwrap();
        assert_eq!(monitor.poll().unwrap(), None);

        fs::write(&path, RUNNING_STATE).unwrap();
        assert!(monitor.poll().unwrap().is_some());

        fs::remove_dir_all(&dir).unwrap();
    }
}
