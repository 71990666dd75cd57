// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2023 Takashi Sakamoto

use {
    alsactl::{prelude::*, *},
    dionaudio_loco_protocols::CodecVolumeOperation,
    glib::{Error, FileError},
    tracing::debug,
};

/// Volume control of the codec over the control elements it exposes on the card. The ceiling
/// clamps the current value when requested, then keeps the element within the ceiling
/// whenever its value changes.
pub struct CodecVolumeCtl {
    card: Card,
    ceiling: Option<(ElemId, i32)>,
}

impl CodecVolumeCtl {
    pub fn new(card_id: u32) -> Result<Self, Error> {
        let card = Card::default();
        card.open(card_id, 0)?;

        Ok(CodecVolumeCtl {
            card,
            ceiling: None,
        })
    }

    fn find_elem_id(&self, ctl_name: &str) -> Result<ElemId, Error> {
        self.card
            .elem_id_list()?
            .into_iter()
            .find(|elem_id| {
                elem_id.iface() == ElemIfaceType::Mixer && elem_id.name().as_str() == ctl_name
            })
            .ok_or_else(|| {
                let msg = format!("The codec exposes no control named {}", ctl_name);
                Error::new(FileError::Noent, &msg)
            })
    }

    fn clamp_to_ceiling(&self, elem_id: &ElemId, ceiling: i32) -> Result<(), Error> {
        let elem_info = self.card.elem_info(elem_id)?;
        let count = match &elem_info {
            ElemInfo::Integer(info) => info.value_count() as usize,
            _ => {
                let msg = format!("{} is not an integer control", elem_id.name());
                return Err(Error::new(FileError::Inval, &msg));
            }
        };

        let mut elem_value = ElemValue::new();
        self.card.read_elem_value(elem_id, &mut elem_value)?;

        let curr = elem_value.int()[..count].to_vec();
        let vals: Vec<i32> = curr.iter().map(|&val| val.min(ceiling)).collect();

        if vals != curr {
            elem_value.set_int(&vals);
            self.card.write_elem_value(elem_id, &elem_value)?;
            debug!(name = ?elem_id.name().as_str(), ?vals, ceiling);
        }

        Ok(())
    }

    /// Keep the control within the ceiling. Invoked against every changed element of the
    /// card; elements without ceiling are left alone.
    pub fn enforce(&mut self, elem_id: &ElemId) -> Result<(), Error> {
        if let Some((target, ceiling)) = &self.ceiling {
            if elem_id.eq(target) {
                self.clamp_to_ceiling(elem_id, *ceiling)?;
            }
        }

        Ok(())
    }
}

impl CodecVolumeOperation for CodecVolumeCtl {
    fn set_volume_ceiling(&mut self, ctl_name: &str, ceiling: i32) -> Result<(), Error> {
        let elem_id = self.find_elem_id(ctl_name)?;
        self.clamp_to_ceiling(&elem_id, ceiling)?;
        self.ceiling = Some((elem_id, ceiling));

        Ok(())
    }
}
