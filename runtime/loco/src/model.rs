// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2023 Takashi Sakamoto

use {
    super::{clock::ClockRatioEndpoint, codec::CodecVolumeCtl, config::DeviceTreeConfig},
    alsactl::{prelude::*, *},
    dionaudio_loco_protocols::*,
    glib::{Error, FileError},
    runtime_core::card_cntr::*,
    std::{fs, path::PathBuf},
    tracing::debug,
};

/// The pair of collaborators around the link; volume control of the codec and clock
/// configuration of the host interface.
pub struct LocoUnit {
    pub codec: CodecVolumeCtl,
    pub dai: ClockRatioEndpoint,
}

/// Registration of the card, anchored to the sound card instantiated in Linux sound
/// subsystem. Addition and removal of control elements belongs to CardCntr.
#[derive(Debug)]
pub struct CardRegistrar {
    card_id: u32,
    proc_root: PathBuf,
}

const PROC_ASOUND_ROOT: &str = "/proc/asound";

impl CardRegistrar {
    pub fn new(card_id: u32) -> Self {
        CardRegistrar {
            card_id,
            proc_root: PathBuf::from(PROC_ASOUND_ROOT),
        }
    }
}

impl CardRegistrationOperation for CardRegistrar {
    fn register_card(&mut self, card: &CardDescriptor) -> Result<(), Error> {
        let path = self
            .proc_root
            .join(format!("card{}", self.card_id))
            .join("id");
        let id = fs::read_to_string(&path).map_err(|err| {
            let msg = format!("Fail to detect sound card {}: {}", self.card_id, err);
            Error::new(FileError::Nodev, &msg)
        })?;

        debug!(
            card_id = self.card_id,
            id = id.trim(),
            name = card.name.as_str(),
        );

        Ok(())
    }

    fn unregister_card(&mut self, card: &CardDescriptor) -> Result<(), Error> {
        debug!(card_id = self.card_id, name = card.name.as_str());
        Ok(())
    }
}

const RATIO_NAME: &str = "Bit Clock Ratio";
const CEILING_NAME: &str = "Digital Gain Ceiling";

const RATIO_MAX: i32 = 256;

#[derive(Default, Debug)]
struct LinkCtl<O: DionaudioHardwareSpecification> {
    elem_id_list: Vec<ElemId>,
    link: DionaudioLink<O>,
    ratio: Option<u32>,
}

impl<O: DionaudioHardwareSpecification> LinkCtl<O> {
    fn configure(&mut self, config: Option<&DeviceTreeConfig>) -> Result<(), Error> {
        self.link.configure(config)
    }

    fn initialize(&mut self, unit: &mut LocoUnit) -> Result<(), Error> {
        self.link.initialize(&mut unit.codec)
    }

    fn activate(&mut self, registrar: &mut CardRegistrar) -> Result<(), Error> {
        self.link.activate(registrar)
    }

    fn teardown(&mut self, registrar: &mut CardRegistrar) -> Result<(), Error> {
        self.link.teardown(registrar)
    }

    fn load(&mut self, card_cntr: &mut CardCntr) -> Result<(), Error> {
        let elem_id = ElemId::new_by_name(ElemIfaceType::Pcm, 0, 0, RATIO_NAME, 0);
        card_cntr
            .add_int_elems(&elem_id, 1, 0, RATIO_MAX, 1, 1, true)
            .map(|mut elem_id_list| self.elem_id_list.append(&mut elem_id_list))?;

        let elem_id = ElemId::new_by_name(ElemIfaceType::Mixer, 0, 0, CEILING_NAME, 0);
        card_cntr
            .add_bool_elems(&elem_id, 1, 1, true)
            .map(|mut elem_id_list| self.elem_id_list.append(&mut elem_id_list))?;

        Ok(())
    }

    fn read(&mut self, elem_id: &ElemId, elem_value: &mut ElemValue) -> Result<bool, Error> {
        match elem_id.name().as_str() {
            RATIO_NAME => {
                elem_value.set_int(&[self.ratio.unwrap_or(0) as i32]);
                Ok(true)
            }
            CEILING_NAME => {
                elem_value.set_bool(&[self.link.configuration().playback_ceiling]);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn parse_notification(
        &mut self,
        unit: &mut LocoUnit,
        params: &StreamParameters,
    ) -> Result<(), Error> {
        let ratio = self.link.negotiate(&mut unit.dai, params)?;
        self.ratio = Some(ratio);
        Ok(())
    }

    fn link(&self) -> &DionaudioLink<O> {
        &self.link
    }
}

pub struct LocoModel {
    registrar: CardRegistrar,
    link_ctl: LinkCtl<DionaudioLocoProtocol>,
}

impl LocoModel {
    pub fn new(card_id: u32, config: Option<&DeviceTreeConfig>) -> Result<Self, Error> {
        let mut link_ctl = LinkCtl::default();
        link_ctl.configure(config)?;

        Ok(LocoModel {
            registrar: CardRegistrar::new(card_id),
            link_ctl,
        })
    }

    pub fn dai_link(&self) -> &DaiLinkDescriptor {
        &self.link_ctl.link().card().links[0]
    }

    pub fn teardown(&mut self) -> Result<(), Error> {
        self.link_ctl.teardown(&mut self.registrar)
    }
}

impl CtlModel<LocoUnit> for LocoModel {
    fn cache(&mut self, unit: &mut LocoUnit) -> Result<(), Error> {
        self.link_ctl.initialize(unit)
    }

    fn load(&mut self, card_cntr: &mut CardCntr) -> Result<(), Error> {
        self.link_ctl.activate(&mut self.registrar)?;
        self.link_ctl.load(card_cntr)?;
        Ok(())
    }

    fn read(
        &mut self,
        _: &mut LocoUnit,
        elem_id: &ElemId,
        elem_value: &mut ElemValue,
    ) -> Result<bool, Error> {
        self.link_ctl.read(elem_id, elem_value)
    }

    fn write(
        &mut self,
        _: &mut LocoUnit,
        _: &ElemId,
        _: &ElemValue,
        _: &ElemValue,
    ) -> Result<bool, Error> {
        // The elements of the link are informational.
        Ok(false)
    }
}

impl NotifyModel<LocoUnit, StreamParameters> for LocoModel {
    fn get_notified_elem_list(&mut self, elem_id_list: &mut Vec<ElemId>) {
        elem_id_list.extend_from_slice(&self.link_ctl.elem_id_list);
    }

    fn parse_notification(
        &mut self,
        unit: &mut LocoUnit,
        params: &StreamParameters,
    ) -> Result<(), Error> {
        self.link_ctl.parse_notification(unit, params)
    }
}

pub struct LocoV2Model {
    registrar: CardRegistrar,
    link_ctl: LinkCtl<DionaudioLocoV2Protocol>,
}

impl LocoV2Model {
    pub fn new(card_id: u32, config: Option<&DeviceTreeConfig>) -> Result<Self, Error> {
        let mut link_ctl = LinkCtl::default();
        link_ctl.configure(config)?;

        Ok(LocoV2Model {
            registrar: CardRegistrar::new(card_id),
            link_ctl,
        })
    }

    pub fn dai_link(&self) -> &DaiLinkDescriptor {
        &self.link_ctl.link().card().links[0]
    }

    pub fn teardown(&mut self) -> Result<(), Error> {
        self.link_ctl.teardown(&mut self.registrar)
    }
}

impl CtlModel<LocoUnit> for LocoV2Model {
    fn cache(&mut self, unit: &mut LocoUnit) -> Result<(), Error> {
        self.link_ctl.initialize(unit)
    }

    fn load(&mut self, card_cntr: &mut CardCntr) -> Result<(), Error> {
        self.link_ctl.activate(&mut self.registrar)?;
        self.link_ctl.load(card_cntr)?;
        Ok(())
    }

    fn read(
        &mut self,
        _: &mut LocoUnit,
        elem_id: &ElemId,
        elem_value: &mut ElemValue,
    ) -> Result<bool, Error> {
        self.link_ctl.read(elem_id, elem_value)
    }

    fn write(
        &mut self,
        _: &mut LocoUnit,
        _: &ElemId,
        _: &ElemValue,
        _: &ElemValue,
    ) -> Result<bool, Error> {
        // The elements of the link are informational.
        Ok(false)
    }
}

impl NotifyModel<LocoUnit, StreamParameters> for LocoV2Model {
    fn get_notified_elem_list(&mut self, elem_id_list: &mut Vec<ElemId>) {
        elem_id_list.extend_from_slice(&self.link_ctl.elem_id_list);
    }

    fn parse_notification(
        &mut self,
        unit: &mut LocoUnit,
        params: &StreamParameters,
    ) -> Result<(), Error> {
        self.link_ctl.parse_notification(unit, params)
    }
}
