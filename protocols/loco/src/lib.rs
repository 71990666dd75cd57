// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2023 Takashi Sakamoto

#![doc = include_str!("../README.md")]

use {
    glib::{Error, FileError},
    std::marker::PhantomData,
};

/// The protocol implementation for Dion Audio LOCO.
#[derive(Default, Debug)]
pub struct DionaudioLocoProtocol;

impl DionaudioHardwareSpecification for DionaudioLocoProtocol {
    const CARD_NAME: &'static str = "snd_rpi_dionaudio_loco";
    const LINK_NAME: &'static str = "DionAudio LOCO";
    const STREAM_NAME: &'static str = "DionAudio LOCO DAC-AMP";
    const CODEC_NAME: &'static str = "pcm512x-codec";
}

/// The protocol implementation for Dion Audio LOCO-V2.
#[derive(Default, Debug)]
pub struct DionaudioLocoV2Protocol;

impl DionaudioHardwareSpecification for DionaudioLocoV2Protocol {
    const CARD_NAME: &'static str = "Dion Audio LOCO-V2";
    const LINK_NAME: &'static str = "DionAudio LOCO-V2";
    const STREAM_NAME: &'static str = "DionAudio LOCO-V2 DAC-AMP";
    const CODEC_NAME: &'static str = "pcm512x.1-004c";

    const HOST_ENDPOINT_PROPERTY: Option<&'static str> = Some("i2s-controller");
    const EXTENDED_GAIN_PROPERTY: Option<&'static str> = Some("dionaudio,24db_digital_gain");
}

/// The specification of hardware in Dion Audio LOCO family.
pub trait DionaudioHardwareSpecification {
    /// The name of sound card.
    const CARD_NAME: &'static str;
    /// The name of digital audio link.
    const LINK_NAME: &'static str;
    /// The name of PCM stream in the link.
    const STREAM_NAME: &'static str;
    /// The name of codec instance.
    const CODEC_NAME: &'static str;

    const CPU_DAI_NAME: &'static str = "bcm2708-i2s.0";
    const PLATFORM_NAME: &'static str = "bcm2708-i2s.0";
    const CODEC_DAI_NAME: &'static str = "pcm512x-hifi";

    const DAI_FORMAT: DaiFormat = DaiFormat {
        frame_format: FrameFormat::I2s,
        inversion: ClockInversion::Normal,
        provider: ClockProvider::Host,
    };

    /// The name of control for digital playback gain in the codec.
    const PLAYBACK_VOLUME_CTL_NAME: &'static str = "Digital Playback Volume";
    /// The ceiling of digital playback gain, in native volume steps of the codec. The step
    /// corresponds to 0 dB; the codec itself allows up to +24 dB.
    const PLAYBACK_VOLUME_CEILING: i32 = 207;

    /// The name of property in configuration data which refers to the endpoint of host
    /// interface, if the variant supports dynamic resolution.
    const HOST_ENDPOINT_PROPERTY: Option<&'static str> = None;
    /// The name of boolean property in configuration data which relaxes the ceiling of digital
    /// playback gain, if the variant supports it. The presence of the property disables the
    /// ceiling.
    const EXTENDED_GAIN_PROPERTY: Option<&'static str> = None;
}

/// Format of frame in the digital audio link.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameFormat {
    I2s,
    LeftJustified,
    RightJustified,
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::I2s
    }
}

/// Inversion of bit and frame clocks against normal polarity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockInversion {
    Normal,
    BitClock,
    FrameClock,
    Both,
}

impl Default for ClockInversion {
    fn default() -> Self {
        Self::Normal
    }
}

/// The role to provide bit and frame clocks of the link.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockProvider {
    Host,
    Codec,
}

impl Default for ClockProvider {
    fn default() -> Self {
        Self::Host
    }
}

/// Format of the digital audio link. Chosen once per link and never changed after creation.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct DaiFormat {
    pub frame_format: FrameFormat,
    pub inversion: ClockInversion,
    pub provider: ClockProvider,
}

/// Handle of endpoint resolved from configuration data.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct EndpointHandle(pub String);

/// Descriptor of one digital audio link between host interface and codec. Constructed by
/// [`DaiLinkDescriptorBuilder`] and immutable afterwards.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DaiLinkDescriptor {
    /// The display name of the link.
    pub name: String,
    /// The name of PCM stream.
    pub stream_name: String,
    /// The name of DAI in host interface. Cleared when the endpoint is resolved dynamically.
    pub cpu_dai_name: Option<String>,
    /// The name of DAI in codec.
    pub codec_dai_name: String,
    /// The name of platform. Cleared when the endpoint is resolved dynamically.
    pub platform_name: Option<String>,
    /// The name of codec instance.
    pub codec_name: String,
    /// The fixed format of the link.
    pub format: DaiFormat,
    /// The endpoint which takes the role of host interface, when resolved dynamically.
    pub host_endpoint: Option<EndpointHandle>,
    /// The endpoint which takes the role of platform, when resolved dynamically.
    pub platform_endpoint: Option<EndpointHandle>,
}

/// Builder for [`DaiLinkDescriptor`].
#[derive(Default, Debug)]
pub struct DaiLinkDescriptorBuilder {
    name: String,
    stream_name: String,
    cpu_dai_name: Option<String>,
    codec_dai_name: String,
    platform_name: Option<String>,
    codec_name: String,
    format: DaiFormat,
    host_endpoint: Option<EndpointHandle>,
    platform_endpoint: Option<EndpointHandle>,
}

impl DaiLinkDescriptorBuilder {
    pub fn new(name: &str, stream_name: &str) -> Self {
        DaiLinkDescriptorBuilder {
            name: name.to_string(),
            stream_name: stream_name.to_string(),
            ..Default::default()
        }
    }

    pub fn cpu_dai_name(mut self, name: &str) -> Self {
        self.cpu_dai_name = Some(name.to_string());
        self
    }

    pub fn codec_dai_name(mut self, name: &str) -> Self {
        self.codec_dai_name = name.to_string();
        self
    }

    pub fn platform_name(mut self, name: &str) -> Self {
        self.platform_name = Some(name.to_string());
        self
    }

    pub fn codec_name(mut self, name: &str) -> Self {
        self.codec_name = name.to_string();
        self
    }

    pub fn format(mut self, format: DaiFormat) -> Self {
        self.format = format;
        self
    }

    /// Move both the host interface role and the platform role to the resolved endpoint. The
    /// static names for the two roles are cleared.
    pub fn host_endpoint(mut self, handle: EndpointHandle) -> Self {
        self.cpu_dai_name = None;
        self.platform_name = None;
        self.platform_endpoint = Some(handle.clone());
        self.host_endpoint = Some(handle);
        self
    }

    pub fn build(self) -> DaiLinkDescriptor {
        DaiLinkDescriptor {
            name: self.name,
            stream_name: self.stream_name,
            cpu_dai_name: self.cpu_dai_name,
            codec_dai_name: self.codec_dai_name,
            platform_name: self.platform_name,
            codec_name: self.codec_name,
            format: self.format,
            host_endpoint: self.host_endpoint,
            platform_endpoint: self.platform_endpoint,
        }
    }
}

/// Descriptor of sound card. Owns its links for its entire lifetime.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct CardDescriptor {
    pub name: String,
    pub links: Vec<DaiLinkDescriptor>,
}

/// The configuration decided before the card is registered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LinkConfiguration {
    /// Whether to apply the ceiling to digital playback gain at initialization.
    pub playback_ceiling: bool,
}

impl Default for LinkConfiguration {
    fn default() -> Self {
        LinkConfiguration {
            playback_ceiling: true,
        }
    }
}

/// Format of PCM sample in the stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleFormat {
    S16le,
    S24le,
    S243le,
    S32le,
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self::S16le
    }
}

impl SampleFormat {
    /// The physical width of the sample in the stream, in bits. S24_LE occupies the low three
    /// bytes of a four byte word.
    pub fn physical_width(&self) -> u32 {
        match self {
            Self::S16le => 16,
            Self::S24le => 32,
            Self::S243le => 24,
            Self::S32le => 32,
        }
    }
}

pub fn serialize_sample_format(format: &SampleFormat) -> &'static str {
    match format {
        SampleFormat::S16le => "S16_LE",
        SampleFormat::S24le => "S24_LE",
        SampleFormat::S243le => "S24_3LE",
        SampleFormat::S32le => "S32_LE",
    }
}

pub fn deserialize_sample_format(format: &mut SampleFormat, name: &str) -> Result<(), Error> {
    *format = match name {
        "S16_LE" => Ok(SampleFormat::S16le),
        "S24_LE" => Ok(SampleFormat::S24le),
        "S24_3LE" => Ok(SampleFormat::S243le),
        "S32_LE" => Ok(SampleFormat::S32le),
        _ => {
            let msg = format!("Unexpected name of sample format: {}", name);
            Err(Error::new(FileError::Inval, &msg))
        }
    }?;
    Ok(())
}

/// The parameters of the stream being opened. Consumed immediately to compute the ratio of
/// clocks; not retained.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamParameters {
    /// The physical width of negotiated sample format, in bits.
    pub physical_width: u32,
}

impl From<SampleFormat> for StreamParameters {
    fn from(format: SampleFormat) -> Self {
        StreamParameters {
            physical_width: format.physical_width(),
        }
    }
}

/// Compute the ratio of bit clock against frame clock for the physical width of sample. The
/// link always runs a stereo frame; one period of bit clock per bit of channel slot, two
/// channel slots per frame.
pub fn bclk_ratio_from_physical_width(physical_width: u32) -> u32 {
    physical_width * 2
}

/// Volume control operation of codec.
pub trait CodecVolumeOperation {
    fn set_volume_ceiling(&mut self, ctl_name: &str, ceiling: i32) -> Result<(), Error>;
}

/// Clock configuration operation of DAI in host interface.
pub trait DaiClockOperation {
    fn set_bclk_ratio(&mut self, ratio: u32) -> Result<(), Error>;
}

/// Read operation of configuration data in hardware description.
pub trait ConfigDataOperation {
    /// Resolve the named reference property to the handle of endpoint, if the property is
    /// found.
    fn read_endpoint_reference(&self, prop_name: &str) -> Option<EndpointHandle>;
    /// Read the named boolean property. The absence of the property is false.
    fn read_boolean_property(&self, prop_name: &str) -> bool;
}

/// Registration operation of sound card.
pub trait CardRegistrationOperation {
    fn register_card(&mut self, card: &CardDescriptor) -> Result<(), Error>;
    fn unregister_card(&mut self, card: &CardDescriptor) -> Result<(), Error>;
}

/// Phase of lifecycle of the link. Transitions are one-directional and non-reentrant; the
/// link is torn down to unbound phase before any re-configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkState {
    Unbound,
    Configured,
    Initialized,
    Active,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::Unbound
    }
}

/// The digital audio link of the variant, with its lifecycle. The configuration is written
/// once in the single-threaded configure path and only read afterwards; negotiation never
/// mutates the link.
#[derive(Debug)]
pub struct DionaudioLink<O: DionaudioHardwareSpecification> {
    state: LinkState,
    configuration: LinkConfiguration,
    card: CardDescriptor,
    _phantom: PhantomData<O>,
}

impl<O: DionaudioHardwareSpecification> Default for DionaudioLink<O> {
    fn default() -> Self {
        DionaudioLink {
            state: Default::default(),
            configuration: Default::default(),
            card: Default::default(),
            _phantom: Default::default(),
        }
    }
}

fn state_err(current: &LinkState, expected: LinkState) -> Error {
    let msg = format!(
        "The link is at {:?} phase, while {:?} phase is expected",
        current, expected
    );
    Error::new(FileError::Inval, &msg)
}

impl<O: DionaudioHardwareSpecification> DionaudioLink<O> {
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// The configuration in effect. Meaningful once configured.
    pub fn configuration(&self) -> &LinkConfiguration {
        &self.configuration
    }

    /// The descriptor of card with its finalized link. Meaningful once configured.
    pub fn card(&self) -> &CardDescriptor {
        &self.card
    }

    /// Build the finalized descriptor of the link, applying overrides from configuration data
    /// when present. The endpoint reference property, when resolved, moves both the host
    /// interface role and the platform role to the resolved endpoint. The extended gain
    /// property, when present and true, disables the ceiling of digital playback gain; its
    /// absence leaves the ceiling enabled.
    pub fn configure<C: ConfigDataOperation>(&mut self, config: Option<&C>) -> Result<(), Error> {
        if self.state != LinkState::Unbound {
            return Err(state_err(&self.state, LinkState::Unbound));
        }

        let mut builder = DaiLinkDescriptorBuilder::new(O::LINK_NAME, O::STREAM_NAME)
            .cpu_dai_name(O::CPU_DAI_NAME)
            .codec_dai_name(O::CODEC_DAI_NAME)
            .platform_name(O::PLATFORM_NAME)
            .codec_name(O::CODEC_NAME)
            .format(O::DAI_FORMAT);

        let mut configuration = LinkConfiguration::default();

        if let Some(data) = config {
            if let Some(prop_name) = O::HOST_ENDPOINT_PROPERTY {
                if let Some(handle) = data.read_endpoint_reference(prop_name) {
                    builder = builder.host_endpoint(handle);
                }
            }

            if let Some(prop_name) = O::EXTENDED_GAIN_PROPERTY {
                if data.read_boolean_property(prop_name) {
                    configuration.playback_ceiling = false;
                }
            }
        }

        self.configuration = configuration;
        self.card = CardDescriptor {
            name: O::CARD_NAME.to_string(),
            links: vec![builder.build()],
        };
        self.state = LinkState::Configured;

        Ok(())
    }

    /// Initialize the link. When enabled by the configuration, request the codec to apply the
    /// ceiling to its digital playback gain. Failure of the request keeps the link usable;
    /// one warning is emitted and the call succeeds.
    pub fn initialize<V: CodecVolumeOperation>(&mut self, codec: &mut V) -> Result<(), Error> {
        if self.state != LinkState::Configured {
            return Err(state_err(&self.state, LinkState::Configured));
        }

        if self.configuration.playback_ceiling {
            if let Err(e) =
                codec.set_volume_ceiling(O::PLAYBACK_VOLUME_CTL_NAME, O::PLAYBACK_VOLUME_CEILING)
            {
                glib::g_warning!(
                    "dionaudio-loco",
                    "{}: Failed to set volume limit: {}",
                    self.card.name,
                    e
                );
            }
        }

        self.state = LinkState::Initialized;

        Ok(())
    }

    /// Register the card with its finalized descriptor. Failure is propagated and the link
    /// stays out of active phase.
    pub fn activate<R: CardRegistrationOperation>(&mut self, reg: &mut R) -> Result<(), Error> {
        if self.state != LinkState::Initialized {
            return Err(state_err(&self.state, LinkState::Initialized));
        }

        reg.register_card(&self.card)?;
        self.state = LinkState::Active;

        Ok(())
    }

    /// Negotiate the parameters of the stream being opened; compute the ratio of bit clock
    /// against frame clock and apply it to the host interface. Rejection by the host
    /// interface is propagated unchanged and aborts the attempt to open the stream.
    pub fn negotiate<D: DaiClockOperation>(
        &self,
        dai: &mut D,
        params: &StreamParameters,
    ) -> Result<u32, Error> {
        if self.state != LinkState::Active {
            return Err(state_err(&self.state, LinkState::Active));
        }

        if params.physical_width == 0 {
            let msg = format!(
                "Invalid physical width of sample format: {}",
                params.physical_width
            );
            return Err(Error::new(FileError::Inval, &msg));
        }

        let ratio = bclk_ratio_from_physical_width(params.physical_width);
        dai.set_bclk_ratio(ratio).map(|_| ratio)
    }

    /// Unregister the card and return the link to unbound phase.
    pub fn teardown<R: CardRegistrationOperation>(&mut self, reg: &mut R) -> Result<(), Error> {
        if self.state != LinkState::Active {
            return Err(state_err(&self.state, LinkState::Active));
        }

        reg.unregister_card(&self.card)?;
        self.state = LinkState::Unbound;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct TestCodec {
        calls: Vec<(String, i32)>,
        failure: bool,
    }

    impl CodecVolumeOperation for TestCodec {
        fn set_volume_ceiling(&mut self, ctl_name: &str, ceiling: i32) -> Result<(), Error> {
            self.calls.push((ctl_name.to_string(), ceiling));
            if self.failure {
                Err(Error::new(FileError::Io, "not mapped yet"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct TestDai {
        ratios: Vec<u32>,
        failure: bool,
    }

    impl DaiClockOperation for TestDai {
        fn set_bclk_ratio(&mut self, ratio: u32) -> Result<(), Error> {
            self.ratios.push(ratio);
            if self.failure {
                Err(Error::new(FileError::Nxio, "unsupported divider"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct TestConfig {
        endpoints: Vec<(String, EndpointHandle)>,
        booleans: Vec<String>,
    }

    impl ConfigDataOperation for TestConfig {
        fn read_endpoint_reference(&self, prop_name: &str) -> Option<EndpointHandle> {
            self.endpoints
                .iter()
                .find(|(name, _)| name == prop_name)
                .map(|(_, handle)| handle.clone())
        }

        fn read_boolean_property(&self, prop_name: &str) -> bool {
            self.booleans.iter().any(|name| name == prop_name)
        }
    }

    #[derive(Default)]
    struct TestRegistration {
        registered: Vec<String>,
        unregistered: Vec<String>,
        failure: bool,
    }

    impl CardRegistrationOperation for TestRegistration {
        fn register_card(&mut self, card: &CardDescriptor) -> Result<(), Error> {
            if self.failure {
                Err(Error::new(FileError::Nodev, "no such card"))
            } else {
                self.registered.push(card.name.clone());
                Ok(())
            }
        }

        fn unregister_card(&mut self, card: &CardDescriptor) -> Result<(), Error> {
            self.unregistered.push(card.name.clone());
            Ok(())
        }
    }

    fn active_link<O: DionaudioHardwareSpecification>() -> DionaudioLink<O> {
        let mut link = DionaudioLink::<O>::default();
        link.configure::<TestConfig>(None).unwrap();
        link.initialize(&mut TestCodec::default()).unwrap();
        link.activate(&mut TestRegistration::default()).unwrap();
        link
    }

    #[test]
    fn bclk_ratio_computation() {
        assert_eq!(bclk_ratio_from_physical_width(16), 32);
        assert_eq!(bclk_ratio_from_physical_width(24), 48);
        assert_eq!(bclk_ratio_from_physical_width(32), 64);

        (1..64).for_each(|width| {
            assert_eq!(bclk_ratio_from_physical_width(width), width * 2);
        });
    }

    #[test]
    fn sample_format_serdes() {
        [
            SampleFormat::S16le,
            SampleFormat::S24le,
            SampleFormat::S243le,
            SampleFormat::S32le,
            SampleFormat::default(),
        ]
        .iter()
        .for_each(|format| {
            let name = serialize_sample_format(&format);
            let mut f = SampleFormat::default();
            deserialize_sample_format(&mut f, name).unwrap();
            assert_eq!(*format, f);
        });

        let mut f = SampleFormat::default();
        assert!(deserialize_sample_format(&mut f, "FLOAT_LE").is_err());
    }

    #[test]
    fn sample_format_physical_width() {
        assert_eq!(SampleFormat::S16le.physical_width(), 16);
        assert_eq!(SampleFormat::S24le.physical_width(), 32);
        assert_eq!(SampleFormat::S243le.physical_width(), 24);
        assert_eq!(SampleFormat::S32le.physical_width(), 32);
    }

    #[test]
    fn negotiation_applies_computed_ratio() {
        let link = active_link::<DionaudioLocoProtocol>();
        let mut dai = TestDai::default();

        let params = StreamParameters { physical_width: 16 };
        assert_eq!(link.negotiate(&mut dai, &params).unwrap(), 32);

        let params = StreamParameters::from(SampleFormat::S243le);
        assert_eq!(link.negotiate(&mut dai, &params).unwrap(), 48);

        let params = StreamParameters::from(SampleFormat::S32le);
        assert_eq!(link.negotiate(&mut dai, &params).unwrap(), 64);

        assert_eq!(&dai.ratios, &[32, 48, 64]);
    }

    #[test]
    fn negotiation_is_deterministic() {
        let link = active_link::<DionaudioLocoV2Protocol>();
        let mut dai = TestDai::default();

        let params = StreamParameters { physical_width: 24 };
        assert_eq!(link.negotiate(&mut dai, &params).unwrap(), 48);
        assert_eq!(link.negotiate(&mut dai, &params).unwrap(), 48);

        assert_eq!(&dai.ratios, &[48, 48]);
    }

    #[test]
    fn negotiation_propagates_rejection() {
        let link = active_link::<DionaudioLocoProtocol>();
        let mut dai = TestDai {
            failure: true,
            ..Default::default()
        };

        let params = StreamParameters { physical_width: 32 };
        let err = link.negotiate(&mut dai, &params).unwrap_err();
        assert_eq!(err.kind::<FileError>(), Some(FileError::Nxio));
        assert_eq!(err.message(), "unsupported divider");
        assert_eq!(&dai.ratios, &[64]);
    }

    #[test]
    fn negotiation_rejects_zero_width() {
        let link = active_link::<DionaudioLocoProtocol>();
        let mut dai = TestDai::default();

        let params = StreamParameters { physical_width: 0 };
        assert!(link.negotiate(&mut dai, &params).is_err());
        assert_eq!(dai.ratios.len(), 0);
    }

    #[test]
    fn initialization_applies_ceiling_once() {
        let mut link = DionaudioLink::<DionaudioLocoV2Protocol>::default();
        link.configure::<TestConfig>(None).unwrap();

        let mut codec = TestCodec::default();
        link.initialize(&mut codec).unwrap();

        assert_eq!(&codec.calls, &[("Digital Playback Volume".to_string(), 207)]);
    }

    #[test]
    fn initialization_skips_disabled_ceiling() {
        let config = TestConfig {
            booleans: vec!["dionaudio,24db_digital_gain".to_string()],
            ..Default::default()
        };

        let mut link = DionaudioLink::<DionaudioLocoV2Protocol>::default();
        link.configure(Some(&config)).unwrap();
        assert_eq!(link.configuration().playback_ceiling, false);

        let mut codec = TestCodec::default();
        link.initialize(&mut codec).unwrap();

        assert_eq!(codec.calls.len(), 0);
    }

    #[test]
    fn initialization_tolerates_codec_failure() {
        let mut link = DionaudioLink::<DionaudioLocoV2Protocol>::default();
        link.configure::<TestConfig>(None).unwrap();

        let mut codec = TestCodec {
            failure: true,
            ..Default::default()
        };
        assert!(link.initialize(&mut codec).is_ok());
        assert_eq!(codec.calls.len(), 1);
        assert_eq!(link.state(), LinkState::Initialized);
    }

    #[test]
    fn configuration_without_data_keeps_static_defaults() {
        let mut link = DionaudioLink::<DionaudioLocoV2Protocol>::default();
        link.configure::<TestConfig>(None).unwrap();

        let card = link.card();
        assert_eq!(card.name, "Dion Audio LOCO-V2");
        assert_eq!(card.links.len(), 1);

        let dai_link = &card.links[0];
        assert_eq!(dai_link.cpu_dai_name.as_deref(), Some("bcm2708-i2s.0"));
        assert_eq!(dai_link.platform_name.as_deref(), Some("bcm2708-i2s.0"));
        assert_eq!(dai_link.codec_dai_name, "pcm512x-hifi");
        assert_eq!(dai_link.codec_name, "pcm512x.1-004c");
        assert_eq!(dai_link.host_endpoint, None);
        assert_eq!(dai_link.platform_endpoint, None);
        assert_eq!(dai_link.format.frame_format, FrameFormat::I2s);
        assert_eq!(dai_link.format.inversion, ClockInversion::Normal);
        assert_eq!(dai_link.format.provider, ClockProvider::Host);

        assert_eq!(link.configuration().playback_ceiling, true);
    }

    #[test]
    fn configuration_resolves_host_endpoint() {
        let handle = EndpointHandle("/soc/i2s@7e203000".to_string());
        let config = TestConfig {
            endpoints: vec![("i2s-controller".to_string(), handle.clone())],
            ..Default::default()
        };

        let mut link = DionaudioLink::<DionaudioLocoV2Protocol>::default();
        link.configure(Some(&config)).unwrap();

        let dai_link = &link.card().links[0];
        assert_eq!(dai_link.cpu_dai_name, None);
        assert_eq!(dai_link.platform_name, None);
        assert_eq!(dai_link.host_endpoint.as_ref(), Some(&handle));
        assert_eq!(dai_link.platform_endpoint.as_ref(), Some(&handle));
    }

    #[test]
    fn configuration_with_absent_gain_property_keeps_ceiling() {
        let config = TestConfig::default();

        let mut link = DionaudioLink::<DionaudioLocoV2Protocol>::default();
        link.configure(Some(&config)).unwrap();

        assert_eq!(link.configuration().playback_ceiling, true);
    }

    #[test]
    fn base_variant_ignores_configuration_data() {
        let config = TestConfig {
            endpoints: vec![(
                "i2s-controller".to_string(),
                EndpointHandle("/soc/i2s@7e203000".to_string()),
            )],
            booleans: vec!["dionaudio,24db_digital_gain".to_string()],
        };

        let mut link = DionaudioLink::<DionaudioLocoProtocol>::default();
        link.configure(Some(&config)).unwrap();

        let card = link.card();
        assert_eq!(card.name, "snd_rpi_dionaudio_loco");

        let dai_link = &card.links[0];
        assert_eq!(dai_link.cpu_dai_name.as_deref(), Some("bcm2708-i2s.0"));
        assert_eq!(dai_link.host_endpoint, None);
        assert_eq!(dai_link.codec_name, "pcm512x-codec");
        assert_eq!(link.configuration().playback_ceiling, true);
    }

    #[test]
    fn lifecycle_transitions() {
        let mut link = DionaudioLink::<DionaudioLocoV2Protocol>::default();
        let mut reg = TestRegistration::default();

        assert_eq!(link.state(), LinkState::Unbound);

        assert!(link.initialize(&mut TestCodec::default()).is_err());
        assert!(link.activate(&mut reg).is_err());
        assert!(link.teardown(&mut reg).is_err());

        link.configure::<TestConfig>(None).unwrap();
        assert_eq!(link.state(), LinkState::Configured);
        assert!(link.configure::<TestConfig>(None).is_err());

        let params = StreamParameters { physical_width: 16 };
        assert!(link.negotiate(&mut TestDai::default(), &params).is_err());

        link.initialize(&mut TestCodec::default()).unwrap();
        assert_eq!(link.state(), LinkState::Initialized);
        assert!(link.initialize(&mut TestCodec::default()).is_err());

        link.activate(&mut reg).unwrap();
        assert_eq!(link.state(), LinkState::Active);
        assert_eq!(&reg.registered, &["Dion Audio LOCO-V2"]);

        link.teardown(&mut reg).unwrap();
        assert_eq!(link.state(), LinkState::Unbound);
        assert_eq!(&reg.unregistered, &["Dion Audio LOCO-V2"]);

        // Unbound again; the whole lifecycle is allowed to restart.
        link.configure::<TestConfig>(None).unwrap();
        assert_eq!(link.state(), LinkState::Configured);
    }

    #[test]
    fn activation_failure_is_propagated() {
        let mut link = DionaudioLink::<DionaudioLocoProtocol>::default();
        link.configure::<TestConfig>(None).unwrap();
        link.initialize(&mut TestCodec::default()).unwrap();

        let mut reg = TestRegistration {
            failure: true,
            ..Default::default()
        };
        let err = link.activate(&mut reg).unwrap_err();
        assert_eq!(err.kind::<FileError>(), Some(FileError::Nodev));
        assert_eq!(link.state(), LinkState::Initialized);
        assert_eq!(reg.registered.len(), 0);
    }
}
